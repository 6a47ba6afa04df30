//! OpenAI Chat Completions wire format ↔ internal representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, EncodeError};
use crate::model::{ContentBlock, Dialect, FinishReason, InternalChatRequest, InternalChatResponse, Message, Role, ToolDef, ToolOutput, Usage};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub tools: Option<Vec<WireTool>>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<WireContent>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireImageUrl {
    pub url: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionDef,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireFunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<WireChoice>,
    #[serde(default)]
    pub usage: WireUsage,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireChoice {
    pub index: u32,
    pub message: WireMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

pub fn parse(body: &Value) -> Result<WireRequest, DecodeError> {
    serde_json::from_value(body.clone()).map_err(|e| DecodeError::Malformed {
        dialect: Dialect::OpenaiChat,
        message: e.to_string(),
    })
}

/// Decode a wire request into the internal representation.
pub fn decode(wire: WireRequest) -> Result<InternalChatRequest, DecodeError> {
    let mut messages = Vec::with_capacity(wire.messages.len());
    for m in wire.messages {
        messages.push(decode_message(m)?);
    }

    let tools = wire
        .tools
        .unwrap_or_default()
        .into_iter()
        .map(|t| ToolDef {
            name: t.function.name,
            description: t.function.description,
            parameters: t.function.parameters,
        })
        .collect();

    Ok(InternalChatRequest {
        model: wire.model,
        messages,
        stream: wire.stream,
        tools,
        tool_choice: wire.tool_choice,
        extra: wire.extra,
    })
}

fn decode_message(m: WireMessage) -> Result<Message, DecodeError> {
    let role = match m.role.as_str() {
        "system" => Role::System,
        "user" => Role::User,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        other => {
            return Err(DecodeError::Malformed {
                dialect: Dialect::OpenaiChat,
                message: format!("unknown role {other}"),
            });
        }
    };

    if role == Role::Tool {
        let output = match &m.content {
            Some(WireContent::Text(t)) => t.clone(),
            Some(WireContent::Parts(parts)) => parts
                .iter()
                .filter_map(|p| match p {
                    WirePart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            None => String::new(),
        };
        let call_id = m.tool_call_id.unwrap_or_default();
        return Ok(Message {
            role,
            content: vec![ContentBlock::ToolResult {
                call_id,
                name: None,
                output: ToolOutput::Text(output),
            }],
        });
    }

    let mut content = Vec::new();
    match m.content {
        Some(WireContent::Text(text)) => content.push(ContentBlock::Text { text }),
        Some(WireContent::Parts(parts)) => {
            for part in parts {
                match part {
                    WirePart::Text { text } => content.push(ContentBlock::Text { text }),
                    WirePart::ImageUrl { image_url } => content.push(ContentBlock::ImageUrl {
                        url: image_url.url,
                        detail: image_url.detail,
                    }),
                }
            }
        }
        None => {}
    }

    for call in m.tool_calls.unwrap_or_default() {
        let arguments = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| Value::Object(Default::default()));
        content.push(ContentBlock::ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        });
    }

    if content.is_empty() {
        content.push(ContentBlock::Text { text: String::new() });
    }

    Ok(Message { role, content })
}

/// Encode the internal representation into an OpenAI Chat request body (inverse of [`decode`]).
pub fn encode(req: &InternalChatRequest) -> Result<Value, EncodeError> {
    let messages = req
        .messages
        .iter()
        .map(encode_message)
        .collect::<Result<Vec<_>, _>>()?;

    let tools = if req.tools.is_empty() {
        None
    } else {
        Some(
            req.tools
                .iter()
                .map(|t| WireTool {
                    kind: "function".to_string(),
                    function: WireFunctionDef {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect::<Vec<_>>(),
        )
    };

    let wire = WireRequest {
        model: req.model.clone(),
        messages,
        stream: req.stream,
        tools,
        tool_choice: req.tool_choice.clone(),
        extra: req.extra.clone(),
    };

    serde_json::to_value(wire).map_err(|e| EncodeError {
        target: Dialect::OpenaiChat,
        message: e.to_string(),
    })
}

fn encode_message(m: &Message) -> Result<WireMessage, EncodeError> {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
    .to_string();

    if m.role == Role::Tool {
        let (call_id, output) = m
            .content
            .iter()
            .find_map(|b| match b {
                ContentBlock::ToolResult { call_id, output, .. } => Some((call_id.clone(), output.as_text())),
                _ => None,
            })
            .unwrap_or_default();
        return Ok(WireMessage {
            role,
            content: Some(WireContent::Text(output)),
            tool_calls: None,
            tool_call_id: Some(call_id),
        });
    }

    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in &m.content {
        match block {
            ContentBlock::Text { text } => parts.push(WirePart::Text { text: text.clone() }),
            ContentBlock::ImageUrl { url, detail } => parts.push(WirePart::ImageUrl {
                image_url: WireImageUrl { url: url.clone(), detail: detail.clone() },
            }),
            ContentBlock::ToolCall { id, name, arguments } => {
                let arguments = serde_json::to_string(arguments).map_err(|e| EncodeError {
                    target: Dialect::OpenaiChat,
                    message: e.to_string(),
                })?;
                tool_calls.push(WireToolCall {
                    id: id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall { name: name.clone(), arguments },
                });
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }

    let content = if parts.len() == 1 {
        if let WirePart::Text { text } = &parts[0] {
            Some(WireContent::Text(text.clone()))
        } else {
            Some(WireContent::Parts(parts))
        }
    } else if parts.is_empty() {
        None
    } else {
        Some(WireContent::Parts(parts))
    };

    Ok(WireMessage {
        role,
        content,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
    })
}

pub fn finish_reason_to_wire(reason: Option<FinishReason>) -> Option<String> {
    reason.map(|r| match r {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::Error => "content_filter",
    })
    .map(str::to_string)
}

pub fn finish_reason_from_wire(reason: Option<&str>) -> Option<FinishReason> {
    match reason {
        Some("stop") => Some(FinishReason::Stop),
        Some("length") => Some(FinishReason::Length),
        Some(_) => Some(FinishReason::Error),
        None => None,
    }
}

pub fn decode_response(wire: WireResponse) -> Result<InternalChatResponse, DecodeError> {
    let choice = wire.choices.into_iter().next().ok_or_else(|| DecodeError::Malformed {
        dialect: Dialect::OpenaiChat,
        message: "response has no choices".to_string(),
    })?;
    let message = decode_message(choice.message)?;
    Ok(InternalChatResponse {
        id: wire.id,
        model: wire.model,
        messages: vec![message],
        finish_reason: finish_reason_from_wire(choice.finish_reason.as_deref()),
        usage: Usage {
            input_tokens: wire.usage.prompt_tokens,
            output_tokens: wire.usage.completion_tokens,
            total_tokens: wire.usage.total_tokens,
        },
        extra: wire.extra,
    })
}

pub fn encode_response(resp: &InternalChatResponse) -> Result<Value, EncodeError> {
    let message = resp.messages.first().cloned().unwrap_or(Message::text(Role::Assistant, ""));
    let wire_message = encode_message(&message)?;
    let wire = WireResponse {
        id: resp.id.clone(),
        object: "chat.completion".to_string(),
        created: 0,
        model: resp.model.clone(),
        choices: vec![WireChoice {
            index: 0,
            message: wire_message,
            finish_reason: finish_reason_to_wire(resp.finish_reason),
        }],
        usage: WireUsage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.total_tokens,
        },
        extra: resp.extra.clone(),
    };
    serde_json::to_value(wire).map_err(|e| EncodeError {
        target: Dialect::OpenaiChat,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_simple_text_message() {
        let body = json!({"model":"gpt-x","messages":[{"role":"user","content":"ping"}]});
        let wire = parse(&body).unwrap();
        let internal = decode(wire).unwrap();
        assert_eq!(internal.messages[0].text_content(), "ping");
        assert_eq!(internal.messages[0].role, Role::User);
    }

    #[test]
    fn decodes_tool_call_with_bad_json_arguments_as_empty_object() {
        let body = json!({
            "model": "gpt-x",
            "messages": [{
                "role": "assistant",
                "content": null,
                "tool_calls": [{"id":"c1","type":"function","function":{"name":"f","arguments":"not json"}}]
            }]
        });
        let wire = parse(&body).unwrap();
        let internal = decode(wire).unwrap();
        let ContentBlock::ToolCall { arguments, .. } = &internal.messages[0].content[0] else {
            panic!("expected tool call block");
        };
        assert_eq!(*arguments, json!({}));
    }

    #[test]
    fn tool_role_message_becomes_tool_result_block() {
        let body = json!({
            "model": "gpt-x",
            "messages": [{"role":"tool","tool_call_id":"c1","content":"result text"}]
        });
        let wire = parse(&body).unwrap();
        let internal = decode(wire).unwrap();
        let ContentBlock::ToolResult { call_id, output, .. } = &internal.messages[0].content[0] else {
            panic!("expected tool result block");
        };
        assert_eq!(call_id, "c1");
        assert_eq!(output.as_text(), "result text");
    }

    #[test]
    fn round_trips_through_encode() {
        let body = json!({"model":"gpt-x","messages":[{"role":"user","content":"ping"}]});
        let internal = decode(parse(&body).unwrap()).unwrap();
        let encoded = encode(&internal).unwrap();
        assert_eq!(encoded["messages"][0]["content"], json!("ping"));
    }
}
