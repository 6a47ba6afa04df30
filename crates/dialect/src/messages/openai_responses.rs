//! OpenAI Responses wire format ↔ internal representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, EncodeError};
use crate::model::{ContentBlock, Dialect, FinishReason, InternalChatRequest, InternalChatResponse, Message, Role, ToolOutput, Usage};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub input: InputField,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputField {
    Text(String),
    Items(Vec<InputItem>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: String,
        content: MessageContent,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<SummaryPart>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Items(Vec<ContentItem>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    InputText { text: String },
    OutputText { text: String },
    InputImage {
        #[serde(default)]
        image_url: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummaryPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireResponse {
    pub id: String,
    pub object: String,
    pub created_at: u64,
    pub model: String,
    pub status: String,
    #[serde(default)]
    pub output: Vec<InputItem>,
    #[serde(default)]
    pub usage: WireUsage,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WireUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

pub fn parse(body: &Value) -> Result<WireRequest, DecodeError> {
    serde_json::from_value(body.clone()).map_err(|e| DecodeError::Malformed {
        dialect: Dialect::OpenaiResponses,
        message: e.to_string(),
    })
}

/// Decode a wire request.
pub fn decode(wire: WireRequest) -> Result<InternalChatRequest, DecodeError> {
    let mut messages = Vec::new();

    if let Some(instructions) = wire.instructions {
        messages.push(Message::text(Role::System, instructions));
    }

    let items = match wire.input {
        InputField::Text(text) => vec![InputItem::Message {
            role: "user".to_string(),
            content: MessageContent::Text(text),
        }],
        InputField::Items(items) => items,
    };

    for item in items {
        messages.push(decode_item(item)?);
    }

    Ok(InternalChatRequest {
        model: wire.model,
        messages,
        stream: wire.stream,
        tools: Vec::new(),
        tool_choice: None,
        extra: wire.extra,
    })
}

fn decode_item(item: InputItem) -> Result<Message, DecodeError> {
    match item {
        InputItem::Message { role, content } => {
            let role = match role.as_str() {
                "system" | "developer" => Role::System,
                "assistant" => Role::Assistant,
                _ => Role::User,
            };
            let content = match content {
                MessageContent::Text(text) => vec![ContentBlock::Text { text }],
                MessageContent::Items(items) => items
                    .into_iter()
                    .filter_map(|i| match i {
                        ContentItem::InputText { text } | ContentItem::OutputText { text } => Some(ContentBlock::Text { text }),
                        ContentItem::InputImage { image_url } => image_url.map(|url| ContentBlock::ImageUrl { url, detail: None }),
                    })
                    .collect(),
            };
            Ok(Message { role, content })
        }
        InputItem::FunctionCall { call_id, name, arguments } => {
            let arguments = serde_json::from_str(&arguments).unwrap_or_else(|_| Value::Object(Default::default()));
            Ok(Message {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolCall { id: call_id, name, arguments }],
            })
        }
        InputItem::FunctionCallOutput { call_id, output } => Ok(Message {
            role: Role::Tool,
            content: vec![ContentBlock::ToolResult {
                call_id,
                name: None,
                output: ToolOutput::Text(output),
            }],
        }),
        InputItem::Reasoning { summary } => {
            let text = summary.into_iter().map(|s| s.text).collect::<Vec<_>>().join("");
            Ok(Message::text(Role::Assistant, text))
        }
    }
}

/// Encode the internal representation into an OpenAI Responses request body.
pub fn encode(req: &InternalChatRequest) -> Result<Value, EncodeError> {
    let mut instructions = None;
    let mut items = Vec::new();

    for message in &req.messages {
        if message.role == Role::System && instructions.is_none() {
            instructions = Some(message.text_content());
            continue;
        }
        items.push(encode_message(message)?);
    }

    let wire = WireRequest {
        model: req.model.clone(),
        input: InputField::Items(items.into_iter().flatten().collect()),
        instructions,
        stream: req.stream,
        extra: req.extra.clone(),
    };

    serde_json::to_value(wire).map_err(|e| EncodeError {
        target: Dialect::OpenaiResponses,
        message: e.to_string(),
    })
}

fn encode_message(m: &Message) -> Result<Vec<InputItem>, EncodeError> {
    if m.role == Role::Tool {
        let Some(ContentBlock::ToolResult { call_id, output, .. }) = m.content.first() else {
            return Ok(Vec::new());
        };
        return Ok(vec![InputItem::FunctionCallOutput {
            call_id: call_id.clone(),
            output: output.as_text(),
        }]);
    }

    let mut out = Vec::new();
    let mut text_items = Vec::new();
    for block in &m.content {
        match block {
            ContentBlock::Text { text } => text_items.push(ContentItem::OutputText { text: text.clone() }),
            ContentBlock::ImageUrl { url, .. } => text_items.push(ContentItem::InputImage { image_url: Some(url.clone()) }),
            ContentBlock::ToolCall { id, name, arguments } => {
                let arguments = serde_json::to_string(arguments).map_err(|e| EncodeError {
                    target: Dialect::OpenaiResponses,
                    message: e.to_string(),
                })?;
                out.push(InputItem::FunctionCall { call_id: id.clone(), name: name.clone(), arguments });
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }

    if !text_items.is_empty() {
        let role = match m.role {
            Role::System => "system",
            Role::Assistant => "assistant",
            _ => "user",
        };
        out.insert(
            0,
            InputItem::Message {
                role: role.to_string(),
                content: MessageContent::Items(text_items),
            },
        );
    }

    Ok(out)
}

fn status_from_finish_reason(reason: Option<FinishReason>) -> &'static str {
    match reason {
        Some(FinishReason::Stop) | None => "completed",
        Some(FinishReason::Length) => "incomplete",
        Some(FinishReason::Error) => "failed",
    }
}

fn finish_reason_from_status(status: &str) -> Option<FinishReason> {
    match status {
        "completed" => Some(FinishReason::Stop),
        "incomplete" => Some(FinishReason::Length),
        "failed" => Some(FinishReason::Error),
        _ => None,
    }
}

pub fn decode_response(wire: WireResponse) -> Result<InternalChatResponse, DecodeError> {
    let mut messages = Vec::new();
    for item in wire.output {
        messages.push(decode_item(item)?);
    }
    Ok(InternalChatResponse {
        id: wire.id,
        model: wire.model,
        messages,
        finish_reason: finish_reason_from_status(&wire.status),
        usage: Usage {
            input_tokens: wire.usage.input_tokens,
            output_tokens: wire.usage.output_tokens,
            total_tokens: wire.usage.total_tokens,
        },
        extra: BTreeMap::new(),
    })
}

pub fn encode_response(resp: &InternalChatResponse) -> Result<Value, EncodeError> {
    let output = resp
        .messages
        .iter()
        .map(encode_message)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect();

    let wire = WireResponse {
        id: resp.id.clone(),
        object: "response".to_string(),
        created_at: 0,
        model: resp.model.clone(),
        status: status_from_finish_reason(resp.finish_reason).to_string(),
        output,
        usage: WireUsage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.total_tokens,
        },
    };

    serde_json::to_value(wire).map_err(|e| EncodeError {
        target: Dialect::OpenaiResponses,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instructions_hoist_to_leading_system_message() {
        let body = json!({"model":"gpt-x","instructions":"be terse","input":"ping"});
        let internal = decode(parse(&body).unwrap()).unwrap();
        assert_eq!(internal.messages[0].role, Role::System);
        assert_eq!(internal.messages[0].text_content(), "be terse");
        assert_eq!(internal.messages[1].text_content(), "ping");
    }

    #[test]
    fn function_call_output_becomes_tool_result() {
        let body = json!({
            "model": "gpt-x",
            "input": [{"type":"function_call_output","call_id":"c1","output":"42"}]
        });
        let internal = decode(parse(&body).unwrap()).unwrap();
        let ContentBlock::ToolResult { call_id, output, .. } = &internal.messages[0].content[0] else {
            panic!("expected tool result");
        };
        assert_eq!(call_id, "c1");
        assert_eq!(output.as_text(), "42");
    }

    #[test]
    fn reasoning_summary_collapses_to_text() {
        let body = json!({
            "model": "gpt-x",
            "input": [{"type":"reasoning","summary":[{"text":"step one"},{"text":"step two"}]}]
        });
        let internal = decode(parse(&body).unwrap()).unwrap();
        assert_eq!(internal.messages[0].text_content(), "step onestep two");
    }
}
