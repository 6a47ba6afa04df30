//! Anthropic Messages wire format ↔ internal representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, EncodeError};
use crate::model::{ContentBlock, Dialect, FinishReason, InternalChatRequest, InternalChatResponse, Message, Role, ToolDef, ToolOutput, Usage};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireRequest {
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub system: Option<SystemField>,
    #[serde(default)]
    pub tools: Option<Vec<WireTool>>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemField {
    Text(String),
    Blocks(Vec<TextBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextBlock {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: WireContent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<TextBlock>),
}

impl ToolResultContent {
    fn as_text(&self) -> String {
        match self {
            ToolResultContent::Text(s) => s.clone(),
            ToolResultContent::Blocks(blocks) => blocks.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join(""),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<WireBlock>,
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: WireUsage,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WireUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

pub fn parse(body: &Value) -> Result<WireRequest, DecodeError> {
    serde_json::from_value(body.clone()).map_err(|e| DecodeError::Malformed {
        dialect: Dialect::ClaudeChat,
        message: e.to_string(),
    })
}

/// Decode a wire request.
pub fn decode(wire: WireRequest) -> Result<InternalChatRequest, DecodeError> {
    let mut messages = Vec::new();

    if let Some(system) = wire.system {
        let text = match system {
            SystemField::Text(t) => t,
            SystemField::Blocks(blocks) => blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join(""),
        };
        messages.push(Message::text(Role::System, text));
    }

    for m in wire.messages {
        messages.push(decode_message(m)?);
    }

    let tools = wire
        .tools
        .unwrap_or_default()
        .into_iter()
        .map(|t| ToolDef {
            name: t.name,
            description: t.description,
            parameters: t.input_schema,
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
        "user" => Role::User,
        "assistant" => Role::Assistant,
        other => {
            return Err(DecodeError::Malformed {
                dialect: Dialect::ClaudeChat,
                message: format!("unknown role {other}"),
            });
        }
    };

    let blocks = match m.content {
        WireContent::Text(text) => vec![WireBlock::Text { text }],
        WireContent::Blocks(blocks) => blocks,
    };

    let mut has_tool_result = false;
    let mut content = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            WireBlock::Text { text } => content.push(ContentBlock::Text { text }),
            WireBlock::ToolUse { id, name, input } => content.push(ContentBlock::ToolCall { id, name, arguments: input }),
            WireBlock::ToolResult { tool_use_id, content: result, .. } => {
                has_tool_result = true;
                content.push(ContentBlock::ToolResult {
                    call_id: tool_use_id,
                    name: None,
                    output: ToolOutput::Text(result.map(|c| c.as_text()).unwrap_or_default()),
                });
            }
        }
    }

    // Claude carries tool results inside a `user` message; the internal model
    // represents them as `Tool`-role messages instead.
    let role = if has_tool_result { Role::Tool } else { role };

    Ok(Message { role, content })
}

/// Encode the internal representation into an Anthropic Messages request body.
pub fn encode(req: &InternalChatRequest) -> Result<Value, EncodeError> {
    let mut system = None;
    let mut messages = Vec::new();

    for m in &req.messages {
        if m.role == Role::System && system.is_none() {
            system = Some(SystemField::Text(m.text_content()));
            continue;
        }
        messages.push(encode_message(m)?);
    }

    let tools = if req.tools.is_empty() {
        None
    } else {
        Some(
            req.tools
                .iter()
                .map(|t| WireTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        )
    };

    let wire = WireRequest {
        model: req.model.clone(),
        max_tokens: Some(4096),
        messages,
        system,
        tools,
        tool_choice: req.tool_choice.clone(),
        stream: req.stream,
        extra: req.extra.clone(),
    };

    serde_json::to_value(wire).map_err(|e| EncodeError {
        target: Dialect::ClaudeChat,
        message: e.to_string(),
    })
}

fn encode_message(m: &Message) -> Result<WireMessage, EncodeError> {
    let role = if m.role == Role::Tool { "user" } else if m.role == Role::Assistant { "assistant" } else { "user" };

    let mut blocks = Vec::with_capacity(m.content.len());
    for block in &m.content {
        match block {
            ContentBlock::Text { text } => blocks.push(WireBlock::Text { text: text.clone() }),
            ContentBlock::ImageUrl { .. } => {}
            ContentBlock::ToolCall { id, name, arguments } => blocks.push(WireBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: arguments.clone(),
            }),
            ContentBlock::ToolResult { call_id, output, .. } => blocks.push(WireBlock::ToolResult {
                tool_use_id: call_id.clone(),
                content: Some(ToolResultContent::Text(output.as_text())),
                is_error: None,
            }),
        }
    }

    Ok(WireMessage {
        role: role.to_string(),
        content: WireContent::Blocks(blocks),
    })
}

fn finish_reason_from_stop(stop_reason: Option<&str>) -> Option<FinishReason> {
    match stop_reason {
        Some("end_turn") | Some("stop_sequence") | Some("tool_use") => Some(FinishReason::Stop),
        Some("max_tokens") => Some(FinishReason::Length),
        Some(_) => Some(FinishReason::Error),
        None => None,
    }
}

fn stop_reason_from_finish(reason: Option<FinishReason>) -> Option<&'static str> {
    match reason {
        Some(FinishReason::Stop) | None => Some("end_turn"),
        Some(FinishReason::Length) => Some("max_tokens"),
        Some(FinishReason::Error) => Some("stop_sequence"),
    }
}

pub fn decode_response(wire: WireResponse) -> Result<InternalChatResponse, DecodeError> {
    let message = decode_message(WireMessage {
        role: wire.role,
        content: WireContent::Blocks(wire.content),
    })?;
    Ok(InternalChatResponse {
        id: wire.id,
        model: wire.model,
        messages: vec![message],
        finish_reason: finish_reason_from_stop(wire.stop_reason.as_deref()),
        usage: Usage {
            input_tokens: wire.usage.input_tokens,
            output_tokens: wire.usage.output_tokens,
            total_tokens: wire.usage.input_tokens + wire.usage.output_tokens,
        },
        extra: BTreeMap::new(),
    })
}

pub fn encode_response(resp: &InternalChatResponse) -> Result<Value, EncodeError> {
    let message = resp.messages.first().cloned().unwrap_or(Message::text(Role::Assistant, ""));
    let wire_message = encode_message(&message)?;
    let content = match wire_message.content {
        WireContent::Blocks(blocks) => blocks,
        WireContent::Text(text) => vec![WireBlock::Text { text }],
    };

    let wire = WireResponse {
        id: resp.id.clone(),
        kind: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: resp.model.clone(),
        stop_reason: stop_reason_from_finish(resp.finish_reason).map(str::to_string),
        stop_sequence: None,
        usage: WireUsage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    };

    serde_json::to_value(wire).map_err(|e| EncodeError {
        target: Dialect::ClaudeChat,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hoists_system_string_to_leading_message() {
        let body = json!({
            "model": "claude-3-opus",
            "max_tokens": 100,
            "system": "be terse",
            "messages": [{"role":"user","content":"ping"}]
        });
        let internal = decode(parse(&body).unwrap()).unwrap();
        assert_eq!(internal.messages[0].role, Role::System);
        assert_eq!(internal.messages[0].text_content(), "be terse");
    }

    #[test]
    fn tool_result_block_maps_to_tool_role() {
        let body = json!({
            "model": "claude-3-opus",
            "max_tokens": 100,
            "messages": [{
                "role": "user",
                "content": [{"type":"tool_result","tool_use_id":"t1","content":"42"}]
            }]
        });
        let internal = decode(parse(&body).unwrap()).unwrap();
        assert_eq!(internal.messages[0].role, Role::Tool);
        let ContentBlock::ToolResult { call_id, .. } = &internal.messages[0].content[0] else {
            panic!("expected tool result");
        };
        assert_eq!(call_id, "t1");
    }

    #[test]
    fn encodes_openai_style_ping_to_claude_shape() {
        let req = InternalChatRequest {
            model: "gpt-x".to_string(),
            messages: vec![Message::text(Role::User, "ping")],
            stream: false,
            tools: vec![],
            tool_choice: None,
            extra: BTreeMap::new(),
        };
        let encoded = encode(&req).unwrap();
        assert_eq!(encoded["messages"][0]["content"][0]["type"], json!("text"));
        assert_eq!(encoded["messages"][0]["content"][0]["text"], json!("ping"));
    }
}
