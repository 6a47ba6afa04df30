//! Google Gemini `generateContent` wire format ↔ internal representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, EncodeError};
use crate::model::{ContentBlock, Dialect, FinishReason, InternalChatRequest, InternalChatResponse, Message, Role, ToolDef, ToolOutput, Usage};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub contents: Vec<WireContentEntry>,
    #[serde(default)]
    pub system_instruction: Option<WireContentEntry>,
    #[serde(default)]
    pub tools: Option<Vec<WireToolGroup>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireContentEntry {
    #[serde(default)]
    pub role: Option<String>,
    pub parts: Vec<WirePart>,
}

/// A Gemini `part`: `{"text":"hi"}` or `{"functionCall":{...}}` or
/// `{"functionResponse":{...}}`, each key present at most once per part. Real
/// wire parts are plain objects with these as optional fields, not an
/// externally-tagged enum with struct variants (which would require a
/// doubly-nested `{"text":{"text":"hi"}}` shape no provider ever sends).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<WireFunctionResponse>,
}

impl WirePart {
    fn text(text: String) -> Self {
        Self { text: Some(text), ..Self::default() }
    }

    fn function_call(function_call: WireFunctionCall) -> Self {
        Self {
            function_call: Some(function_call),
            ..Self::default()
        }
    }

    fn function_response(function_response: WireFunctionResponse) -> Self {
        Self {
            function_response: Some(function_response),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireFunctionResponse {
    pub name: String,
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireToolGroup {
    #[serde(default)]
    pub function_declarations: Vec<WireFunctionDecl>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireFunctionDecl {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub candidates: Vec<WireCandidate>,
    #[serde(default)]
    pub usage_metadata: WireUsage,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCandidate {
    pub content: WireContentEntry,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

pub fn parse(body: &Value) -> Result<WireRequest, DecodeError> {
    serde_json::from_value(body.clone()).map_err(|e| DecodeError::Malformed {
        dialect: Dialect::GeminiChat,
        message: e.to_string(),
    })
}

/// Decode a wire request. `stream` must be
/// supplied by the caller since Gemini signals streaming via the URL verb,
/// never a body field.
pub fn decode(wire: WireRequest, stream: bool) -> Result<InternalChatRequest, DecodeError> {
    let mut messages = Vec::new();

    if let Some(system) = wire.system_instruction {
        let text = system.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join("");
        messages.push(Message::text(Role::System, text));
    }

    for entry in wire.contents {
        messages.push(decode_entry(entry)?);
    }

    let tools = wire
        .tools
        .unwrap_or_default()
        .into_iter()
        .flat_map(|g| g.function_declarations)
        .map(|d| ToolDef {
            name: d.name,
            description: d.description,
            parameters: d.parameters,
        })
        .collect();

    Ok(InternalChatRequest {
        model: String::new(),
        messages,
        stream,
        tools,
        tool_choice: None,
        extra: wire.extra,
    })
}

fn decode_entry(entry: WireContentEntry) -> Result<Message, DecodeError> {
    let role = match entry.role.as_deref() {
        Some("model") => Role::Assistant,
        Some("function") => Role::Tool,
        _ => Role::User,
    };

    let mut has_tool_response = false;
    let mut content = Vec::with_capacity(entry.parts.len());
    for part in entry.parts {
        if let Some(text) = part.text {
            content.push(ContentBlock::Text { text });
        } else if let Some(function_call) = part.function_call {
            content.push(ContentBlock::ToolCall {
                id: function_call.name.clone(),
                name: function_call.name,
                arguments: function_call.args,
            });
        } else if let Some(function_response) = part.function_response {
            has_tool_response = true;
            content.push(ContentBlock::ToolResult {
                call_id: function_response.name.clone(),
                name: Some(function_response.name),
                output: ToolOutput::Json(function_response.response),
            });
        }
    }

    let role = if has_tool_response { Role::Tool } else { role };

    Ok(Message { role, content })
}

/// Encode the internal representation into a Gemini `generateContent` request body.
pub fn encode(req: &InternalChatRequest) -> Result<Value, EncodeError> {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for m in &req.messages {
        if m.role == Role::System && system_instruction.is_none() {
            system_instruction = Some(WireContentEntry {
                role: None,
                parts: vec![WirePart::text(m.text_content())],
            });
            continue;
        }
        contents.push(encode_message(m)?);
    }

    let tools = if req.tools.is_empty() {
        None
    } else {
        Some(vec![WireToolGroup {
            function_declarations: req
                .tools
                .iter()
                .map(|t| WireFunctionDecl {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }])
    };

    let wire = WireRequest {
        contents,
        system_instruction,
        tools,
        extra: req.extra.clone(),
    };

    serde_json::to_value(wire).map_err(|e| EncodeError {
        target: Dialect::GeminiChat,
        message: e.to_string(),
    })
}

fn encode_message(m: &Message) -> Result<WireContentEntry, EncodeError> {
    let role = match m.role {
        Role::Assistant => "model",
        Role::Tool => "function",
        _ => "user",
    };

    let mut parts = Vec::with_capacity(m.content.len());
    for block in &m.content {
        match block {
            ContentBlock::Text { text } => parts.push(WirePart::text(text.clone())),
            ContentBlock::ImageUrl { .. } => {}
            ContentBlock::ToolCall { name, arguments, .. } => {
                parts.push(WirePart::function_call(WireFunctionCall { name: name.clone(), args: arguments.clone() }))
            }
            ContentBlock::ToolResult { name, output, call_id } => parts.push(WirePart::function_response(WireFunctionResponse {
                name: name.clone().unwrap_or_else(|| call_id.clone()),
                response: match output {
                    ToolOutput::Json(v) => v.clone(),
                    ToolOutput::Text(t) => Value::String(t.clone()),
                },
            })),
        }
    }

    Ok(WireContentEntry { role: Some(role.to_string()), parts })
}

fn finish_reason_from_wire(reason: Option<&str>) -> Option<FinishReason> {
    match reason {
        Some("STOP") => Some(FinishReason::Stop),
        Some("MAX_TOKENS") => Some(FinishReason::Length),
        Some(_) => Some(FinishReason::Error),
        None => None,
    }
}

fn finish_reason_to_wire(reason: Option<FinishReason>) -> Option<String> {
    reason.map(|r| match r {
        FinishReason::Stop => "STOP",
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::Error => "OTHER",
    })
    .map(str::to_string)
}

pub fn decode_response(wire: WireResponse) -> Result<InternalChatResponse, DecodeError> {
    let candidate = wire.candidates.into_iter().next().ok_or_else(|| DecodeError::Malformed {
        dialect: Dialect::GeminiChat,
        message: "response has no candidates".to_string(),
    })?;
    let message = decode_entry(candidate.content)?;
    Ok(InternalChatResponse {
        id: String::new(),
        model: String::new(),
        messages: vec![message],
        finish_reason: finish_reason_from_wire(candidate.finish_reason.as_deref()),
        usage: Usage {
            input_tokens: wire.usage_metadata.prompt_token_count,
            output_tokens: wire.usage_metadata.candidates_token_count,
            total_tokens: wire.usage_metadata.total_token_count,
        },
        extra: BTreeMap::new(),
    })
}

pub fn encode_response(resp: &InternalChatResponse) -> Result<Value, EncodeError> {
    let message = resp.messages.first().cloned().unwrap_or(Message::text(Role::Assistant, ""));
    let content = encode_message(&message)?;

    let wire = WireResponse {
        candidates: vec![WireCandidate {
            content,
            finish_reason: finish_reason_to_wire(resp.finish_reason),
        }],
        usage_metadata: WireUsage {
            prompt_token_count: resp.usage.input_tokens,
            candidates_token_count: resp.usage.output_tokens,
            total_token_count: resp.usage.total_tokens,
        },
    };

    serde_json::to_value(wire).map_err(|e| EncodeError {
        target: Dialect::GeminiChat,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_role_rewrites_to_assistant() {
        let body = json!({"contents":[{"role":"model","parts":[{"text":"hi"}]}]});
        let internal = decode(parse(&body).unwrap(), false).unwrap();
        assert_eq!(internal.messages[0].role, Role::Assistant);
    }

    #[test]
    fn system_instruction_hoists_to_leading_message() {
        let body = json!({
            "systemInstruction": {"parts":[{"text":"be terse"}]},
            "contents": [{"role":"user","parts":[{"text":"ping"}]}]
        });
        let internal = decode(parse(&body).unwrap(), false).unwrap();
        assert_eq!(internal.messages[0].role, Role::System);
        assert_eq!(internal.messages[0].text_content(), "be terse");
    }

    #[test]
    fn function_call_args_kept_as_object() {
        let body = json!({
            "contents": [{"role":"model","parts":[{"functionCall":{"name":"f","args":{"x":1}}}]}]
        });
        let internal = decode(parse(&body).unwrap(), false).unwrap();
        let ContentBlock::ToolCall { arguments, .. } = &internal.messages[0].content[0] else {
            panic!("expected tool call");
        };
        assert_eq!(*arguments, json!({"x": 1}));
    }
}
