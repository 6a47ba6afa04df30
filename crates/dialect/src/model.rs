//! Canonical internal representation shared by every dialect.
//!
//! A decoder turns a dialect-specific wire body into an [`InternalChatRequest`];
//! an encoder turns one back into any target dialect. Neither side needs to know
//! about any dialect but its own.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which of the four supported wire protocols a request or response uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    OpenaiChat,
    OpenaiResponses,
    ClaudeChat,
    GeminiChat,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::OpenaiChat => "openai_chat",
            Dialect::OpenaiResponses => "openai_responses",
            Dialect::ClaudeChat => "claude_chat",
            Dialect::GeminiChat => "gemini_chat",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "openai_chat" => Some(Dialect::OpenaiChat),
            "openai_responses" => Some(Dialect::OpenaiResponses),
            "claude_chat" => Some(Dialect::ClaudeChat),
            "gemini_chat" => Some(Dialect::GeminiChat),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the four conversational roles carried across every dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content element inside a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { url: String, detail: Option<String> },
    ToolCall { id: String, name: String, arguments: Value },
    ToolResult {
        call_id: String,
        name: Option<String>,
        output: ToolOutput,
    },
}

/// A tool result's output, which providers encode either as raw text or as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn as_text(&self) -> String {
        match self {
            ToolOutput::Text(s) => s.clone(),
            ToolOutput::Json(v) => v.to_string(),
        }
    }
}

/// One turn in a conversation.
///
/// Invariant: `content` is never empty; a `Tool`-role message carries only
/// `ToolResult` blocks; `Assistant` may mix `Text` and `ToolCall` blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Concatenate every text block in this message with no separator.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A function/tool the model may call, unique by name within a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
}

/// The request side of the canonical representation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InternalChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub tools: Vec<ToolDef>,
    pub tool_choice: Option<Value>,
    /// Carrier fields (temperature, safety settings, ...) with no moderation role.
    pub extra: BTreeMap<String, Value>,
}

impl InternalChatRequest {
    /// Tool names deduplicated in first-seen order, matching the "unique by name" invariant.
    pub fn unique_tool_names(&self) -> IndexSet<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// The response side of the canonical representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalChatResponse {
    pub id: String,
    pub model: String,
    /// Canonically one assistant message.
    pub messages: Vec<Message>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
    pub extra: BTreeMap<String, Value>,
}

/// A single event produced while decoding an upstream SSE stream, and consumed
/// while re-encoding it into the caller's dialect.
///
/// Invariant: exactly one `Start` precedes any content event; `Done` is always
/// last; `Final` precedes `Done` when the upstream signals completion; tool-call
/// events for a given id appear in order `ToolCallStart` then zero or more
/// `ToolCallArgsDelta`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start {
        id: String,
        model: String,
        created_at: u64,
    },
    TextDelta {
        text: String,
    },
    ToolCallStart {
        id: String,
        name: String,
    },
    /// A textual JSON fragment; may be partial for fragmenting dialects, or a
    /// complete object in one shot for dialects (Gemini) that never fragment.
    ToolCallArgsDelta {
        id: String,
        name: String,
        delta: String,
    },
    Final {
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
    },
    Done,
}
