//! Per-dialect SSE payload decoders. Each decoder is stateful: fragmenting
//! dialects (OpenAI, Claude) announce a tool call's id/name once and then
//! stream bare argument fragments by index, so the decoder has to remember
//! which index belongs to which call.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::model::{Dialect, FinishReason, StreamEvent, Usage};

fn malformed(dialect: Dialect, e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Malformed { dialect, message: e.to_string() }
}

// ---------------------------------------------------------------------
// OpenAI Chat Completions
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: u64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: ChatFunctionDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Default)]
pub struct OpenAiChatDecoder {
    started: bool,
    index_to_id: BTreeMap<u32, String>,
    index_to_name: BTreeMap<u32, String>,
}

impl OpenAiChatDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, payload: &str) -> Result<Vec<StreamEvent>, DecodeError> {
        if payload == "[DONE]" {
            return Ok(vec![StreamEvent::Done]);
        }

        let chunk: ChatChunk = serde_json::from_str(payload).map_err(|e| malformed(Dialect::OpenaiChat, e))?;
        let mut events = Vec::new();

        if !self.started && (!chunk.id.is_empty() || !chunk.model.is_empty() || chunk.created != 0) {
            events.push(StreamEvent::Start { id: chunk.id, model: chunk.model, created_at: chunk.created });
            self.started = true;
        }

        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::TextDelta { text });
            }

            for call in choice.delta.tool_calls.unwrap_or_default() {
                if let Some(id) = call.id {
                    let name = call.function.name.clone().unwrap_or_default();
                    self.index_to_id.insert(call.index, id.clone());
                    self.index_to_name.insert(call.index, name.clone());
                    events.push(StreamEvent::ToolCallStart { id, name });
                }
                if let Some(args) = call.function.arguments {
                    let id = self.index_to_id.get(&call.index).cloned().unwrap_or_default();
                    let name = self.index_to_name.get(&call.index).cloned().unwrap_or_default();
                    events.push(StreamEvent::ToolCallArgsDelta { id, name, delta: args });
                }
            }

            if choice.finish_reason.is_some() || chunk.usage.is_some() {
                events.push(StreamEvent::Final {
                    finish_reason: choice.finish_reason.as_deref().map(finish_reason_from_wire),
                    usage: chunk.usage.map(|u| Usage {
                        input_tokens: u.prompt_tokens,
                        output_tokens: u.completion_tokens,
                        total_tokens: u.total_tokens,
                    }),
                });
            }
        }

        Ok(events)
    }
}

fn finish_reason_from_wire(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        _ => FinishReason::Error,
    }
}

// ---------------------------------------------------------------------
// Claude (Anthropic Messages)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeEvent {
    MessageStart { message: ClaudeMessageStart },
    ContentBlockStart { index: u32, content_block: ClaudeContentBlock },
    ContentBlockDelta { index: u32, delta: ClaudeDelta },
    ContentBlockStop { #[allow(dead_code)] index: u32 },
    MessageDelta { delta: ClaudeMessageDelta, #[serde(default)] usage: Option<ClaudeUsageDelta> },
    MessageStop,
    Ping,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessageStart {
    id: String,
    model: String,
    #[serde(default)]
    usage: ClaudeUsage,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsageDelta {
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContentBlock {
    Text { #[serde(default)] text: String },
    ToolUse { id: String, name: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct ClaudeMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct ClaudeDecoder {
    index_to_call: BTreeMap<u32, (String, String)>,
    input_tokens: u32,
}

impl ClaudeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, payload: &str) -> Result<Vec<StreamEvent>, DecodeError> {
        let event: ClaudeEvent = serde_json::from_str(payload).map_err(|e| malformed(Dialect::ClaudeChat, e))?;

        Ok(match event {
            ClaudeEvent::MessageStart { message } => {
                self.input_tokens = message.usage.input_tokens;
                vec![StreamEvent::Start { id: message.id, model: message.model, created_at: 0 }]
            }
            ClaudeEvent::ContentBlockStart { index, content_block: ClaudeContentBlock::ToolUse { id, name } } => {
                self.index_to_call.insert(index, (id.clone(), name.clone()));
                vec![StreamEvent::ToolCallStart { id, name }]
            }
            ClaudeEvent::ContentBlockStart { content_block: ClaudeContentBlock::Text { text }, .. } => {
                if text.is_empty() {
                    vec![]
                } else {
                    vec![StreamEvent::TextDelta { text }]
                }
            }
            ClaudeEvent::ContentBlockDelta { delta: ClaudeDelta::TextDelta { text }, .. } => vec![StreamEvent::TextDelta { text }],
            ClaudeEvent::ContentBlockDelta { index, delta: ClaudeDelta::InputJsonDelta { partial_json } } => {
                let (id, name) = self.index_to_call.get(&index).cloned().unwrap_or_default();
                vec![StreamEvent::ToolCallArgsDelta { id, name, delta: partial_json }]
            }
            ClaudeEvent::ContentBlockStop { .. } => vec![],
            ClaudeEvent::MessageDelta { delta, usage } => vec![StreamEvent::Final {
                finish_reason: delta.stop_reason.as_deref().map(finish_reason_from_stop),
                usage: usage.map(|u| Usage {
                    input_tokens: self.input_tokens,
                    output_tokens: u.output_tokens,
                    total_tokens: self.input_tokens + u.output_tokens,
                }),
            }],
            ClaudeEvent::MessageStop => vec![StreamEvent::Done],
            ClaudeEvent::Ping => vec![],
        })
    }
}

fn finish_reason_from_stop(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" | "tool_use" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        _ => FinishReason::Error,
    }
}

// ---------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// A Gemini `part`: `{"text":"hi"}` or `{"functionCall":{...}}`, each key
/// present at most once per part. Real wire parts are plain objects with
/// these as optional fields, not an externally-tagged enum with struct
/// variants (which would require a doubly-nested `{"text":{"text":"hi"}}`
/// shape no provider ever sends).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

/// Gemini never fragments a `functionCall`'s `args`; each chunk carries a
/// complete call. Gemini also never sends a call id on the wire, so this
/// decoder synthesizes one (`gemini_call_{n}`); callers that
/// round-trip must treat it as opaque.
#[derive(Debug, Default)]
pub struct GeminiDecoder {
    started: bool,
    next_call: u32,
}

impl GeminiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, payload: &str) -> Result<Vec<StreamEvent>, DecodeError> {
        let chunk: GeminiChunk = serde_json::from_str(payload).map_err(|e| malformed(Dialect::GeminiChat, e))?;
        let mut events = Vec::new();

        if !self.started {
            events.push(StreamEvent::Start { id: String::new(), model: String::new(), created_at: 0 });
            self.started = true;
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return Ok(events);
        };

        for part in candidate.content.parts {
            if let Some(text) = part.text {
                events.push(StreamEvent::TextDelta { text });
            } else if let Some(function_call) = part.function_call {
                let args = serde_json::to_string(&function_call.args).unwrap_or_else(|_| "{}".to_string());
                let id = format!("gemini_call_{}", self.next_call);
                self.next_call += 1;
                events.push(StreamEvent::ToolCallStart { id: id.clone(), name: function_call.name.clone() });
                events.push(StreamEvent::ToolCallArgsDelta { id, name: function_call.name, delta: args });
            }
        }

        if candidate.finish_reason.is_some() || chunk.usage_metadata.is_some() {
            events.push(StreamEvent::Final {
                finish_reason: candidate.finish_reason.as_deref().map(finish_reason_from_gemini),
                usage: chunk.usage_metadata.map(|u| Usage {
                    input_tokens: u.prompt_token_count,
                    output_tokens: u.candidates_token_count,
                    total_tokens: u.total_token_count,
                }),
            });
            events.push(StreamEvent::Done);
        }

        Ok(events)
    }
}

fn finish_reason_from_gemini(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        _ => FinishReason::Error,
    }
}

// ---------------------------------------------------------------------
// OpenAI Responses
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponsesEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponsesMeta },
    #[serde(rename = "response.in_progress")]
    InProgress { response: ResponsesMeta },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: ResponsesItem },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.completed")]
    Completed { response: ResponsesCompletion },
    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponsesCompletion },
    #[serde(rename = "response.failed")]
    Failed { response: ResponsesCompletion },
    #[serde(rename = "response.error")]
    Error {},
    /// Every other `response.*` event (e.g. `response.output_item.done`,
    /// `response.output_text.done`) carries no information this bridge needs.
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct ResponsesMeta {
    id: String,
    model: String,
    #[serde(default)]
    created_at: u64,
}

#[derive(Debug, Deserialize)]
struct ResponsesItem {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesCompletion {
    #[serde(default)]
    status: String,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Tracks the most recently announced `function_call` item id, since
/// `response.function_call_arguments.delta` frames don't repeat the call's
/// name.
#[derive(Debug, Default)]
pub struct OpenAiResponsesDecoder {
    started: bool,
    call_names: BTreeMap<String, String>,
}

impl OpenAiResponsesDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, payload: &str) -> Result<Vec<StreamEvent>, DecodeError> {
        if payload == "[DONE]" {
            return Ok(vec![StreamEvent::Done]);
        }

        let event: ResponsesEvent = serde_json::from_str(payload).map_err(|e| malformed(Dialect::OpenaiResponses, e))?;

        Ok(match event {
            ResponsesEvent::Created { response } | ResponsesEvent::InProgress { response } => {
                if self.started {
                    vec![]
                } else {
                    self.started = true;
                    vec![StreamEvent::Start { id: response.id, model: response.model, created_at: response.created_at }]
                }
            }
            ResponsesEvent::OutputItemAdded { item } if item.kind == "function_call" => {
                self.call_names.insert(item.id.clone(), item.name.clone());
                vec![StreamEvent::ToolCallStart { id: item.id, name: item.name }]
            }
            ResponsesEvent::OutputItemAdded { .. } => vec![],
            ResponsesEvent::OutputTextDelta { delta } => vec![StreamEvent::TextDelta { text: delta }],
            ResponsesEvent::FunctionCallArgumentsDelta { item_id, delta } => {
                let name = self.call_names.get(&item_id).cloned().unwrap_or_default();
                vec![StreamEvent::ToolCallArgsDelta { id: item_id, name, delta }]
            }
            ResponsesEvent::Completed { response } => vec![
                StreamEvent::Final { finish_reason: Some(finish_reason_from_responses_status(&response.status)), usage: response.usage.map(responses_usage) },
                StreamEvent::Done,
            ],
            ResponsesEvent::Incomplete { response } => vec![
                StreamEvent::Final { finish_reason: Some(FinishReason::Length), usage: response.usage.map(responses_usage) },
                StreamEvent::Done,
            ],
            ResponsesEvent::Failed { response } => vec![
                StreamEvent::Final { finish_reason: Some(FinishReason::Error), usage: response.usage.map(responses_usage) },
                StreamEvent::Done,
            ],
            ResponsesEvent::Error {} => vec![StreamEvent::Final { finish_reason: Some(FinishReason::Error), usage: None }, StreamEvent::Done],
            ResponsesEvent::Ignored => vec![],
        })
    }
}

fn responses_usage(u: ResponsesUsage) -> Usage {
    Usage { input_tokens: u.input_tokens, output_tokens: u.output_tokens, total_tokens: u.total_tokens }
}

fn finish_reason_from_responses_status(status: &str) -> FinishReason {
    match status {
        "completed" => FinishReason::Stop,
        "incomplete" => FinishReason::Length,
        _ => FinishReason::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_chat_decoder_emits_start_once() {
        let mut d = OpenAiChatDecoder::new();
        let first = d.decode(r#"{"id":"c1","created":1,"model":"gpt-x","choices":[{"delta":{"content":"hi"}}]}"#).unwrap();
        assert!(matches!(first[0], StreamEvent::Start { .. }));
        let second = d.decode(r#"{"id":"c1","created":1,"model":"gpt-x","choices":[{"delta":{"content":"!"}}]}"#).unwrap();
        assert!(!second.iter().any(|e| matches!(e, StreamEvent::Start { .. })));
    }

    #[test]
    fn openai_chat_decoder_tolerates_metadata_less_chunks_before_start() {
        let mut d = OpenAiChatDecoder::new();
        let first = d.decode(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap();
        assert!(!first.iter().any(|e| matches!(e, StreamEvent::Start { .. })));
        assert!(first.iter().any(|e| matches!(e, StreamEvent::TextDelta { text } if text == "hi")));

        let second = d.decode(r#"{"id":"c1","created":1,"model":"gpt-x","choices":[{"delta":{"content":"!"}}]}"#).unwrap();
        assert!(matches!(second[0], StreamEvent::Start { .. }));

        let third = d.decode(r#"{"id":"c1","created":1,"model":"gpt-x","choices":[{"delta":{"content":"?"}}]}"#).unwrap();
        assert!(!third.iter().any(|e| matches!(e, StreamEvent::Start { .. })));
    }

    #[test]
    fn openai_chat_decoder_tracks_tool_call_index_across_fragments() {
        let mut d = OpenAiChatDecoder::new();
        d.decode(r#"{"id":"c1","created":1,"model":"gpt-x","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"f","arguments":""}}]}}]}"#).unwrap();
        let events = d
            .decode(r#"{"id":"c1","created":1,"model":"gpt-x","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"a\":1}"}}]}}]}"#)
            .unwrap();
        let StreamEvent::ToolCallArgsDelta { id, name, delta } = &events[0] else { panic!("expected args delta") };
        assert_eq!(id, "call_1");
        assert_eq!(name, "f");
        assert_eq!(delta, "{\"a\":1}");
    }

    #[test]
    fn openai_chat_decoder_recognizes_done_sentinel() {
        let mut d = OpenAiChatDecoder::new();
        assert_eq!(d.decode("[DONE]").unwrap(), vec![StreamEvent::Done]);
    }

    #[test]
    fn claude_decoder_emits_start_from_message_start() {
        let mut d = ClaudeDecoder::new();
        let events = d
            .decode(r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-3","usage":{"input_tokens":10}}}"#)
            .unwrap();
        assert!(matches!(&events[0], StreamEvent::Start { id, .. } if id == "msg_1"));
    }

    #[test]
    fn claude_decoder_tracks_tool_use_block_index() {
        let mut d = ClaudeDecoder::new();
        d.decode(r#"{"type":"message_start","message":{"id":"m","model":"claude-3","usage":{"input_tokens":0}}}"#).unwrap();
        d.decode(r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"f"}}"#).unwrap();
        let events = d
            .decode(r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"a\":"}}"#)
            .unwrap();
        let StreamEvent::ToolCallArgsDelta { id, .. } = &events[0] else { panic!("expected args delta") };
        assert_eq!(id, "t1");
    }

    #[test]
    fn claude_decoder_message_stop_emits_done() {
        let mut d = ClaudeDecoder::new();
        assert_eq!(d.decode(r#"{"type":"message_stop"}"#).unwrap(), vec![StreamEvent::Done]);
    }

    #[test]
    fn responses_decoder_emits_start_once_from_created_or_in_progress() {
        let mut d = OpenAiResponsesDecoder::new();
        let first = d.decode(r#"{"type":"response.created","response":{"id":"resp_1","model":"gpt-x","created_at":5}}"#).unwrap();
        assert!(matches!(first[0], StreamEvent::Start { .. }));
        let second = d.decode(r#"{"type":"response.in_progress","response":{"id":"resp_1","model":"gpt-x","created_at":5}}"#).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn responses_decoder_maps_completion_status_to_finish_reason() {
        let mut d = OpenAiResponsesDecoder::new();
        let events = d
            .decode(r#"{"type":"response.incomplete","response":{"status":"incomplete","usage":{"input_tokens":1,"output_tokens":2,"total_tokens":3}}}"#)
            .unwrap();
        assert!(matches!(events[0], StreamEvent::Final { finish_reason: Some(FinishReason::Length), .. }));
        assert!(matches!(events[1], StreamEvent::Done));
    }

    #[test]
    fn responses_decoder_tracks_function_call_name_across_deltas() {
        let mut d = OpenAiResponsesDecoder::new();
        d.decode(r#"{"type":"response.output_item.added","item":{"id":"call_1","type":"function_call","name":"f"}}"#).unwrap();
        let events = d
            .decode(r#"{"type":"response.function_call_arguments.delta","item_id":"call_1","delta":"{\"a\":"}"#)
            .unwrap();
        let StreamEvent::ToolCallArgsDelta { id, name, delta } = &events[0] else { panic!("expected args delta") };
        assert_eq!(id, "call_1");
        assert_eq!(name, "f");
        assert_eq!(delta, "{\"a\":");
    }

    #[test]
    fn gemini_decoder_never_fragments_function_call_args() {
        let mut d = GeminiDecoder::new();
        let events = d
            .decode(r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"f","args":{"a":1}}}]},"finishReason":"STOP"}]}"#)
            .unwrap();
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCallArgsDelta { delta, .. } if delta == "{\"a\":1}")));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Done)));
    }

    #[test]
    fn gemini_decoder_synthesizes_opaque_call_ids() {
        let mut d = GeminiDecoder::new();
        let events = d
            .decode(r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"f","args":{}}}]}}]}"#)
            .unwrap();
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCallStart { id, .. } if id == "gemini_call_0")));
    }
}
