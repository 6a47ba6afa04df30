//! Per-dialect SSE payload encoders, the inverse of [`super::decode`].
//!
//! Each encoder consumes one [`StreamEvent`] at a time and returns zero or
//! more fully-framed `data: ...\n\n` strings ready to write to the response
//! body. State lives in the encoder because every dialect needs to remember
//! something across events: OpenAI needs an incrementing tool-call index,
//! Claude needs open content-block bookkeeping, Gemini needs to buffer
//! fragmented tool-call arguments back into one complete JSON object.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::model::{FinishReason, StreamEvent, Usage};

fn frame(value: &Value) -> String {
    format!("data: {value}\n\n")
}

// ---------------------------------------------------------------------
// OpenAI Chat Completions
// ---------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct OpenAiChatEncoder {
    id: String,
    model: String,
    created: u64,
    next_index: u32,
    tool_indices: HashMap<String, u32>,
}

impl OpenAiChatEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, event: &StreamEvent) -> Vec<String> {
        match event {
            StreamEvent::Start { id, model, created_at } => {
                self.id = id.clone();
                self.model = model.clone();
                self.created = *created_at;
                vec![frame(&self.chunk(json!({"role": "assistant", "content": ""}), None))]
            }
            StreamEvent::TextDelta { text } => vec![frame(&self.chunk(json!({"content": text}), None))],
            StreamEvent::ToolCallStart { id, name } => {
                let index = self.next_index;
                self.next_index += 1;
                self.tool_indices.insert(id.clone(), index);
                vec![frame(&self.chunk(
                    json!({"tool_calls": [{"index": index, "id": id, "type": "function", "function": {"name": name, "arguments": ""}}]}),
                    None,
                ))]
            }
            StreamEvent::ToolCallArgsDelta { id, delta, .. } => {
                let index = self.tool_indices.get(id).copied().unwrap_or(0);
                vec![frame(&self.chunk(json!({"tool_calls": [{"index": index, "function": {"arguments": delta}}]}), None))]
            }
            StreamEvent::Final { finish_reason, usage } => {
                let mut frames = vec![frame(&self.chunk(json!({}), finish_reason_to_wire(*finish_reason)))];
                if let Some(usage) = usage {
                    frames.push(frame(&json!({
                        "id": self.id,
                        "object": "chat.completion.chunk",
                        "created": self.created,
                        "model": self.model,
                        "choices": [],
                        "usage": {
                            "prompt_tokens": usage.input_tokens,
                            "completion_tokens": usage.output_tokens,
                            "total_tokens": usage.total_tokens,
                        },
                    })));
                }
                frames
            }
            StreamEvent::Done => vec!["data: [DONE]\n\n".to_string()],
        }
    }

    fn chunk(&self, delta: Value, finish_reason: Option<&'static str>) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
        })
    }
}

fn finish_reason_to_wire(reason: Option<FinishReason>) -> Option<&'static str> {
    reason.map(|r| match r {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::Error => "content_filter",
    })
}

// ---------------------------------------------------------------------
// Claude (Anthropic Messages)
// ---------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ClaudeEncoder {
    next_index: u32,
    open_block: Option<u32>,
    tool_indices: HashMap<String, u32>,
}

impl ClaudeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, event: &StreamEvent) -> Vec<String> {
        match event {
            StreamEvent::Start { id, model, .. } => vec![frame(&json!({
                "type": "message_start",
                "message": {"id": id, "type": "message", "role": "assistant", "content": [], "model": model, "usage": {"input_tokens": 0, "output_tokens": 0}},
            }))],
            StreamEvent::TextDelta { text } => {
                let mut frames = Vec::new();
                if self.open_block.is_none() {
                    let index = self.open_index();
                    frames.push(frame(&json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}})));
                }
                let index = self.open_block.unwrap();
                frames.push(frame(&json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": text}})));
                frames
            }
            StreamEvent::ToolCallStart { id, name } => {
                let mut frames = self.close_open_block();
                let index = self.open_index();
                self.tool_indices.insert(id.clone(), index);
                frames.push(frame(&json!({
                    "type": "content_block_start",
                    "index": index,
                    "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}},
                })));
                frames
            }
            StreamEvent::ToolCallArgsDelta { id, delta, .. } => {
                let index = self.tool_indices.get(id).copied().unwrap_or(0);
                vec![frame(&json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": delta}}))]
            }
            StreamEvent::Final { finish_reason, usage } => {
                let mut frames = self.close_open_block();
                frames.push(frame(&json!({
                    "type": "message_delta",
                    "delta": {"stop_reason": stop_reason_from_finish(*finish_reason)},
                    "usage": {"output_tokens": usage.map(|u| u.output_tokens).unwrap_or(0)},
                })));
                frames
            }
            StreamEvent::Done => vec![frame(&json!({"type": "message_stop"}))],
        }
    }

    fn open_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        self.open_block = Some(index);
        index
    }

    fn close_open_block(&mut self) -> Vec<String> {
        match self.open_block.take() {
            Some(index) => vec![frame(&json!({"type": "content_block_stop", "index": index}))],
            None => vec![],
        }
    }
}

fn stop_reason_from_finish(reason: Option<FinishReason>) -> &'static str {
    match reason {
        Some(FinishReason::Stop) | None => "end_turn",
        Some(FinishReason::Length) => "max_tokens",
        Some(FinishReason::Error) => "stop_sequence",
    }
}

// ---------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct GeminiEncoder {
    pending_call: Option<(String, String, String)>,
}

impl GeminiEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, event: &StreamEvent) -> Vec<String> {
        match event {
            StreamEvent::Start { .. } => vec![],
            StreamEvent::TextDelta { text } => {
                let mut frames = self.flush_pending_call();
                frames.push(frame(&self.candidate_chunk(json!({"text": text}), None, None)));
                frames
            }
            StreamEvent::ToolCallStart { id, name } => {
                let frames = self.flush_pending_call();
                self.pending_call = Some((id.clone(), name.clone(), String::new()));
                frames
            }
            StreamEvent::ToolCallArgsDelta { id, delta, .. } => {
                if let Some((pending_id, _, buf)) = &mut self.pending_call {
                    if pending_id == id {
                        buf.push_str(delta);
                    }
                }
                vec![]
            }
            StreamEvent::Final { finish_reason, usage } => {
                let mut frames = self.flush_pending_call();
                frames.push(frame(&self.candidate_chunk(json!(null), finish_reason_to_wire(*finish_reason), usage.as_ref())));
                frames
            }
            StreamEvent::Done => vec![],
        }
    }

    fn flush_pending_call(&mut self) -> Vec<String> {
        let Some((_, name, args)) = self.pending_call.take() else { return vec![] };
        let parsed: Value = serde_json::from_str(&args).unwrap_or_else(|_| json!({}));
        vec![frame(&self.candidate_chunk(json!({"functionCall": {"name": name, "args": parsed}}), None, None))]
    }

    fn candidate_chunk(&self, part: Value, finish_reason: Option<&'static str>, usage: Option<&Usage>) -> Value {
        let parts = if part.is_null() { vec![] } else { vec![part] };
        let mut chunk = json!({
            "candidates": [{"content": {"role": "model", "parts": parts}, "finishReason": finish_reason}],
        });
        if let Some(usage) = usage {
            chunk["usageMetadata"] = json!({
                "promptTokenCount": usage.input_tokens,
                "candidatesTokenCount": usage.output_tokens,
                "totalTokenCount": usage.total_tokens,
            });
        }
        chunk
    }
}

fn finish_reason_to_wire_gemini(reason: Option<FinishReason>) -> Option<&'static str> {
    reason.map(|r| match r {
        FinishReason::Stop => "STOP",
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::Error => "OTHER",
    })
}

use finish_reason_to_wire_gemini as finish_reason_to_wire;

// ---------------------------------------------------------------------
// OpenAI Responses
// ---------------------------------------------------------------------

/// Emits `response.created` + `response.in_progress` once, then text / tool-call
/// events, then `response.completed` with mapped status and usage.
#[derive(Debug, Default)]
pub struct OpenAiResponsesEncoder {
    id: String,
    model: String,
    created: u64,
    next_output_index: u32,
    tool_indices: HashMap<String, u32>,
    started: bool,
}

impl OpenAiResponsesEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, event: &StreamEvent) -> Vec<String> {
        match event {
            StreamEvent::Start { id, model, created_at } => {
                self.id = id.clone();
                self.model = model.clone();
                self.created = *created_at;
                self.started = true;
                vec![
                    frame(&json!({"type": "response.created", "response": self.response_envelope("in_progress", None)})),
                    frame(&json!({"type": "response.in_progress", "response": self.response_envelope("in_progress", None)})),
                ]
            }
            StreamEvent::TextDelta { text } => vec![frame(&json!({"type": "response.output_text.delta", "delta": text}))],
            StreamEvent::ToolCallStart { id, name } => {
                let index = self.next_output_index;
                self.next_output_index += 1;
                self.tool_indices.insert(id.clone(), index);
                vec![frame(&json!({
                    "type": "response.output_item.added",
                    "output_index": index,
                    "item": {"id": id, "type": "function_call", "name": name, "arguments": ""},
                }))]
            }
            StreamEvent::ToolCallArgsDelta { id, delta, .. } => {
                vec![frame(&json!({"type": "response.function_call_arguments.delta", "item_id": id, "delta": delta}))]
            }
            StreamEvent::Final { finish_reason, usage } => {
                let status = match finish_reason {
                    Some(FinishReason::Stop) | None => "completed",
                    Some(FinishReason::Length) => "incomplete",
                    Some(FinishReason::Error) => "failed",
                };
                let event_type = match status {
                    "completed" => "response.completed",
                    "incomplete" => "response.incomplete",
                    _ => "response.failed",
                };
                vec![frame(&json!({"type": event_type, "response": self.response_envelope(status, *usage)}))]
            }
            StreamEvent::Done => vec!["data: [DONE]\n\n".to_string()],
        }
    }

    fn response_envelope(&self, status: &str, usage: Option<Usage>) -> Value {
        let mut envelope = json!({
            "id": self.id,
            "object": "response",
            "model": self.model,
            "created_at": self.created,
            "status": status,
        });
        if let Some(usage) = usage {
            envelope["usage"] = json!({
                "input_tokens": usage.input_tokens,
                "output_tokens": usage.output_tokens,
                "total_tokens": usage.total_tokens,
            });
        }
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_encoder_emits_done_sentinel_verbatim() {
        let mut e = OpenAiChatEncoder::new();
        assert_eq!(e.encode(&StreamEvent::Done), vec!["data: [DONE]\n\n".to_string()]);
    }

    #[test]
    fn openai_encoder_assigns_incrementing_tool_indices() {
        let mut e = OpenAiChatEncoder::new();
        let frames = e.encode(&StreamEvent::ToolCallStart { id: "c1".to_string(), name: "f".to_string() });
        assert!(frames[0].contains("\"index\":0") || frames[0].contains("\"index\": 0"));
    }

    #[test]
    fn claude_encoder_closes_block_before_final() {
        let mut e = ClaudeEncoder::new();
        e.encode(&StreamEvent::TextDelta { text: "hi".to_string() });
        let frames = e.encode(&StreamEvent::Final { finish_reason: Some(FinishReason::Stop), usage: None });
        assert!(frames[0].contains("content_block_stop"));
        assert!(frames[1].contains("message_delta"));
    }

    #[test]
    fn responses_encoder_emits_created_and_in_progress_on_start() {
        let mut e = OpenAiResponsesEncoder::new();
        let frames = e.encode(&StreamEvent::Start { id: "resp_1".to_string(), model: "gpt-x".to_string(), created_at: 1 });
        assert!(frames[0].contains("response.created"));
        assert!(frames[1].contains("response.in_progress"));
    }

    #[test]
    fn responses_encoder_maps_length_finish_to_incomplete_status() {
        let mut e = OpenAiResponsesEncoder::new();
        e.encode(&StreamEvent::Start { id: "resp_1".to_string(), model: "gpt-x".to_string(), created_at: 1 });
        let frames = e.encode(&StreamEvent::Final { finish_reason: Some(FinishReason::Length), usage: None });
        assert!(frames[0].contains("response.incomplete"));
        assert!(frames[0].contains("\"status\":\"incomplete\""));
    }

    #[test]
    fn gemini_encoder_buffers_fragmented_args_until_flush() {
        let mut e = GeminiEncoder::new();
        e.encode(&StreamEvent::ToolCallStart { id: "c1".to_string(), name: "f".to_string() });
        assert!(e.encode(&StreamEvent::ToolCallArgsDelta { id: "c1".to_string(), name: "f".to_string(), delta: "{\"a\":1}".to_string() }).is_empty());
        let frames = e.encode(&StreamEvent::Final { finish_reason: Some(FinishReason::Stop), usage: None });
        assert!(frames[0].contains("functionCall"));
        assert!(frames[0].contains("\"a\":1"));
    }
}
