//! Bidirectional conversion between the four supported LLM provider wire
//! formats and a single canonical internal representation.

pub mod detect;
pub mod error;
pub mod messages;
pub mod model;
pub mod stream;

pub use detect::{detect, DetectionMode, DetectionRequest};
pub use error::{DecodeError, EncodeError, DetectError};
pub use model::{
    ContentBlock, Dialect, FinishReason, InternalChatRequest, InternalChatResponse, Message, Role, StreamEvent, ToolDef, ToolOutput, Usage,
};

use serde_json::Value;

/// Decode a request body of a known `dialect` into the internal representation.
pub fn decode_request(dialect: Dialect, body: &Value, stream_hint: bool) -> Result<InternalChatRequest, DecodeError> {
    match dialect {
        Dialect::OpenaiChat => messages::openai_chat::decode(messages::openai_chat::parse(body)?),
        Dialect::OpenaiResponses => messages::openai_responses::decode(messages::openai_responses::parse(body)?),
        Dialect::ClaudeChat => messages::claude::decode(messages::claude::parse(body)?),
        Dialect::GeminiChat => messages::gemini::decode(messages::gemini::parse(body)?, stream_hint),
    }
}

/// Encode the internal representation into a request body for `target`.
pub fn encode_request(target: Dialect, req: &InternalChatRequest) -> Result<Value, EncodeError> {
    match target {
        Dialect::OpenaiChat => messages::openai_chat::encode(req),
        Dialect::OpenaiResponses => messages::openai_responses::encode(req),
        Dialect::ClaudeChat => messages::claude::encode(req),
        Dialect::GeminiChat => messages::gemini::encode(req),
    }
}

/// Decode a non-streaming response body of a known `dialect`.
pub fn decode_response(dialect: Dialect, body: &Value) -> Result<InternalChatResponse, DecodeError> {
    match dialect {
        Dialect::OpenaiChat => messages::openai_chat::decode_response(serde_json::from_value(body.clone()).map_err(|e| DecodeError::Malformed {
            dialect: Dialect::OpenaiChat,
            message: e.to_string(),
        })?),
        Dialect::OpenaiResponses => messages::openai_responses::decode_response(serde_json::from_value(body.clone()).map_err(|e| {
            DecodeError::Malformed {
                dialect: Dialect::OpenaiResponses,
                message: e.to_string(),
            }
        })?),
        Dialect::ClaudeChat => messages::claude::decode_response(serde_json::from_value(body.clone()).map_err(|e| DecodeError::Malformed {
            dialect: Dialect::ClaudeChat,
            message: e.to_string(),
        })?),
        Dialect::GeminiChat => messages::gemini::decode_response(serde_json::from_value(body.clone()).map_err(|e| DecodeError::Malformed {
            dialect: Dialect::GeminiChat,
            message: e.to_string(),
        })?),
    }
}

/// Encode the internal representation into a non-streaming response body for `target`.
pub fn encode_response(target: Dialect, resp: &InternalChatResponse) -> Result<Value, EncodeError> {
    match target {
        Dialect::OpenaiChat => messages::openai_chat::encode_response(resp),
        Dialect::OpenaiResponses => messages::openai_responses::encode_response(resp),
        Dialect::ClaudeChat => messages::claude::encode_response(resp),
        Dialect::GeminiChat => messages::gemini::encode_response(resp),
    }
}
