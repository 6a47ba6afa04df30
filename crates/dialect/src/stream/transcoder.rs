//! Composes a [`super::framer::SseFramer`] with a per-dialect decoder and
//! encoder into one stateful pipeline: raw source bytes in, raw target-dialect
//! SSE bytes out.

use crate::error::DecodeError;
use crate::model::Dialect;

use super::decode::{ClaudeDecoder, GeminiDecoder, OpenAiChatDecoder, OpenAiResponsesDecoder};
use super::encode::{ClaudeEncoder, GeminiEncoder, OpenAiChatEncoder, OpenAiResponsesEncoder};
use super::framer::SseFramer;

enum Decoder {
    OpenAiChat(OpenAiChatDecoder),
    OpenAiResponses(OpenAiResponsesDecoder),
    Claude(ClaudeDecoder),
    Gemini(GeminiDecoder),
}

enum Encoder {
    OpenAiChat(OpenAiChatEncoder),
    OpenAiResponses(OpenAiResponsesEncoder),
    Claude(ClaudeEncoder),
    Gemini(GeminiEncoder),
}

/// Transcodes a live SSE byte stream from `source`'s wire format to `target`'s.
///
/// When `source == target` the transcoder still frames and re-emits bytes
/// unchanged rather than special-casing identity, since every caller expects
/// this type to own the framing regardless of whether a conversion happens.
pub struct Transcoder {
    framer: SseFramer,
    decoder: Decoder,
    encoder: Encoder,
    identity: bool,
}

impl Transcoder {
    pub fn new(source: Dialect, target: Dialect) -> Self {
        let decoder = match source {
            Dialect::OpenaiChat => Decoder::OpenAiChat(OpenAiChatDecoder::new()),
            Dialect::OpenaiResponses => Decoder::OpenAiResponses(OpenAiResponsesDecoder::new()),
            Dialect::ClaudeChat => Decoder::Claude(ClaudeDecoder::new()),
            Dialect::GeminiChat => Decoder::Gemini(GeminiDecoder::new()),
        };
        let encoder = match target {
            Dialect::OpenaiChat => Encoder::OpenAiChat(OpenAiChatEncoder::new()),
            Dialect::OpenaiResponses => Encoder::OpenAiResponses(OpenAiResponsesEncoder::new()),
            Dialect::ClaudeChat => Encoder::Claude(ClaudeEncoder::new()),
            Dialect::GeminiChat => Encoder::Gemini(GeminiEncoder::new()),
        };

        Self { framer: SseFramer::new(), decoder, encoder, identity: source == target }
    }

    /// Feed newly-received source bytes; returns fully-framed target-dialect
    /// SSE text ready to write to the response body.
    pub fn push(&mut self, chunk: &str) -> Result<String, DecodeError> {
        let mut out = String::new();
        for payload in self.framer.push(chunk) {
            out.push_str(&self.transcode_one(&payload)?);
        }
        Ok(out)
    }

    /// Flush a trailing partial frame at stream end.
    pub fn finish(mut self) -> Result<String, DecodeError> {
        match self.framer.finish() {
            Some(payload) => self.transcode_one(&payload),
            None => Ok(String::new()),
        }
    }

    fn transcode_one(&mut self, payload: &str) -> Result<String, DecodeError> {
        if self.identity {
            return Ok(format!("data: {payload}\n\n"));
        }

        let events = match &mut self.decoder {
            Decoder::OpenAiChat(d) => d.decode(payload)?,
            Decoder::OpenAiResponses(d) => d.decode(payload)?,
            Decoder::Claude(d) => d.decode(payload)?,
            Decoder::Gemini(d) => d.decode(payload)?,
        };

        let mut out = String::new();
        for event in &events {
            let frames = match &mut self.encoder {
                Encoder::OpenAiChat(e) => e.encode(event),
                Encoder::OpenAiResponses(e) => e.encode(event),
                Encoder::Claude(e) => e.encode(event),
                Encoder::Gemini(e) => e.encode(event),
            };
            for f in frames {
                out.push_str(&f);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transcode_passes_bytes_through_unchanged() {
        let mut t = Transcoder::new(Dialect::OpenaiChat, Dialect::OpenaiChat);
        let out = t.push("data: {\"anything\":true}\n\n").unwrap();
        assert_eq!(out, "data: {\"anything\":true}\n\n");
    }

    #[test]
    fn claude_to_openai_chat_converts_text_delta() {
        let mut t = Transcoder::new(Dialect::ClaudeChat, Dialect::OpenaiChat);
        let out = t
            .push("data: {\"type\":\"message_start\",\"message\":{\"id\":\"m1\",\"model\":\"claude-3\",\"usage\":{\"input_tokens\":1}}}\n\n")
            .unwrap();
        assert!(out.contains("chat.completion.chunk"));

        let out = t.push("data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n").unwrap();
        assert!(out.is_empty());

        let out = t
            .push("data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n")
            .unwrap();
        assert!(out.contains("\"content\":\"hi\""));
    }

    #[test]
    fn openai_chat_to_claude_converts_done_to_message_stop() {
        let mut t = Transcoder::new(Dialect::OpenaiChat, Dialect::ClaudeChat);
        let out = t.push("data: [DONE]\n\n").unwrap();
        assert!(out.contains("message_stop"));
    }
}
