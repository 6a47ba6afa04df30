//! Byte-level SSE framing shared by every dialect.
//!
//! Splits a raw SSE byte stream on blank lines and concatenates the `data:`
//! lines of each event, independent of any `event:`/`id:` lines a dialect may
//! also send (Claude's typed events carry their own `"type"` field inside the
//! JSON body, so we never need to parse `event:` separately).

/// Incremental frame assembler. Feed it arbitrary byte chunks as they arrive
/// off the wire; it yields complete `data:` payloads as soon as a blank line
/// terminates the event that carried them.
#[derive(Debug, Default)]
pub struct SseFramer {
    buf: String,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-received text and drain any complete frames.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut frames = Vec::new();

        loop {
            let Some(pos) = find_blank_line(&self.buf) else { break };
            let event = self.buf[..pos.0].to_string();
            self.buf.drain(..pos.1);
            if let Some(data) = extract_data(&event) {
                frames.push(data);
            }
        }

        frames
    }

    /// Flush whatever partial frame remains at stream end (no trailing blank line).
    pub fn finish(self) -> Option<String> {
        extract_data(&self.buf)
    }
}

/// Returns `(event_end, consumed_len)` for the first blank-line-terminated
/// event in `buf`, tolerating both `\n\n` and `\r\n\r\n`.
fn find_blank_line(buf: &str) -> Option<(usize, usize)> {
    if let Some(pos) = buf.find("\n\n") {
        return Some((pos, pos + 2));
    }
    if let Some(pos) = buf.find("\r\n\r\n") {
        return Some((pos, pos + 4));
    }
    None
}

fn extract_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_events_from_one_chunk() {
        let mut f = SseFramer::new();
        let frames = f.push("data: {\"a\":1}\n\ndata: {\"a\":2}\n\n");
        assert_eq!(frames, vec!["{\"a\":1}".to_string(), "{\"a\":2}".to_string()]);
    }

    #[test]
    fn handles_event_split_across_chunks() {
        let mut f = SseFramer::new();
        assert!(f.push("data: {\"a\"").is_empty());
        let frames = f.push(":1}\n\n");
        assert_eq!(frames, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn joins_multiline_data_fields() {
        let mut f = SseFramer::new();
        let frames = f.push("data: line one\ndata: line two\n\n");
        assert_eq!(frames, vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn ignores_non_data_lines() {
        let mut f = SseFramer::new();
        let frames = f.push("event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
        assert_eq!(frames, vec!["{\"type\":\"message_start\"}".to_string()]);
    }

    #[test]
    fn finish_flushes_trailing_partial_frame() {
        let mut f = SseFramer::new();
        assert!(f.push("data: {\"a\":1}").is_empty());
        assert_eq!(f.finish(), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn recognizes_done_sentinel() {
        let mut f = SseFramer::new();
        let frames = f.push("data: [DONE]\n\n");
        assert_eq!(frames, vec!["[DONE]".to_string()]);
    }
}
