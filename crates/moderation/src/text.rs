//! Moderation text projection.
//!
//! Both the keyword filter and the local classifier operate on a single
//! flattened string rather than the structured request, so this projection
//! is shared by both stages.

use dialect::{ContentBlock, InternalChatRequest, Role};

/// Concatenate with `\n` the text content of every `user` and `assistant`
/// message in the request, in order. Non-text content blocks (images, tool
/// calls, tool results) are skipped.
pub fn project(request: &InternalChatRequest) -> String {
    let mut lines = Vec::new();

    for message in &request.messages {
        if !matches!(message.role, Role::User | Role::Assistant) {
            continue;
        }

        for block in &message.content {
            if let ContentBlock::Text { text } = block {
                lines.push(text.as_str());
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialect::Message;

    #[test]
    fn skips_system_and_non_text_blocks() {
        let request = InternalChatRequest {
            model: "test".to_string(),
            messages: vec![
                Message {
                    role: Role::System,
                    content: vec![ContentBlock::Text {
                        text: "system prompt".to_string(),
                    }],
                },
                Message {
                    role: Role::User,
                    content: vec![ContentBlock::Text {
                        text: "hello".to_string(),
                    }],
                },
                Message {
                    role: Role::Assistant,
                    content: vec![ContentBlock::Text {
                        text: "world".to_string(),
                    }],
                },
            ],
            ..Default::default()
        };

        assert_eq!(project(&request), "hello\nworld");
    }
}
