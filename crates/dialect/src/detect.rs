//! Dialect detection.
//!
//! Detection is evaluated in a caller-supplied order; the first positive match
//! wins. Headers are matched case-insensitively by the caller (we expect
//! already-lowercased keys here to keep this module free of an HTTP dependency).

use std::collections::HashMap;

use serde_json::Value;

use crate::error::DetectError;
use crate::model::Dialect;

/// Everything detection needs to know about an incoming request, abstracted
/// away from any particular HTTP framework.
pub struct DetectionRequest<'a> {
    pub path: &'a str,
    pub host: Option<&'a str>,
    pub headers: &'a HashMap<String, String>,
    pub body: &'a Value,
}

fn header<'a>(req: &'a DetectionRequest<'a>, name: &str) -> Option<&'a str> {
    req.headers.get(name).map(String::as_str)
}

fn is_openai_chat(req: &DetectionRequest<'_>) -> bool {
    let path_match = req.path.ends_with("/chat/completions");
    let body_match = req
        .body
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.first())
        .is_some_and(|first| first.get("role").is_some());
    path_match || body_match
}

fn is_openai_responses(req: &DetectionRequest<'_>) -> bool {
    let path_match = req.path.contains("/responses");
    let body_match = req.body.get("input").is_some() && req.body.get("model").is_some();
    let response_shape = req.body.get("object").and_then(Value::as_str) == Some("response") && req.body.get("output").is_some();
    path_match || body_match || response_shape
}

fn is_claude_chat(req: &DetectionRequest<'_>) -> bool {
    let path_match = req.path.ends_with("/messages") && header(req, "anthropic-version").is_some();
    let body_match = req
        .body
        .get("messages")
        .and_then(Value::as_array)
        .is_some_and(|messages| {
            messages.iter().any(|m| {
                m.get("content")
                    .and_then(Value::as_array)
                    .is_some_and(|items| {
                        items.iter().any(|item| {
                            item.get("type").is_some()
                                && (item.get("text").is_some() || item.get("tool_use").is_some() || item.get("tool_result").is_some())
                        })
                    })
            })
        });
    path_match || body_match
}

fn is_gemini_chat(req: &DetectionRequest<'_>) -> bool {
    let host_match = req.host.is_some_and(|h| h.contains("generativelanguage.googleapis.com"));
    let path_match = req.path.contains(":generateContent") || req.path.contains(":streamGenerateContent");
    let body_match = req
        .body
        .get("contents")
        .and_then(Value::as_array)
        .is_some_and(|contents| {
            contents
                .iter()
                .any(|c| c.get("parts").and_then(Value::as_array).is_some_and(|p| !p.is_empty()))
        });
    host_match || path_match || body_match
}

fn matches(dialect: Dialect, req: &DetectionRequest<'_>) -> bool {
    match dialect {
        Dialect::OpenaiChat => is_openai_chat(req),
        Dialect::OpenaiResponses => is_openai_responses(req),
        Dialect::ClaudeChat => is_claude_chat(req),
        Dialect::GeminiChat => is_gemini_chat(req),
    }
}

/// How detection should behave when nothing in `allowed` matches.
pub enum DetectionMode {
    /// Forward the body untransformed (`format_transform.strict_parse == false`, or `from == "auto"`).
    PassThroughOnMiss,
    /// Reject with [`DetectError::NoMatch`] / [`DetectError::ExcludedMatch`].
    Strict,
}

/// Detect the dialect of a request, trying `allowed` in order.
///
/// `Ok(Some(dialect))`: matched.
/// `Ok(None)`: nothing matched and `mode` is [`DetectionMode::PassThroughOnMiss`].
/// `Err`: nothing in `allowed` matched, detection is strict, and either no dialect
/// at all matched ([`DetectError::NoMatch`]) or a dialect outside `allowed` did
/// ([`DetectError::ExcludedMatch`]).
pub fn detect(req: &DetectionRequest<'_>, allowed: &[Dialect], mode: DetectionMode) -> Result<Option<Dialect>, DetectError> {
    for &candidate in allowed {
        if matches(candidate, req) {
            return Ok(Some(candidate));
        }
    }

    match mode {
        DetectionMode::PassThroughOnMiss => Ok(None),
        DetectionMode::Strict => {
            const ALL: [Dialect; 4] = [Dialect::OpenaiChat, Dialect::OpenaiResponses, Dialect::ClaudeChat, Dialect::GeminiChat];
            for candidate in ALL {
                if !allowed.contains(&candidate) && matches(candidate, req) {
                    return Err(DetectError::ExcludedMatch(candidate));
                }
            }
            Err(DetectError::NoMatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req<'a>(path: &'a str, headers: &'a HashMap<String, String>, body: &'a Value) -> DetectionRequest<'a> {
        DetectionRequest { path, host: None, headers, body }
    }

    #[test]
    fn detects_openai_chat_by_path() {
        let headers = HashMap::new();
        let body = json!({});
        let r = req("/v1/chat/completions", &headers, &body);
        assert_eq!(
            detect(&r, &[Dialect::OpenaiChat, Dialect::ClaudeChat], DetectionMode::PassThroughOnMiss).unwrap(),
            Some(Dialect::OpenaiChat)
        );
    }

    #[test]
    fn detects_claude_by_header_and_path() {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".to_string(), "2023-06-01".to_string());
        let body = json!({});
        let r = req("/v1/messages", &headers, &body);
        assert_eq!(
            detect(&r, &[Dialect::OpenaiChat, Dialect::ClaudeChat], DetectionMode::PassThroughOnMiss).unwrap(),
            Some(Dialect::ClaudeChat)
        );
    }

    #[test]
    fn detects_gemini_by_host_and_verb() {
        let headers = HashMap::new();
        let body = json!({});
        let r = DetectionRequest {
            path: "/v1beta/models/gemini-pro:streamGenerateContent",
            host: Some("generativelanguage.googleapis.com"),
            headers: &headers,
            body: &body,
        };
        assert_eq!(
            detect(&r, &[Dialect::GeminiChat], DetectionMode::Strict).unwrap(),
            Some(Dialect::GeminiChat)
        );
    }

    #[test]
    fn unknown_shape_passes_through_in_non_strict_mode() {
        let headers = HashMap::new();
        let body = json!({"prompt": "legacy completions shape"});
        let r = req("/v1/completions", &headers, &body);
        assert_eq!(
            detect(&r, &[Dialect::OpenaiChat], DetectionMode::PassThroughOnMiss).unwrap(),
            None
        );
    }

    #[test]
    fn strict_mode_reports_excluded_dialect() {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".to_string(), "2023-06-01".to_string());
        let body = json!({});
        let r = req("/v1/messages", &headers, &body);
        let err = detect(&r, &[Dialect::OpenaiChat], DetectionMode::Strict).unwrap_err();
        assert!(matches!(err, DetectError::ExcludedMatch(Dialect::ClaudeChat)));
    }

    #[test]
    fn strict_mode_reports_no_match_when_nothing_fits() {
        let headers = HashMap::new();
        let body = json!({"prompt": "legacy"});
        let r = req("/v1/completions", &headers, &body);
        let err = detect(&r, &[Dialect::OpenaiChat], DetectionMode::Strict).unwrap_err();
        assert!(matches!(err, DetectError::NoMatch));
    }
}
