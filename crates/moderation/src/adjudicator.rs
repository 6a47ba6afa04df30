//! AI adjudication calls.

use serde::Deserialize;
use serde_json::Value;

use crate::error::AdjudicationError;
use crate::profile::AiConfig;

/// The parsed verdict extracted from the adjudicator's reply, on success.
#[derive(Debug, Clone, Deserialize)]
pub struct Verdict {
    pub violation: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Outcome of one adjudication call. Failure is never propagated to the
/// caller as an error: the caller always gets a usable verdict, tagged so it
/// can be recorded faithfully in the sample store.
#[derive(Debug, Clone)]
pub struct AdjudicationResult {
    pub verdict: Verdict,
    /// `Some(...)` when the call or parse failed; the verdict above is then
    /// the fallback "no violation" default.
    pub error: Option<String>,
}

/// Render `template`, replacing the literal placeholder `{{text}}` with `text` verbatim.
fn render_prompt(template: &str, text: &str) -> String {
    template.replace("{{text}}", text)
}

/// Scan `reply` for the first balanced `{...}` substring and parse it as JSON.
fn extract_json_object(reply: &str) -> Result<Value, AdjudicationError> {
    let start = reply.find('{').ok_or(AdjudicationError::NoJsonObject)?;

    let mut depth = 0i32;
    let mut end = None;
    for (offset, ch) in reply[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset + ch.len_utf8());
                    break;
                }
            }
            _ => {}
        }
    }

    let end = end.ok_or(AdjudicationError::NoJsonObject)?;
    serde_json::from_str(&reply[start..end]).map_err(|e| AdjudicationError::Parse(e.to_string()))
}

/// Call the configured chat-completion endpoint and parse its reply into a [`Verdict`].
///
/// Any failure — network, non-2xx status, missing/unparseable JSON — is
/// swallowed into the `error` field of the returned result rather than
/// propagated: adjudicator failures never block a request.
pub async fn adjudicate(client: &reqwest::Client, config: &AiConfig, text: &str) -> AdjudicationResult {
    let fallback = Verdict {
        violation: false,
        category: None,
        reason: None,
    };

    let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
    let prompt = render_prompt(&config.prompt_template, text);

    let body = serde_json::json!({
        "model": config.model,
        "temperature": 0,
        "messages": [{"role": "user", "content": prompt}],
    });

    let send_result = client
        .post(format!("{}/chat/completions", config.base_url.trim_end_matches('/')))
        .bearer_auth(api_key)
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .json(&body)
        .send()
        .await;

    let reply = match parse_reply(send_result).await {
        Ok(reply) => reply,
        Err(err) => {
            log::warn!("AI adjudicator call failed: {err}");
            return AdjudicationResult {
                verdict: fallback,
                error: Some(err.to_string()),
            };
        }
    };

    match extract_json_object(&reply).and_then(|json| serde_json::from_value(json).map_err(|e| AdjudicationError::Parse(e.to_string()))) {
        Ok(verdict) => AdjudicationResult { verdict, error: None },
        Err(err) => {
            log::warn!("AI adjudicator reply unparseable: {err}");
            AdjudicationResult {
                verdict: fallback,
                error: Some(err.to_string()),
            }
        }
    }
}

async fn parse_reply(send_result: reqwest::Result<reqwest::Response>) -> Result<String, AdjudicationError> {
    let response = send_result.map_err(|e| AdjudicationError::Request(e.to_string()))?;
    let response = response.error_for_status().map_err(|e| AdjudicationError::Request(e.to_string()))?;
    let json: Value = response.json().await.map_err(|e| AdjudicationError::Request(e.to_string()))?;

    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AdjudicationError::Request("response missing choices[0].message.content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_balanced_object_amid_surrounding_prose() {
        let reply = r#"Sure, here you go: {"violation": true, "category": "x", "nested": {"a": 1}} trailing text"#;
        let value = extract_json_object(reply).unwrap();
        assert_eq!(value["violation"], true);
        assert_eq!(value["category"], "x");
    }

    #[test]
    fn no_object_is_an_error() {
        assert!(extract_json_object("no json here").is_err());
    }

    #[test]
    fn renders_placeholder_verbatim() {
        assert_eq!(render_prompt("check: {{text}}", "hello \"world\""), "check: hello \"world\"");
    }
}
