//! Splits the `/{config}${upstream}` request URL shape into a
//! [`RequestConfig`] and the upstream target to forward to.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::{ConfigError, RequestConfig};

/// The outcome of extracting configuration from a request's raw target.
pub struct ExtractedRequest {
    pub config: RequestConfig,
    pub upstream: Url,
}

/// Parse a raw request target (path, optionally with a leading `/` and a
/// trailing query string) of the form
/// `/{percent-encoded JSON config}${upstream base URL}{sub-path}`.
///
/// This splits on the *first* `$` only; everything after it,
/// including any further `$` characters, belongs to the upstream target.
pub fn extract(raw_target: &str) -> Result<ExtractedRequest, ConfigError> {
    let trimmed = raw_target.strip_prefix('/').unwrap_or(raw_target);
    let (encoded_config, upstream_part) = trimmed.split_once('$').ok_or(ConfigError::MissingSeparator)?;

    let decoded = percent_decode_str(encoded_config)
        .decode_utf8()
        .map_err(|e| ConfigError::NotUtf8(e.to_string()))?;

    let config: RequestConfig = serde_json::from_str(&decoded).map_err(|e| ConfigError::MalformedJson(e.to_string()))?;

    let upstream = Url::parse(upstream_part).map_err(|e| ConfigError::InvalidUpstreamUrl(e.to_string()))?;

    Ok(ExtractedRequest { config, upstream })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_dollar_only() {
        let encoded = percent_encoding::utf8_percent_encode(
            r#"{"format_transform":{"enabled":true}}"#,
            percent_encoding::NON_ALPHANUMERIC,
        )
        .to_string();

        let target = format!("/{encoded}$https://api.openai.com/v1/chat/completions?foo=$bar");
        let extracted = extract(&target).unwrap();

        assert!(extracted.config.format_transform.enabled);
        assert_eq!(extracted.upstream.as_str(), "https://api.openai.com/v1/chat/completions?foo=$bar");
    }

    #[test]
    fn missing_separator_is_rejected() {
        let err = extract("/no-separator-here").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSeparator));
    }

    #[test]
    fn unknown_top_level_keys_are_preserved() {
        let encoded =
            percent_encoding::utf8_percent_encode(r#"{"future_feature":{"x":1}}"#, percent_encoding::NON_ALPHANUMERIC)
                .to_string();
        let target = format!("/{encoded}$https://api.openai.com/v1/chat/completions");
        let extracted = extract(&target).unwrap();

        assert!(extracted.config.extra.contains_key("future_feature"));
    }
}
