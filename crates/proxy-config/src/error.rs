//! The structured error envelope every proxy-originated failure is returned
//! as, plus the error raised while extracting per-request config.

use serde::Serialize;
use thiserror::Error;

/// Failure parsing the `/{config}${upstream}` request URL.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("request URL is missing the '$' separator between config and upstream target")]
    MissingSeparator,
    #[error("config segment is not valid percent-encoded UTF-8: {0}")]
    NotUtf8(String),
    #[error("config segment is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("upstream target is not a valid URL: {0}")]
    InvalidUpstreamUrl(String),
}

/// One of the five error codes this proxy ever returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "CONFIG_PARSE_ERROR")]
    ConfigParseError,
    #[serde(rename = "MODERATION_BLOCKED")]
    ModerationBlocked,
    #[serde(rename = "TRANSFORM_ERROR")]
    TransformError,
    #[serde(rename = "UPSTREAM_ERROR")]
    UpstreamError,
    #[serde(rename = "PROXY_ERROR")]
    ProxyError,
}

impl ErrorCode {
    /// The HTTP status this error code is reported under: 400 for config and
    /// moderation failures, 500 for upstream and internal failures.
    pub fn status(self) -> u16 {
        match self {
            ErrorCode::ConfigParseError | ErrorCode::ModerationBlocked | ErrorCode::TransformError => 400,
            ErrorCode::UpstreamError | ErrorCode::ProxyError => 500,
        }
    }
}

/// `{"error": {"code", "message", "type", "source_format"?}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                kind: "proxy_error",
                source_format: None,
            },
        }
    }

    pub fn with_source_format(mut self, dialect: impl Into<String>) -> Self {
        self.error.source_format = Some(dialect.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.error.code.status()
    }
}

impl From<ConfigError> for ErrorEnvelope {
    fn from(err: ConfigError) -> Self {
        ErrorEnvelope::new(ErrorCode::ConfigParseError, err.to_string())
    }
}
