//! Per-request configuration schema.
//!
//! Unlike `config::Config`, this is re-parsed on every single request out of
//! the URL-embedded JSON blob; nothing here is loaded once at
//! startup.

use std::path::PathBuf;

use dialect::Dialect;
use serde::Deserialize;
use serde_json::{Map, Value};

/// The decoded per-request configuration blob.
///
/// Unknown top-level keys are preserved in `extra` and otherwise ignored.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RequestConfig {
    pub basic_moderation: BasicModerationConfig,
    pub smart_moderation: SmartModerationConfig,
    pub format_transform: FormatTransformConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `basic_moderation.*`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BasicModerationConfig {
    pub enabled: bool,
    pub keywords_file: Option<PathBuf>,
    pub error_code: Option<String>,
}

/// `smart_moderation.*`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SmartModerationConfig {
    pub enabled: bool,
    pub profile: Option<String>,
}

/// `format_transform.*`: dialect bridge toggles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormatTransformConfig {
    pub enabled: bool,
    pub from: FromSpec,
    pub to: Option<String>,
    pub stream: StreamOverride,
    pub strict_parse: bool,
}

impl Default for FormatTransformConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            from: FromSpec::default(),
            to: None,
            stream: StreamOverride::default(),
            strict_parse: false,
        }
    }
}

impl FormatTransformConfig {
    /// The explicit source dialect if there is exactly one acceptable one,
    /// used by re-encoders to know if a transform is actually a no-op.
    pub fn to_dialect(&self) -> Option<Dialect> {
        self.to.as_deref().and_then(Dialect::parse)
    }
}

/// `format_transform.from`: `"auto"`, a single dialect name, or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FromSpec {
    List(Vec<String>),
    Single(String),
}

impl Default for FromSpec {
    fn default() -> Self {
        FromSpec::Single("auto".to_string())
    }
}

impl FromSpec {
    pub fn is_auto(&self) -> bool {
        matches!(self, FromSpec::Single(s) if s == "auto")
    }

    /// The fixed set of dialects this request is allowed to arrive as, or
    /// `None` when detection should consider all four (`"auto"`).
    pub fn allowed(&self) -> Option<Vec<Dialect>> {
        if self.is_auto() {
            return None;
        }

        let names: Vec<&str> = match self {
            FromSpec::List(names) => names.iter().map(String::as_str).collect(),
            FromSpec::Single(name) => vec![name.as_str()],
        };

        Some(names.iter().filter_map(|n| Dialect::parse(n)).collect())
    }
}

/// `format_transform.stream`: `"auto"` inherits the request's own `stream`
/// flag; otherwise force one way or the other.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StreamOverride {
    Auto(AutoMarker),
    Force(bool),
}

/// A `serde(untagged)` enum can't match a bare string literal directly, so we
/// deserialize `"auto"` into this unit-like wrapper and validate its content.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoMarker(String);

impl Default for StreamOverride {
    fn default() -> Self {
        StreamOverride::Auto(AutoMarker("auto".to_string()))
    }
}

impl StreamOverride {
    pub fn resolve(&self, request_stream: bool) -> bool {
        match self {
            StreamOverride::Auto(_) => request_stream,
            StreamOverride::Force(forced) => *forced,
        }
    }
}
