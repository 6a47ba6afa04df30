//! Per-request configuration extraction.

mod error;
mod extract;
mod model;

pub use error::{ConfigError, ErrorBody, ErrorCode, ErrorEnvelope};
pub use extract::{ExtractedRequest, extract};
pub use model::{BasicModerationConfig, FormatTransformConfig, FromSpec, RequestConfig, SmartModerationConfig, StreamOverride};
