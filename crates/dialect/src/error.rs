//! Errors raised while classifying, decoding, or encoding a dialect.

use thiserror::Error;

use crate::model::Dialect;

/// Failure decoding a wire body of a known dialect into the internal representation.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{dialect}: {message}")]
    Malformed { dialect: Dialect, message: String },
}

impl DecodeError {
    pub fn dialect(&self) -> Dialect {
        match self {
            DecodeError::Malformed { dialect, .. } => *dialect,
        }
    }
}

/// Failure encoding the internal representation into a target dialect.
///
/// Encoder failures never block a request: callers catch this, log a
/// warning, and forward the source body unchanged instead.
#[derive(Debug, Error)]
#[error("{target}: {message}")]
pub struct EncodeError {
    pub target: Dialect,
    pub message: String,
}

/// Failure detecting which dialect a request belongs to.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no dialect matched and strict_parse is enabled")]
    NoMatch,

    #[error("request matches excluded dialect {0}")]
    ExcludedMatch(Dialect),
}
