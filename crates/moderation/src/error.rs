//! Failures raised by the moderation engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile.json at {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("profile.json at {path} is malformed: {source}")]
    Malformed { path: String, source: serde_json::Error },
    #[error("probability.low_risk_threshold ({low}) must be <= high_risk_threshold ({high})")]
    ThresholdOrder { low: f64, high: f64 },
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model file missing")]
    Missing,
    #[error("model file is corrupted: {0}")]
    Corrupted(String),
    #[error("prediction failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum AdjudicationError {
    #[error("request to AI adjudicator failed: {0}")]
    Request(String),
    #[error("AI adjudicator reply did not contain a parseable JSON object")]
    NoJsonObject,
    #[error("AI adjudicator reply failed to parse: {0}")]
    Parse(String),
}
