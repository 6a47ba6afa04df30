//! Two-stage moderation: a keyword filter followed by a local-classifier /
//! AI-adjudicator routing decision, plus the on-disk profile schema and
//! predictor implementations that back the Smart stage.

pub mod adjudicator;
pub mod cache;
pub mod engine;
pub mod error;
pub mod keyword;
pub mod predictor;
pub mod profile;
pub mod text;

pub use adjudicator::{adjudicate, AdjudicationResult, Verdict};
pub use cache::ModelCache;
pub use engine::{evaluate, text_fingerprint, Decision, Stage};
pub use error::{AdjudicationError, PredictError, ProfileError};
pub use keyword::{KeywordFilter, KeywordRegistry};
pub use predictor::Predictor;
pub use profile::{AiConfig, LocalModelType, Profile, ProfileConfig, SampleLoadingStrategy, TrainingConfig};
