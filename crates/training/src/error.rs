//! Failures raised while training or managing the training lifecycle.
//!
//! None of these ever reach a request handler; the scheduler logs them and
//! the subprocess records them into `.train_status.json`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("profile error: {0}")]
    Profile(#[from] moderation::ProfileError),
    #[error("sample store error: {0}")]
    Store(#[from] storage::StoreError),
    #[error("model validation failed: {0}")]
    Predict(#[from] moderation::PredictError),
    #[error("too few samples to train (have {have}, need {need})")]
    InsufficientSamples { have: usize, need: usize },
    #[error("training exceeded its time budget of {0:?}")]
    TimeBudgetExceeded(std::time::Duration),
    #[error("`.train.lock` is already held by another process")]
    LockHeld,
}
