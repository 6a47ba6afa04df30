//! Trains the HashLinear variant: character 2-4 gram hashed features,
//! L2-normalized, fit by mini-batch SGD logistic regression. Designed to
//! stay well under 10 MB on disk.

use std::path::Path;
use std::time::Duration;

use moderation::predictor::hashlinear::{extract, DEFAULT_DIM};
use moderation::predictor::Bundle;
use storage::SampleRecord;

use crate::error::TrainingError;
use crate::trainers::logistic::{fit, prepare_examples};

pub fn train(records: &[SampleRecord], epochs: usize, batch_size: usize, max_seconds: u64, seed: u64, model_path: &Path) -> Result<(), TrainingError> {
    let mut examples = prepare_examples(records, |text| extract(text, DEFAULT_DIM));

    let (weights, bias) = fit(&mut examples, DEFAULT_DIM, epochs, batch_size, 0.1, max_seconds, seed, |epoch, seen, elapsed| {
        log::info!("hashlinear training: epoch {epoch} done, {seen} examples, {elapsed:?} elapsed");
    });

    let tmp_path = model_path.with_extension("tmp");
    Bundle::new("hashlinear", weights, bias).save(&tmp_path)?;
    std::fs::rename(&tmp_path, model_path)?;
    Ok(())
}

pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);
