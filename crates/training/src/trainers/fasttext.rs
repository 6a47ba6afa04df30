//! Trains the fastText variant: averaged hashed word/char-gram embeddings
//! feeding a single logistic unit (a simplified stand-in for fastText's own
//! supervised mode, sharing the same bundle format as the other variants).

use std::path::Path;

use moderation::predictor::fasttext::{extract, DEFAULT_DIM};
use moderation::predictor::Bundle;
use storage::SampleRecord;

use crate::error::TrainingError;
use crate::trainers::logistic::{fit, prepare_examples};

pub fn train(records: &[SampleRecord], epochs: usize, batch_size: usize, max_seconds: u64, seed: u64, model_path: &Path) -> Result<(), TrainingError> {
    let mut examples = prepare_examples(records, |text| extract(text, DEFAULT_DIM));

    let (weights, bias) = fit(&mut examples, DEFAULT_DIM, epochs, batch_size, 0.1, max_seconds, seed, |epoch, seen, elapsed| {
        log::info!("fasttext training: epoch {epoch} done, {seen} examples, {elapsed:?} elapsed");
    });

    let tmp_path = model_path.with_extension("tmp");
    Bundle::new("fasttext", weights, bias).save(&tmp_path)?;
    std::fs::rename(&tmp_path, model_path)?;
    Ok(())
}
