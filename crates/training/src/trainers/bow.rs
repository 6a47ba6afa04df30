//! Trains the BoW variant: Jieba-style word tokens plus character 2/3-grams,
//! TF-IDF weighted, fit by SGD logistic regression with class-balanced
//! example weighting folded into the learning rate per example.
//!
//! Unlike the other two variants, BoW persists a second file (the IDF table)
//! alongside the weight bundle, since the vectorizer itself carries state
//! learned from the training corpus.

use std::collections::HashMap;
use std::path::Path;

use moderation::predictor::bow::{raw_counts, save_idf, DEFAULT_DIM};
use moderation::predictor::Bundle;
use storage::SampleRecord;

use crate::error::TrainingError;
use crate::trainers::logistic::{fit, TrainingExample};

/// Smoothed IDF: `ln((1 + N) / (1 + df)) + 1`, the sklearn `TfidfVectorizer`
/// default, avoiding division by zero for a feature absent from the corpus.
fn build_idf(docs: &[HashMap<usize, f32>], dim: usize) -> HashMap<usize, f32> {
    let n = docs.len() as f32;
    let mut df: HashMap<usize, u32> = HashMap::new();
    for doc in docs {
        for &idx in doc.keys() {
            *df.entry(idx).or_insert(0) += 1;
        }
    }

    df.into_iter()
        .filter(|&(idx, _)| idx < dim)
        .map(|(idx, count)| (idx, ((1.0 + n) / (1.0 + count as f32)).ln() + 1.0))
        .collect()
}

pub fn train(
    records: &[SampleRecord],
    epochs: usize,
    batch_size: usize,
    max_seconds: u64,
    seed: u64,
    model_path: &Path,
    vectorizer_path: &Path,
) -> Result<(), TrainingError> {
    let term_counts: Vec<HashMap<usize, f32>> = records.iter().map(|r| raw_counts(&r.text, DEFAULT_DIM)).collect();
    let idf = build_idf(&term_counts, DEFAULT_DIM);

    let mut examples: Vec<TrainingExample> = term_counts
        .iter()
        .zip(records)
        .map(|(counts, record)| {
            let features = counts.iter().map(|(&idx, &tf)| (idx, tf * idf.get(&idx).copied().unwrap_or(1.0))).collect();
            TrainingExample {
                features,
                label: record.label as f32,
            }
        })
        .collect();

    let (weights, bias) = fit(&mut examples, DEFAULT_DIM, epochs, batch_size, 0.1, max_seconds, seed, |epoch, seen, elapsed| {
        log::info!("bow training: epoch {epoch} done, {seen} examples, {elapsed:?} elapsed");
    });

    let tmp_model = model_path.with_extension("tmp");
    Bundle::new("bow", weights, bias).save(&tmp_model)?;
    std::fs::rename(&tmp_model, model_path)?;

    let tmp_vectorizer = vectorizer_path.with_extension("tmp");
    save_idf(&tmp_vectorizer, &idf)?;
    std::fs::rename(&tmp_vectorizer, vectorizer_path)?;

    Ok(())
}
