//! Local-model inference.
//!
//! All three variants (BoW, HashLinear, fastText) share one
//! `predict_proba(text) -> [0,1]` contract and one on-disk bundle format; they
//! differ only in how they turn text into a hashed sparse feature vector and
//! which classifier head sits on top of it.

pub mod bow;
pub mod fasttext;
pub mod hashlinear;

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PredictError;

/// Below this size a bundle is considered corrupted outright.
const MIN_BUNDLE_BYTES: u64 = 512;

/// Any predictor producing a violation probability for a block of text.
///
/// `Send + Sync` so the per-profile cache can hold
/// loaded predictors behind an `Arc` shared across request handlers.
pub trait Predictor: Send + Sync {
    fn predict_proba(&self, text: &str) -> Result<f32, PredictError>;
}

/// The JSON-serializable header prefixed to every bundle file. The remainder
/// of the file is `dim` little-endian `f32` weights, one per hashed feature
/// bucket, with the bias folded in as an extra leading weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleHeader {
    pub model_type: String,
    pub dim: usize,
    pub bias: f32,
}

/// A loaded model: header metadata plus the dense weight vector (length `dim`).
#[derive(Debug, Clone)]
pub struct Bundle {
    pub header: BundleHeader,
    pub weights: Vec<f32>,
}

impl Bundle {
    pub fn new(model_type: &str, weights: Vec<f32>, bias: f32) -> Self {
        Self {
            header: BundleHeader {
                model_type: model_type.to_string(),
                dim: weights.len(),
                bias,
            },
            weights,
        }
    }

    /// Write `<header json>\n<raw f32 weights>` to `path`.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        let header_json = serde_json::to_string(&self.header).map_err(std::io::Error::other)?;
        writeln!(file, "{header_json}")?;
        for w in &self.weights {
            file.write_all(&w.to_le_bytes())?;
        }
        Ok(())
    }

    /// Load a bundle from disk, applying corruption checks: size threshold,
    /// malformed header, and weight-count mismatch.
    pub fn load(path: &Path) -> Result<Self, PredictError> {
        let metadata = std::fs::metadata(path).map_err(|_| PredictError::Missing)?;
        if metadata.len() < MIN_BUNDLE_BYTES {
            return Err(PredictError::Corrupted("file smaller than minimum bundle size".to_string()));
        }

        let raw = std::fs::read(path).map_err(|e| PredictError::Corrupted(e.to_string()))?;
        let newline = raw.iter().position(|&b| b == b'\n').ok_or_else(|| PredictError::Corrupted("missing header newline".to_string()))?;

        let header: BundleHeader = serde_json::from_slice(&raw[..newline]).map_err(|e| PredictError::Corrupted(e.to_string()))?;

        let payload = &raw[newline + 1..];
        if payload.len() != header.dim * 4 {
            return Err(PredictError::Corrupted(format!(
                "expected {} weight bytes, found {}",
                header.dim * 4,
                payload.len()
            )));
        }

        let weights = payload.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();

        Ok(Self { header, weights })
    }

    /// Logistic-regression score over a sparse feature vector given as
    /// `(index, value)` pairs.
    pub fn predict_proba(&self, features: &[(usize, f32)]) -> f32 {
        let mut z = self.header.bias;
        for &(idx, value) in features {
            if let Some(w) = self.weights.get(idx) {
                z += w * value;
            }
        }
        sigmoid(z)
    }
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Hash a token into `[0, dim)` using the FNV-1a hash, shared by all three
/// feature extractors so the bundle format stays interchangeable.
pub fn hash_token(token: &str, dim: usize) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash as usize) % dim
}

/// Character n-grams of `text` for `n` in `min_n..=max_n`, over a
/// whitespace-collapsed lowercase projection.
pub fn char_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let normalized: String = text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let chars: Vec<char> = normalized.chars().collect();

    let mut grams = Vec::new();
    for n in min_n..=max_n {
        if chars.len() < n {
            continue;
        }
        for window in chars.windows(n) {
            grams.push(window.iter().collect());
        }
    }
    grams
}

/// Whitespace/punctuation word tokens, lowercased.
pub fn word_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Detect an obviously corrupted model by running a canary prediction and
/// checking the output is a finite probability.
pub fn canary_check(predictor: &dyn Predictor) -> Result<(), PredictError> {
    let p = predictor.predict_proba("canary")?;
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(PredictError::Corrupted("canary prediction out of range".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let bundle = Bundle::new("bow", vec![0.1; 256], -0.2);
        bundle.save(&path).unwrap();

        let loaded = Bundle::load(&path).unwrap();
        assert_eq!(loaded.header.dim, 256);
        assert!((loaded.header.bias - (-0.2)).abs() < 1e-6);
        assert_eq!(loaded.weights.len(), 256);
    }

    #[test]
    fn undersized_file_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.bin");
        std::fs::write(&path, b"{}").unwrap();

        assert!(matches!(Bundle::load(&path), Err(PredictError::Corrupted(_))));
    }
}
