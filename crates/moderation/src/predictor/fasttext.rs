//! fastText predictor: averaged hashed word/char-gram embeddings feeding a
//! single logistic unit, as a simplified stand-in for fastText's supervised
//! mode.

use std::path::Path;

use crate::error::PredictError;

use super::{Bundle, Predictor, char_ngrams, hash_token, word_tokens};

pub const DEFAULT_DIM: usize = 1 << 14;

pub struct FastTextPredictor {
    bundle: Bundle,
}

impl FastTextPredictor {
    pub fn load(model_path: &Path) -> Result<Self, PredictError> {
        Ok(Self { bundle: Bundle::load(model_path)? })
    }

    fn features(&self, text: &str) -> Vec<(usize, f32)> {
        extract(text, self.bundle.header.dim)
    }
}

/// Averaged hashed word-token and 3-gram embeddings, shared by inference and
/// training.
pub fn extract(text: &str, dim: usize) -> Vec<(usize, f32)> {
    let mut tokens = word_tokens(text);
    tokens.extend(char_ngrams(text, 3, 3));

    if tokens.is_empty() {
        return Vec::new();
    }

    let mut sums = std::collections::HashMap::new();
    for token in &tokens {
        *sums.entry(hash_token(token, dim)).or_insert(0.0f32) += 1.0;
    }

    let count = tokens.len() as f32;
    sums.into_iter().map(|(idx, total)| (idx, total / count)).collect()
}

impl Predictor for FastTextPredictor {
    fn predict_proba(&self, text: &str) -> Result<f32, PredictError> {
        Ok(self.bundle.predict_proba(&self.features(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_bias_only_prediction() {
        let bundle = Bundle::new("fasttext", vec![1.0; DEFAULT_DIM], 0.25);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fasttext.bin");
        bundle.save(&path).unwrap();

        let predictor = FastTextPredictor::load(&path).unwrap();
        let p = predictor.predict_proba("").unwrap();
        let expected = 1.0 / (1.0 + (-0.25f32).exp());
        assert!((p - expected).abs() < 1e-5);
    }
}
