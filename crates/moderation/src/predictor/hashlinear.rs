//! HashLinear predictor: character 2-4 grams hashed with no sign
//! alternation, L2-normalized.

use std::path::Path;

use crate::error::PredictError;

use super::{Bundle, Predictor, char_ngrams, hash_token};

pub const DEFAULT_DIM: usize = 1 << 14;

pub struct HashLinearPredictor {
    bundle: Bundle,
}

impl HashLinearPredictor {
    pub fn load(model_path: &Path) -> Result<Self, PredictError> {
        Ok(Self { bundle: Bundle::load(model_path)? })
    }

    fn features(&self, text: &str) -> Vec<(usize, f32)> {
        extract(text, self.bundle.header.dim)
    }
}

/// Character 2-4 grams hashed into `[0, dim)` and L2-normalized, shared by
/// inference and training.
pub fn extract(text: &str, dim: usize) -> Vec<(usize, f32)> {
    let mut counts = vec![0.0f32; dim];

    for gram in char_ngrams(text, 2, 4) {
        counts[hash_token(&gram, dim)] += 1.0;
    }

    let norm = counts.iter().map(|c| c * c).sum::<f32>().sqrt();
    if norm > 0.0 {
        for c in &mut counts {
            *c /= norm;
        }
    }

    counts.into_iter().enumerate().filter(|(_, v)| *v != 0.0).collect()
}

impl Predictor for HashLinearPredictor {
    fn predict_proba(&self, text: &str) -> Result<f32, PredictError> {
        Ok(self.bundle.predict_proba(&self.features(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalized_features_stay_in_unit_range() {
        let bundle = Bundle::new("hashlinear", vec![0.05; DEFAULT_DIM], 0.1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashlinear.model");
        bundle.save(&path).unwrap();

        let predictor = HashLinearPredictor::load(&path).unwrap();
        let p = predictor.predict_proba("some moderately long sentence to hash").unwrap();
        assert!((0.0..=1.0).contains(&p));
    }
}
