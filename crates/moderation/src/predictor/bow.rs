//! BoW predictor: word tokens plus character 2/3-grams, TF-IDF weighted.

use std::collections::HashMap;
use std::path::Path;

use crate::error::PredictError;

use super::{Bundle, Predictor, char_ngrams, hash_token, word_tokens};

pub const DEFAULT_DIM: usize = 1 << 16;

/// A BoW model pairs the hashed logistic bundle with an IDF table keyed by
/// feature index, persisted alongside it as the separate vectorizer file
/// (`Profile::vectorizer_path`).
pub struct BowPredictor {
    bundle: Bundle,
    idf: HashMap<usize, f32>,
}

impl BowPredictor {
    pub fn load(model_path: &Path, vectorizer_path: &Path) -> Result<Self, PredictError> {
        let bundle = Bundle::load(model_path)?;
        let idf = load_idf(vectorizer_path)?;
        Ok(Self { bundle, idf })
    }

    fn features(&self, text: &str) -> Vec<(usize, f32)> {
        raw_counts(text, self.bundle.header.dim)
            .into_iter()
            .map(|(idx, tf)| {
                let idf = self.idf.get(&idx).copied().unwrap_or(1.0);
                (idx, tf * idf)
            })
            .collect()
    }
}

/// Raw (pre-IDF) term counts over word tokens plus character 2/3-grams,
/// shared by inference and by the trainer building the IDF table.
pub fn raw_counts(text: &str, dim: usize) -> HashMap<usize, f32> {
    let mut counts: HashMap<usize, f32> = HashMap::new();

    for token in word_tokens(text) {
        *counts.entry(hash_token(&token, dim)).or_default() += 1.0;
    }
    for gram in char_ngrams(text, 2, 3) {
        *counts.entry(hash_token(&gram, dim)).or_default() += 1.0;
    }

    counts
}

impl Predictor for BowPredictor {
    fn predict_proba(&self, text: &str) -> Result<f32, PredictError> {
        let features = self.features(text);
        Ok(self.bundle.predict_proba(&features))
    }
}

/// `<feature index> <idf weight>` lines, one per entry with a non-default weight.
fn load_idf(path: &Path) -> Result<HashMap<usize, f32>, PredictError> {
    let content = std::fs::read_to_string(path).map_err(|_| PredictError::Missing)?;

    let mut idf = HashMap::new();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(idx), Some(weight)) = (parts.next(), parts.next()) else {
            continue;
        };
        let idx: usize = idx.parse().map_err(|_| PredictError::Corrupted("vectorizer index unparseable".to_string()))?;
        let weight: f32 = weight.parse().map_err(|_| PredictError::Corrupted("vectorizer weight unparseable".to_string()))?;
        idf.insert(idx, weight);
    }
    Ok(idf)
}

/// Write the vectorizer file back out, used by the training loop.
pub fn save_idf(path: &Path, idf: &HashMap<usize, f32>) -> std::io::Result<()> {
    let mut lines: Vec<String> = idf.iter().map(|(idx, w)| format!("{idx} {w}")).collect();
    lines.sort();
    std::fs::write(path, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_in_unit_range() {
        let bundle = Bundle::new("bow", vec![0.01; DEFAULT_DIM], 0.0);
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("bow.model");
        let vec_path = dir.path().join("bow.vectorizer");
        bundle.save(&model_path).unwrap();
        save_idf(&vec_path, &HashMap::new()).unwrap();

        let predictor = BowPredictor::load(&model_path, &vec_path).unwrap();
        let p = predictor.predict_proba("this is a test sentence").unwrap();
        assert!((0.0..=1.0).contains(&p));
    }
}
