//! Per-profile in-memory model cache.
//!
//! The cache holds exactly one entry per profile name; it is not a
//! general-purpose LRU because only a single slot per profile is needed,
//! invalidated wholesale on mtime change rather than evicted by recency.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

use crate::error::PredictError;
use crate::predictor::bow::BowPredictor;
use crate::predictor::fasttext::FastTextPredictor;
use crate::predictor::hashlinear::HashLinearPredictor;
use crate::predictor::Predictor;
use crate::profile::{LocalModelType, Profile};

struct Entry {
    mtime: SystemTime,
    predictor: Arc<dyn Predictor>,
}

/// Process-wide map from profile name to its cached predictor, mutated only
/// under this type's internal lock.
pub struct ModelCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ModelCache {
    pub fn global() -> &'static Self {
        static CACHE: OnceLock<ModelCache> = OnceLock::new();
        CACHE.get_or_init(|| Self { entries: Mutex::new(HashMap::new()) })
    }

    /// Return the cached predictor for `profile`, reloading it from disk if
    /// missing or if the backing model file's mtime has advanced since the
    /// last load. On corruption the bad file is removed and
    /// the error is returned instead of being cached.
    pub fn get(&self, profile: &Profile) -> Result<Arc<dyn Predictor>, PredictError> {
        let model_path = profile.model_path();
        let mtime = std::fs::metadata(&model_path).and_then(|m| m.modified()).map_err(|_| PredictError::Missing)?;

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(&profile.name) {
            if entry.mtime == mtime {
                return Ok(entry.predictor.clone());
            }
        }

        let predictor = load_predictor(profile).inspect_err(|_| {
            log::warn!("moderation: model for profile {} is corrupted, removing {}", profile.name, model_path.display());
            let _ = std::fs::remove_file(&model_path);
        })?;

        crate::predictor::canary_check(predictor.as_ref())?;

        entries.insert(profile.name.clone(), Entry { mtime, predictor: predictor.clone() });
        Ok(predictor)
    }

    /// Drop the cached entry for `profile`, forcing the next `get` to reload
    /// from disk (used after a training run swaps the live model file).
    pub fn invalidate(&self, profile_name: &str) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(profile_name);
    }
}

fn load_predictor(profile: &Profile) -> Result<Arc<dyn Predictor>, PredictError> {
    let model_path = profile.model_path();

    match profile.config.local_model_type {
        LocalModelType::Bow => {
            let vectorizer_path = profile.vectorizer_path().expect("bow profiles always carry a vectorizer path");
            Ok(Arc::new(BowPredictor::load(&model_path, &vectorizer_path)?))
        }
        LocalModelType::HashLinear => Ok(Arc::new(HashLinearPredictor::load(&model_path)?)),
        LocalModelType::FastText => Ok(Arc::new(FastTextPredictor::load(&model_path)?)),
    }
}

/// Whether a profile currently has a usable model file on disk at all. When
/// it doesn't, the Smart stage always falls through to AI adjudication.
pub fn model_exists(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() >= 512).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::Bundle;
    use crate::profile::{AiConfig, ProbabilityConfig, ProfileConfig, TrainingConfig};

    fn profile(dir: &Path) -> Profile {
        Profile {
            name: "test".to_string(),
            dir: dir.to_path_buf(),
            config: ProfileConfig {
                ai: AiConfig {
                    api_key_env: "X".to_string(),
                    base_url: "http://localhost".to_string(),
                    model: "m".to_string(),
                    timeout_secs: 5,
                    prompt_template: "{{text}}".to_string(),
                },
                probability: ProbabilityConfig { ai_review_rate: 0.0, low_risk_threshold: 0.1, high_risk_threshold: 0.9, random_seed: 1 },
                local_model_type: LocalModelType::HashLinear,
                training: TrainingConfig::default(),
            },
        }
    }

    #[test]
    fn reloads_only_when_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let profile = profile(dir.path());
        let bundle = Bundle::new("hashlinear", vec![0.0; 1 << 14], 0.0);
        bundle.save(&profile.model_path()).unwrap();

        let cache = ModelCache::global();
        cache.invalidate(&profile.name);
        let first = cache.get(&profile).unwrap();
        let second = cache.get(&profile).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
