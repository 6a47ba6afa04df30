//! On-disk schema of a moderation profile.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// A tenant-scoped directory holding moderation config, samples, and model
/// files, plus the parsed `profile.json` it contains.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub dir: PathBuf,
    pub config: ProfileConfig,
}

impl Profile {
    /// Load `<profiles_root>/<name>/profile.json`.
    pub fn load(profiles_root: &Path, name: &str) -> Result<Self, ProfileError> {
        let dir = profiles_root.join(name);
        let path = dir.join("profile.json");

        let content = std::fs::read_to_string(&path).map_err(|source| ProfileError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: ProfileConfig = serde_json::from_str(&content).map_err(|source| ProfileError::Malformed {
            path: path.display().to_string(),
            source,
        })?;

        config.probability.validate()?;

        Ok(Self {
            name: name.to_string(),
            dir,
            config,
        })
    }

    pub fn history_dir(&self) -> PathBuf {
        self.dir.join("history.rocks")
    }

    pub fn model_path(&self) -> PathBuf {
        match self.config.local_model_type {
            LocalModelType::Bow => self.dir.join("bow.model"),
            LocalModelType::FastText => self.dir.join("fasttext.bin"),
            LocalModelType::HashLinear => self.dir.join("hashlinear.model"),
        }
    }

    /// Only the BoW variant persists a separate vectorizer file; the hashing
    /// vectorizer is stateless and fastText bundles its own vocabulary.
    pub fn vectorizer_path(&self) -> Option<PathBuf> {
        matches!(self.config.local_model_type, LocalModelType::Bow).then(|| self.dir.join("bow.vectorizer"))
    }

    pub fn train_lock_path(&self) -> PathBuf {
        self.dir.join(".train.lock")
    }

    pub fn train_status_path(&self) -> PathBuf {
        self.dir.join(".train_status.json")
    }

    pub fn train_log_path(&self) -> PathBuf {
        self.dir.join("train.log")
    }
}

/// The full contents of `profile.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub ai: AiConfig,
    pub probability: ProbabilityConfig,
    pub local_model_type: LocalModelType,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// `ai.*`: how to reach the remote AI adjudicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Name of the environment variable holding the API key; never the key itself.
    pub api_key_env: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub prompt_template: String,
}

/// `probability.*`: thresholds and sampling parameters for the Smart stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbabilityConfig {
    pub ai_review_rate: f64,
    pub low_risk_threshold: f64,
    pub high_risk_threshold: f64,
    pub random_seed: u64,
}

impl ProbabilityConfig {
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.low_risk_threshold > self.high_risk_threshold {
            return Err(ProfileError::ThresholdOrder {
                low: self.low_risk_threshold,
                high: self.high_risk_threshold,
            });
        }

        Ok(())
    }
}

/// Which local classifier variant this profile trains and serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalModelType {
    Bow,
    FastText,
    HashLinear,
}

/// Training hyperparameters, shared by all three model variants where they
/// overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub min_samples: usize,
    pub max_samples: usize,
    pub retrain_interval_minutes: u64,
    pub ngram_min: usize,
    pub ngram_max: usize,
    pub max_features: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub max_seconds: u64,
    pub sample_loading: SampleLoadingStrategy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: 200,
            max_samples: 20_000,
            retrain_interval_minutes: 24 * 60,
            ngram_min: 2,
            ngram_max: 3,
            max_features: 20_000,
            epochs: 5,
            batch_size: 256,
            max_seconds: 600,
            sample_loading: SampleLoadingStrategy::BalancedUndersample,
        }
    }
}

/// `sample_loading` strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleLoadingStrategy {
    BalancedUndersample,
    LatestFull,
    RandomFull,
}
