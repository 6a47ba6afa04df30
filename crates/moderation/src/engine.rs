//! Moderation decision engine: Basic keyword stage followed by the Smart
//! stage's three-way routing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::adjudicator::{self, AdjudicationResult};
use crate::cache::ModelCache;
use crate::keyword::KeywordRegistry;
use crate::profile::Profile;

/// Why a request was or wasn't blocked, and what (if anything) should be
/// recorded as a new training sample.
#[derive(Debug, Clone)]
pub struct Decision {
    pub blocked: bool,
    pub category: Option<String>,
    pub stage: Stage,
    /// `Some((text, label))` when this decision should be written to the
    /// sample store; basic/local-only decisions are not.
    pub sample: Option<(String, u8)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Basic,
    SmartLocalLow,
    SmartLocalHigh,
    SmartAdjudicated,
}

/// Per-profile deterministic RNG for the `ai_review_rate` Bernoulli draw,
/// seeded once from `probability.random_seed` and then advanced on every
/// call so repeated requests against the same profile don't all land on the
/// same draw.
fn profile_rng(profile: &Profile) -> &'static Mutex<StdRng> {
    static RNGS: OnceLock<dashmap::DashMap<String, &'static Mutex<StdRng>>> = OnceLock::new();
    let rngs = RNGS.get_or_init(dashmap::DashMap::new);

    if let Some(rng) = rngs.get(&profile.name) {
        return rng.value();
    }

    let rng: &'static Mutex<StdRng> = Box::leak(Box::new(Mutex::new(StdRng::seed_from_u64(profile.config.probability.random_seed))));
    rngs.insert(profile.name.clone(), rng);
    rng
}

/// Evaluate one piece of projected text against `profile`: keyword filter
/// first, then (if clean) the Smart stage's local-model / AI-adjudicator
/// routing.
///
/// `client` is reused across calls by the caller; `keywords_path` is the
/// resolved path to this profile's keyword file (falling back to the
/// node-wide default is the caller's responsibility).
///
/// `profile` is `None` when `smart_moderation.profile` wasn't configured for
/// this request; the Smart stage is then skipped regardless of
/// `smart_enabled` since there's nothing to classify or adjudicate with.
pub async fn evaluate(
    client: &reqwest::Client,
    profile: Option<&Profile>,
    keywords_path: &std::path::Path,
    text: &str,
    basic_enabled: bool,
    smart_enabled: bool,
) -> Decision {
    if basic_enabled {
        if let Some(keyword) = KeywordRegistry::global().check(keywords_path, text) {
            return Decision {
                blocked: true,
                category: Some(format!("keyword:{keyword}")),
                stage: Stage::Basic,
                sample: None,
            };
        }
    }

    let (Some(profile), true) = (profile, smart_enabled) else {
        return Decision {
            blocked: false,
            category: None,
            stage: Stage::Basic,
            sample: None,
        };
    };

    smart_evaluate(client, profile, text).await
}

/// The Smart stage's three-way decision:
///
/// 1. Draw `Bernoulli(ai_review_rate)`. If true, skip straight to AI
///    adjudication regardless of the local model.
/// 2. Otherwise run the local model. If it's missing, fails to load, or
///    fails to predict, fall through to AI adjudication too (never block on
///    local-model unavailability).
/// 3. If the local model's probability is below `low_risk_threshold`, pass.
///    If at or above `high_risk_threshold`, block. In between, fall through
///    to AI adjudication.
async fn smart_evaluate(client: &reqwest::Client, profile: &Profile, text: &str) -> Decision {
    let probability = profile.config.probability;

    let forced_review = {
        let rng = profile_rng(profile);
        let mut rng = rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_bool(probability.ai_review_rate.clamp(0.0, 1.0))
    };

    if !forced_review {
        match ModelCache::global().get(profile).and_then(|predictor| predictor.predict_proba(text)) {
            Ok(p) if p < probability.low_risk_threshold => {
                return Decision {
                    blocked: false,
                    category: None,
                    stage: Stage::SmartLocalLow,
                    sample: None,
                };
            }
            Ok(p) if p >= probability.high_risk_threshold => {
                return Decision {
                    blocked: true,
                    category: Some("local_model".to_string()),
                    stage: Stage::SmartLocalHigh,
                    sample: None,
                };
            }
            Ok(_) => {
                // Uncertain band: fall through to AI adjudication below.
            }
            Err(err) => {
                log::debug!("moderation: local model unavailable for profile {} ({err}), falling through to AI adjudication", profile.name);
            }
        }
    }

    let AdjudicationResult { verdict, error } = adjudicator::adjudicate(client, &profile.config.ai, text).await;
    if let Some(err) = &error {
        log::warn!("moderation: AI adjudicator failed for profile {} ({err}); treating as pass", profile.name);
    }

    let label = u8::from(verdict.violation);
    Decision {
        blocked: verdict.violation,
        category: verdict.category.clone(),
        stage: Stage::SmartAdjudicated,
        sample: Some((text.to_string(), label)),
    }
}

/// Stable fingerprint used by callers that want to dedupe identical texts
/// before writing a sample (the store's own `text_latest` index already
/// dedupes by content hash, so this is only needed by callers that batch).
pub fn text_fingerprint(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::Bundle;
    use crate::profile::{AiConfig, LocalModelType, ProbabilityConfig, ProfileConfig, TrainingConfig};
    use std::io::Write;

    fn profile(dir: &std::path::Path, low: f64, high: f64, review_rate: f64) -> Profile {
        Profile {
            name: format!("test-{low}-{high}-{review_rate}"),
            dir: dir.to_path_buf(),
            config: ProfileConfig {
                ai: AiConfig {
                    api_key_env: "NONEXISTENT_KEY".to_string(),
                    base_url: "http://127.0.0.1:1".to_string(),
                    model: "m".to_string(),
                    timeout_secs: 1,
                    prompt_template: "{{text}}".to_string(),
                },
                probability: ProbabilityConfig { ai_review_rate: review_rate, low_risk_threshold: low, high_risk_threshold: high, random_seed: 7 },
                local_model_type: LocalModelType::HashLinear,
                training: TrainingConfig::default(),
            },
        }
    }

    #[tokio::test]
    async fn keyword_hit_blocks_without_touching_smart_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut keywords = tempfile::NamedTempFile::new().unwrap();
        writeln!(keywords, "forbidden").unwrap();

        let profile = profile(dir.path(), 0.1, 0.9, 0.0);
        let client = reqwest::Client::new();
        let decision = evaluate(&client, Some(&profile), keywords.path(), "this contains a Forbidden word", true, true).await;

        assert!(decision.blocked);
        assert_eq!(decision.stage, Stage::Basic);
        assert!(decision.sample.is_none());
    }

    #[tokio::test]
    async fn local_model_low_score_passes_without_adjudication() {
        let dir = tempfile::tempdir().unwrap();
        let profile = profile(dir.path(), 0.9, 0.99, 0.0);
        let bundle = Bundle::new("hashlinear", vec![-5.0; 1 << 14], -5.0);
        bundle.save(&profile.model_path()).unwrap();
        ModelCache::global().invalidate(&profile.name);

        let keywords = tempfile::NamedTempFile::new().unwrap();
        let client = reqwest::Client::new();
        let decision = evaluate(&client, Some(&profile), keywords.path(), "totally fine text", false, true).await;

        assert!(!decision.blocked);
        assert_eq!(decision.stage, Stage::SmartLocalLow);
    }

    #[tokio::test]
    async fn missing_local_model_falls_through_to_adjudicator_and_records_sample() {
        let dir = tempfile::tempdir().unwrap();
        let profile = profile(dir.path(), 0.1, 0.9, 0.0);
        ModelCache::global().invalidate(&profile.name);

        let keywords = tempfile::NamedTempFile::new().unwrap();
        let client = reqwest::Client::new();
        let decision = evaluate(&client, Some(&profile), keywords.path(), "ambiguous text", false, true).await;

        // The adjudicator call itself fails (no server listening), so the
        // fallback verdict applies: not blocked, but still recorded.
        assert!(!decision.blocked);
        assert_eq!(decision.stage, Stage::SmartAdjudicated);
        assert_eq!(decision.sample, Some(("ambiguous text".to_string(), 0)));
    }
}
