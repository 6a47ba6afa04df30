//! Glue between the per-request pipeline and the `moderation`/`storage` crates:
//! profile resolution, keyword file resolution, and sample persistence.

use std::path::{Path, PathBuf};

use config::GuardianConfig;
use moderation::{Decision, Profile, ProfileError};
use proxy_config::RequestConfig;

/// Resolve the profile named by `smart_moderation.profile`, if any.
///
/// Returns `Ok(None)` when no profile was requested; `Err` when one was
/// requested but its `profile.json` couldn't be loaded.
pub fn resolve_profile(guardian: &GuardianConfig, config: &RequestConfig) -> Result<Option<Profile>, ProfileError> {
    match &config.smart_moderation.profile {
        None => Ok(None),
        Some(name) => Profile::load(&guardian.profiles_root, name).map(Some),
    }
}

/// The keyword file this request's Basic stage should check against: the
/// request's own override, or the node-wide default.
pub fn resolve_keywords_path(guardian: &GuardianConfig, config: &RequestConfig) -> PathBuf {
    config
        .basic_moderation
        .keywords_file
        .clone()
        .unwrap_or_else(|| guardian.default_keywords_file.clone())
}

/// Run the full two-stage moderation decision and, if it calls for one,
/// persist a new training sample for the profile that produced it.
pub async fn evaluate_and_record(
    http: &reqwest::Client,
    profile: Option<&Profile>,
    keywords_path: &Path,
    text: &str,
    basic_enabled: bool,
    smart_enabled: bool,
) -> Decision {
    let decision = moderation::evaluate(http, profile, keywords_path, text, basic_enabled, smart_enabled).await;

    if let (Some((sample_text, label)), Some(profile)) = (&decision.sample, profile) {
        match storage::StoreRegistry::global().get_or_open(&profile.history_dir()) {
            Ok(store) => {
                if let Err(err) = store.insert_now(sample_text, *label, decision.category.clone()) {
                    log::warn!("moderation: failed to persist sample for profile {}: {err}", profile.name);
                }
            }
            Err(err) => {
                log::warn!("moderation: failed to open sample store for profile {}: {err}", profile.name);
            }
        }
    }

    decision
}
