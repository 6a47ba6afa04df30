//! The training subprocess entry point: lock acquisition, sample loading,
//! model fitting, validation, and atomic swap-in, run inside a dedicated
//! process so a runaway training run can never take the serving process
//! down with it.
//!
//! Exit-code contract (spec section 6.5): 0 completed, 1 failed, 2 lock held.

use std::path::Path;
use std::time::Duration;

use moderation::predictor::canary_check;
use moderation::{LocalModelType, Profile};
use storage::{migrate_if_needed, StoreRegistry};

use crate::error::TrainingError;
use crate::global_lock::GlobalLock;
use crate::lock::{acquire_subprocess_lock, Acquired};
use crate::status::TrainStatus;
use crate::trainers;

/// What the caller (scheduler, or a standalone CLI invocation) should exit
/// with.
pub enum Outcome {
    Completed,
    LockHeld,
}

/// Run one training pass for `profile`, honoring the per-profile lock and
/// the profile's configured sample-loading strategy and hyperparameters.
///
/// `global_lock_path` is the single well-known file every training run on
/// the node blocks on, so a profile that clears its own per-profile lock
/// still waits its turn behind any other profile or model type currently
/// training.
///
/// Blocking: this does file I/O and CPU-bound fitting synchronously, so
/// callers running inside a Tokio runtime should invoke it via
/// `spawn_blocking`.
pub fn run(profiles_root: &Path, profile_name: &str, stale_lock_threshold: Duration, parent_pid: u32, global_lock_path: &Path) -> Result<Outcome, TrainingError> {
    let profile = Profile::load(profiles_root, profile_name)?;
    let lock_path = profile.train_lock_path();

    let _lock = match acquire_subprocess_lock(&lock_path, stale_lock_threshold, parent_pid)? {
        Some(Acquired::Fresh(lock)) | Some(Acquired::TookOverScheduler(lock)) => lock,
        None => return Ok(Outcome::LockHeld),
    };

    let _global_lock = GlobalLock::acquire(global_lock_path)?;

    let model_path = profile.model_path();
    let status_path = profile.train_status_path();
    TrainStatus::started(&model_path).write(&status_path)?;

    match train_one_pass(&profile) {
        Ok(()) => {
            TrainStatus::completed(&model_path).write(&status_path)?;
            Ok(Outcome::Completed)
        }
        Err(err) => {
            log::error!("training failed for profile {profile_name}: {err}");
            TrainStatus::failed(&model_path, err.to_string()).write(&status_path)?;
            Err(err)
        }
    }
}

fn train_one_pass(profile: &Profile) -> Result<(), TrainingError> {
    let legacy_path = profile.dir.join("history.db");
    let history_dir = profile.history_dir();
    migrate_if_needed(&legacy_path, &history_dir)?;

    let store = StoreRegistry::global().get_or_open(&history_dir)?;
    let counters = store.counters()?;
    let cfg = &profile.config.training;

    if (counters.pass + counters.violation) < cfg.min_samples as u64 {
        log::info!(
            "profile {}: only {} samples (need {}), skipping this round",
            profile.name,
            counters.pass + counters.violation,
            cfg.min_samples
        );
        return Ok(());
    }

    let strategy = match cfg.sample_loading {
        moderation::SampleLoadingStrategy::BalancedUndersample => storage::Strategy::BalancedUndersample,
        moderation::SampleLoadingStrategy::LatestFull => storage::Strategy::LatestFull,
        moderation::SampleLoadingStrategy::RandomFull => storage::Strategy::RandomFull,
    };

    let records = match store.load_samples(strategy, cfg.max_samples, profile.config.probability.random_seed) {
        Ok(records) => records,
        Err(storage::StoreError::EmptyClass { pass, violation }) => {
            log::info!("profile {}: one class empty (pass={pass}, violation={violation}), skipping this round", profile.name);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let model_path = profile.model_path();
    let seed = profile.config.probability.random_seed;

    match profile.config.local_model_type {
        LocalModelType::HashLinear => {
            trainers::hashlinear::train(&records, cfg.epochs, cfg.batch_size, cfg.max_seconds, seed, &model_path)?;
        }
        LocalModelType::FastText => {
            trainers::fasttext::train(&records, cfg.epochs, cfg.batch_size, cfg.max_seconds, seed, &model_path)?;
        }
        LocalModelType::Bow => {
            let vectorizer_path = profile.vectorizer_path().expect("bow profiles always carry a vectorizer path");
            trainers::bow::train(&records, cfg.epochs, cfg.batch_size, cfg.max_seconds, seed, &model_path, &vectorizer_path)?;
        }
    }

    validate_model(profile)?;
    Ok(())
}

/// Corruption checks run against the freshly written model: size threshold,
/// load exception, canary prediction.
fn validate_model(profile: &Profile) -> Result<(), TrainingError> {
    let path = profile.model_path();
    let size = std::fs::metadata(&path)?.len();
    if size < 512 {
        return Err(TrainingError::Predict(moderation::PredictError::Corrupted("written model under 512 bytes".to_string())));
    }

    let predictor: std::sync::Arc<dyn moderation::Predictor> = match profile.config.local_model_type {
        LocalModelType::HashLinear => std::sync::Arc::new(moderation::predictor::hashlinear::HashLinearPredictor::load(&path)?),
        LocalModelType::FastText => std::sync::Arc::new(moderation::predictor::fasttext::FastTextPredictor::load(&path)?),
        LocalModelType::Bow => {
            let vectorizer_path = profile.vectorizer_path().expect("bow profiles always carry a vectorizer path");
            std::sync::Arc::new(moderation::predictor::bow::BowPredictor::load(&path, &vectorizer_path)?)
        }
    };

    canary_check(predictor.as_ref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_profile(dir: &Path, name: &str, model_type: &str) {
        let profile_dir = dir.join(name);
        std::fs::create_dir_all(&profile_dir).unwrap();
        let mut f = std::fs::File::create(profile_dir.join("profile.json")).unwrap();
        write!(
            f,
            r#"{{
                "ai": {{"api_key_env":"X","base_url":"http://localhost","model":"m","timeout_secs":1,"prompt_template":"{{{{text}}}}"}},
                "probability": {{"ai_review_rate":0.0,"low_risk_threshold":0.1,"high_risk_threshold":0.9,"random_seed":1}},
                "local_model_type": "{model_type}",
                "training": {{"min_samples": 4, "max_samples": 100, "epochs": 2, "batch_size": 4, "max_seconds": 5}}
            }}"#
        )
        .unwrap();
    }

    fn seed_samples(profile: &Profile) {
        let store = StoreRegistry::global().get_or_open(&profile.history_dir()).unwrap();
        for i in 0..6 {
            store.insert_now(&format!("this is fine text number {i}"), 0, None).unwrap();
        }
        for i in 0..6 {
            store.insert_now(&format!("this is a violation number {i}"), 1, Some("x".to_string())).unwrap();
        }
    }

    #[test]
    fn trains_and_validates_hashlinear_model() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "p1", "hash_linear");
        let profile = Profile::load(dir.path(), "p1").unwrap();
        seed_samples(&profile);

        let outcome = run(dir.path(), "p1", Duration::from_secs(7200), std::process::id(), &dir.path().join("global.lock")).unwrap();
        assert!(matches!(outcome, Outcome::Completed));
        assert!(profile.model_path().exists());

        let status = TrainStatus::read(&profile.train_status_path()).unwrap().unwrap();
        assert_eq!(status.status, crate::status::Status::Completed);
    }

    #[test]
    fn trains_bow_model_with_vectorizer() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "p2", "bow");
        let profile = Profile::load(dir.path(), "p2").unwrap();
        seed_samples(&profile);

        let outcome = run(dir.path(), "p2", Duration::from_secs(7200), std::process::id(), &dir.path().join("global.lock")).unwrap();
        assert!(matches!(outcome, Outcome::Completed));
        assert!(profile.model_path().exists());
        assert!(profile.vectorizer_path().unwrap().exists());
    }

    #[test]
    fn too_few_samples_is_a_soft_success() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "p3", "hash_linear");
        let profile = Profile::load(dir.path(), "p3").unwrap();
        let store = StoreRegistry::global().get_or_open(&profile.history_dir()).unwrap();
        store.insert_now("only one sample", 0, None).unwrap();

        let outcome = run(dir.path(), "p3", Duration::from_secs(7200), std::process::id(), &dir.path().join("global.lock")).unwrap();
        assert!(matches!(outcome, Outcome::Completed));
        assert!(!profile.model_path().exists());
    }

    #[test]
    fn held_lock_reports_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "p4", "hash_linear");
        let profile = Profile::load(dir.path(), "p4").unwrap();
        seed_samples(&profile);

        let now = std::time::SystemTime::now().duration_since(std::time::SystemTime::UNIX_EPOCH).unwrap().as_secs();
        // pid 1 (init) is always alive and never matches the parent_pid we pass below.
        std::fs::write(profile.train_lock_path(), format!("pid=1\ncreated_at={now}\nhostname=h\ntype=subprocess\n")).unwrap();

        let outcome = run(dir.path(), "p4", Duration::from_secs(7200), 999_999, &dir.path().join("global.lock")).unwrap();
        assert!(matches!(outcome, Outcome::LockHeld));
    }
}
