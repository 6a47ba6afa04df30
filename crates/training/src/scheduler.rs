//! Background trainer scheduler.
//!
//! Wakes every `scan_interval`, enumerates profile directories, and for each
//! eligible one spawns a `guardian train` subprocess. Mutual exclusion is
//! layered: an in-process set skips a profile another scheduler tick is
//! already mid-spawn for, the per-profile `.train.lock` file serializes
//! against crashed-and-restarted processes, and the single global lock file
//! serializes training across every profile on the node.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use config::SchedulerConfig;
use moderation::Profile;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::lock;
use crate::status::in_failure_cooldown;

/// Skips a profile this tick if a previous tick's spawn for it hasn't
/// returned yet; distinct from the file lock, which survives a process
/// restart.
struct InProgress(Mutex<HashSet<String>>);

impl InProgress {
    fn new() -> Self {
        Self(Mutex::new(HashSet::new()))
    }

    fn try_start(&self, name: &str) -> bool {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).insert(name.to_string())
    }

    fn finish(&self, name: &str) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).remove(name);
    }
}

/// Path to the binary the scheduler re-invokes to run one profile's
/// training in an isolated subprocess. Resolved once at startup from
/// `std::env::current_exe`, matching the reference process's own
/// re-exec pattern for worker subprocesses.
pub struct TrainerBinary(PathBuf);

impl TrainerBinary {
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self(std::env::current_exe()?))
    }
}

/// Runs until `shutdown` is cancelled, scanning `profiles_root` every
/// `config.scan_interval`.
pub async fn run(config: SchedulerConfig, profiles_root: PathBuf, trainer_binary: TrainerBinary, shutdown: CancellationToken) {
    let in_progress = std::sync::Arc::new(InProgress::new());
    let mut interval = tokio::time::interval(config.scan_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                log::debug!("trainer scheduler: shutting down");
                return;
            }
        }

        scan_once(&config, &profiles_root, &trainer_binary, &in_progress).await;
    }
}

async fn scan_once(config: &SchedulerConfig, profiles_root: &Path, trainer_binary: &TrainerBinary, in_progress: &std::sync::Arc<InProgress>) {
    let entries = match std::fs::read_dir(profiles_root) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("trainer scheduler: cannot read profiles root {}: {err}", profiles_root.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() || !path.join("profile.json").exists() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        if !in_progress.try_start(&name) {
            log::debug!("trainer scheduler: profile {name} still has a spawn in flight, skipping this round");
            continue;
        }

        let in_progress = in_progress.clone();
        let profiles_root = profiles_root.to_path_buf();
        let config = config.clone();
        let trainer_exe = trainer_binary.0.clone();
        tokio::spawn(async move {
            consider_profile(&config, &profiles_root, &name, &trainer_exe).await;
            in_progress.finish(&name);
        });
    }
}

async fn consider_profile(config: &SchedulerConfig, profiles_root: &Path, name: &str, trainer_exe: &Path) {
    let profile = match Profile::load(profiles_root, name) {
        Ok(p) => p,
        Err(err) => {
            log::warn!("trainer scheduler: profile {name} has an invalid profile.json: {err}");
            return;
        }
    };

    let lock_path = profile.train_lock_path();
    match lock::reclaim_if_stale(&lock_path, config.stale_lock_threshold) {
        Ok(true) => log::info!("trainer scheduler: reclaimed stale lock for profile {name}"),
        Ok(false) => {}
        Err(err) => log::warn!("trainer scheduler: error checking lock for profile {name}: {err}"),
    }

    if in_failure_cooldown(&profile.train_status_path(), config.failure_cooldown) {
        log::debug!("trainer scheduler: profile {name} is in failure cooldown, skipping this round");
        return;
    }

    if !should_train(&profile) {
        return;
    }

    let scheduler_lock = match lock::acquire_scheduler_lock(&lock_path, config.stale_lock_threshold) {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            log::debug!("trainer scheduler: profile {name} lock already held, skip this round");
            return;
        }
        Err(err) => {
            log::warn!("trainer scheduler: failed to acquire lock for profile {name}: {err}");
            return;
        }
    };

    log::info!("trainer scheduler: spawning training subprocess for profile {name}");

    let status = Command::new(trainer_exe)
        .arg("train")
        .arg("--profiles-root")
        .arg(profiles_root)
        .arg("--profile")
        .arg(name)
        .arg("--max-seconds")
        .arg(config.max_training_time.as_secs().to_string())
        .arg("--parent-pid")
        .arg(std::process::id().to_string())
        .arg("--stale-lock-threshold-secs")
        .arg(config.stale_lock_threshold.as_secs().to_string())
        .arg("--global-lock-path")
        .arg(&config.global_lock_path)
        .kill_on_drop(false)
        .status()
        .await;

    // The subprocess takes over `.train.lock` itself once it acquires it, so
    // the scheduler's own handle must be dropped without removing the file
    // out from under a subprocess that is still running.
    std::mem::forget(scheduler_lock);

    match status {
        Ok(status) if status.code() == Some(0) => {
            log::info!("trainer scheduler: profile {name} trained successfully");
        }
        Ok(status) if status.code() == Some(2) => {
            log::info!("trainer scheduler: profile {name} skip this round, lock already held by another process");
        }
        Ok(status) => {
            log::warn!("trainer scheduler: training subprocess for profile {name} exited with {status}");
        }
        Err(err) => {
            log::error!("trainer scheduler: failed to spawn training subprocess for profile {name}: {err}");
        }
    }
}

/// `should_train`: enough samples, and either no model yet or the model is
/// older than the configured retrain interval.
fn should_train(profile: &Profile) -> bool {
    let Ok(store) = storage::StoreRegistry::global().get_or_open(&profile.history_dir()) else {
        return false;
    };
    let Ok(counters) = store.counters() else { return false };

    if (counters.pass + counters.violation) < profile.config.training.min_samples as u64 {
        return false;
    }

    let model_path = profile.model_path();
    let Ok(metadata) = std::fs::metadata(&model_path) else {
        return true;
    };
    let Ok(modified) = metadata.modified() else { return true };

    let age = std::time::SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO);
    age > Duration::from_secs(profile.config.training.retrain_interval_minutes * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_train_when_model_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("p")).unwrap();
        std::fs::write(
            dir.path().join("p/profile.json"),
            r#"{"ai":{"api_key_env":"X","base_url":"http://localhost","model":"m","timeout_secs":1,"prompt_template":"{{text}}"},
                "probability":{"ai_review_rate":0.0,"low_risk_threshold":0.1,"high_risk_threshold":0.9,"random_seed":1},
                "local_model_type":"hash_linear",
                "training":{"min_samples":1}}"#,
        )
        .unwrap();

        let profile = Profile::load(dir.path(), "p").unwrap();
        let store = storage::StoreRegistry::global().get_or_open(&profile.history_dir()).unwrap();
        store.insert_now("x", 0, None).unwrap();

        assert!(should_train(&profile));
    }
}
