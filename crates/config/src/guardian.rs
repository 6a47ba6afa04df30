//! Static, node-wide GuardianBridge settings: profiles root, scheduler, memory guard.
//!
//! Per-request behavior (dialect selection, moderation toggles) lives in the
//! `proxy-config` crate and is parsed out of the request URL on every call;
//! this module only covers what has to be known before the first request
//! ever arrives: where profiles live, how often the trainer scheduler wakes
//! up, and the memory guard's thresholds.

use std::{path::PathBuf, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Top-level GuardianBridge configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardianConfig {
    /// Directory containing one subdirectory per moderation profile.
    pub profiles_root: PathBuf,
    /// Keyword file used by basic moderation when a request's config doesn't
    /// name one explicitly.
    pub default_keywords_file: PathBuf,
    /// Background trainer scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Memory guard settings.
    pub memory: MemoryGuardConfig,
    /// Timeout applied to every outbound call to an upstream provider.
    #[serde(deserialize_with = "deserialize_duration")]
    pub upstream_timeout: Duration,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            profiles_root: PathBuf::from("./profiles"),
            default_keywords_file: PathBuf::from("./keywords.txt"),
            scheduler: SchedulerConfig::default(),
            memory: MemoryGuardConfig::default(),
            upstream_timeout: Duration::from_secs(120),
        }
    }
}

/// Training scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How often the scheduler scans the profiles root.
    #[serde(deserialize_with = "deserialize_duration")]
    pub scan_interval: Duration,
    /// A lock file older than this is considered abandoned and reclaimed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub stale_lock_threshold: Duration,
    /// A profile whose last training run failed is skipped for this long.
    #[serde(deserialize_with = "deserialize_duration")]
    pub failure_cooldown: Duration,
    /// Path to the single well-known file lock serializing training node-wide.
    pub global_lock_path: PathBuf,
    /// Time budget handed to each training subprocess before it must wrap up.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_training_time: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(600),
            stale_lock_threshold: Duration::from_secs(2 * 3600),
            failure_cooldown: Duration::from_secs(30 * 60),
            global_lock_path: PathBuf::from("./profiles/.global_train.lock"),
            max_training_time: Duration::from_secs(20 * 60),
        }
    }
}

/// Memory guard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryGuardConfig {
    /// How often RSS is re-measured.
    #[serde(deserialize_with = "deserialize_duration")]
    pub sample_interval: Duration,
    /// Above this RSS, registered model caches are cleared.
    pub soft_cap_mb: u64,
    /// Above this RSS, the process logs and exits.
    pub hard_cap_mb: u64,
}

impl Default for MemoryGuardConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(30),
            soft_cap_mb: 1024,
            hard_cap_mb: 2048,
        }
    }
}
