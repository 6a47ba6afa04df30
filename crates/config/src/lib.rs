//! GuardianBridge static configuration: the node-wide TOML file loaded once at
//! startup. Per-request configuration (dialect, moderation toggles) is parsed
//! out of the request URL by the `proxy-config` crate instead.

#![deny(missing_docs)]

mod error;
mod guardian;
mod loader;
mod server;
mod telemetry;

use std::path::Path;

pub use error::Error;
pub use guardian::{GuardianConfig, MemoryGuardConfig, SchedulerConfig};
use serde::Deserialize;
pub use server::{HealthConfig, ServerConfig, TlsServerConfig};
pub use telemetry::{TelemetryConfig, TracingConfig};

/// Main configuration structure for the GuardianBridge application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// GuardianBridge-specific settings: profiles, scheduler, memory guard.
    pub guardian: GuardianConfig,
    /// Telemetry configuration settings.
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        loader::load(path)
    }
}

#[cfg(test)]
mod tests {
    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert!(config.server.health.enabled);
        assert_eq!(config.server.health.path, "/health");
        assert!(!config.telemetry.enabled);
        assert_eq!(config.guardian.scheduler.scan_interval.as_secs(), 600);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = toml::from_str::<Config>("bogus = true").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
