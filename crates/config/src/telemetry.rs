//! Telemetry configuration.
//!
//! Exporting spans to a tracing backend is treated as an external collaborator
//! ( is out of scope); this module only carries
//! the knobs [`server::TracingLayer`](../../server/index.html) needs to decide
//! whether and how often to sample a request.

use serde::Deserialize;

/// Telemetry configuration for observability.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Whether span collection is active at all.
    pub enabled: bool,
    /// Sampling behavior for incoming requests.
    pub tracing: TracingConfig,
}

impl TelemetryConfig {
    /// Whether request tracing is enabled.
    pub fn tracing_enabled(&self) -> bool {
        self.enabled
    }

    /// Sampling configuration.
    pub fn tracing(&self) -> TracingConfig {
        self.tracing
    }
}

/// Sampling behavior for the HTTP tracing layer.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingConfig {
    /// Fraction of unsampled requests to sample, in `[0, 1]`.
    pub sampling: f64,
    /// When true and a parent trace context carries a sampling decision, honor it
    /// instead of the ratio above.
    pub parent_based_sampler: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            sampling: 0.15,
            parent_based_sampler: false,
        }
    }
}
