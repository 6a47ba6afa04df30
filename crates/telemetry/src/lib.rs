//! Minimal span bookkeeping for GuardianBridge.
//!
//! Shipping traces to a backend (OTLP, Jaeger, ...) is treated as an external
//! concern; this crate only starts and stops [`fastrace`] span collection
//! according to [`TelemetryConfig`], giving `server::TracingLayer` somewhere
//! to report into.

use config::TelemetryConfig;

/// Held for the lifetime of the process; flushes pending spans on drop.
pub struct TelemetryGuard {
    enabled: bool,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.enabled {
            fastrace::flush();
        }
    }
}

/// Initialize span collection per `config`. Always succeeds: there is no
/// external exporter to fail to reach.
pub fn init(config: &TelemetryConfig) -> TelemetryGuard {
    log::debug!("telemetry: tracing enabled = {}", config.tracing_enabled());
    TelemetryGuard {
        enabled: config.tracing_enabled(),
    }
}
