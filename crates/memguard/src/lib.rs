//! Background memory guard.
//!
//! Periodically re-measures process RSS. Above `soft_cap_mb` it clears every
//! registered in-memory cache (the moderation model cache, primarily);
//! above `hard_cap_mb` it logs and exits the process outright rather than
//! risk the kernel OOM-killing it mid-request.

mod rss;

use std::sync::{Arc, OnceLock, RwLock};

use config::MemoryGuardConfig;
use tokio_util::sync::CancellationToken;

pub use rss::current_rss_mb;

/// Anything the guard can clear to free memory when the soft cap is exceeded.
pub trait ClearableCache: Send + Sync {
    /// A short name for logging.
    fn name(&self) -> &str;
    /// Drop everything currently cached.
    fn clear(&self);
}

/// Process-wide set of caches the guard clears on a soft-cap breach.
pub struct CacheRegistry {
    caches: RwLock<Vec<Arc<dyn ClearableCache>>>,
}

impl CacheRegistry {
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<CacheRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| Self { caches: RwLock::new(Vec::new()) })
    }

    /// Register a cache to be cleared when RSS exceeds the soft cap.
    pub fn register(&self, cache: Arc<dyn ClearableCache>) {
        self.caches.write().unwrap_or_else(|e| e.into_inner()).push(cache);
    }

    fn clear_all(&self) {
        for cache in self.caches.read().unwrap_or_else(|e| e.into_inner()).iter() {
            log::warn!("memguard: clearing cache {}", cache.name());
            cache.clear();
        }
    }
}

/// Runs until `shutdown` is cancelled, sampling RSS every `config.sample_interval`.
pub async fn run(config: MemoryGuardConfig, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(config.sample_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                log::debug!("memguard: shutting down");
                return;
            }
        }

        let rss_mb = match current_rss_mb() {
            Ok(rss) => rss,
            Err(err) => {
                log::debug!("memguard: could not measure RSS: {err}");
                continue;
            }
        };

        if rss_mb >= config.hard_cap_mb {
            log::error!("memguard: RSS {rss_mb} MiB exceeds hard cap {} MiB, exiting", config.hard_cap_mb);
            std::process::exit(1);
        }

        if rss_mb >= config.soft_cap_mb {
            log::warn!("memguard: RSS {rss_mb} MiB exceeds soft cap {} MiB, clearing caches", config.soft_cap_mb);
            CacheRegistry::global().clear_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag(AtomicBool);

    impl ClearableCache for Flag {
        fn name(&self) -> &str {
            "flag"
        }
        fn clear(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn registry_clears_every_registered_cache() {
        let registry = CacheRegistry { caches: RwLock::new(Vec::new()) };
        let flag = Arc::new(Flag(AtomicBool::new(false)));
        registry.register(flag.clone());
        registry.clear_all();
        assert!(flag.0.load(Ordering::SeqCst));
    }
}
