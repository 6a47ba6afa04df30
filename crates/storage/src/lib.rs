//! The sample store: durable, crash-safe storage of moderation labels, fast
//! to append from the hot path and fast to sample from the training path.

mod error;
mod migrate;
mod record;
mod sampling;
mod store;

pub use error::StoreError;
pub use migrate::migrate_if_needed;
pub use record::{now_iso, SampleRecord};
pub use sampling::Strategy;
pub use store::{bernoulli, Counters, SampleStore, StoreRegistry};
