//! Failures raised by the sample store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rocksdb error: {0}")]
    Db(#[from] rocksdb::Error),
    #[error("record {0} is corrupted: {1}")]
    Corrupted(i64, serde_json::Error),
    #[error("legacy sqlite migration failed: {0}")]
    Migration(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("balanced sampling requires both classes to be non-empty (pass={pass}, violation={violation})")]
    EmptyClass { pass: u64, violation: u64 },
}
