//! The persistent sample record.

use jiff::{Zoned, tz::TimeZone};
use serde::{Deserialize, Serialize};

/// A single moderation label produced either by an AI adjudication or by the
/// sampler seeding a profile's initial training set. Records are never
/// mutated after creation; only `cleanup_excess_samples` destroys them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub id: i64,
    pub text: String,
    /// 0 = pass, 1 = violation.
    pub label: u8,
    pub category: Option<String>,
    pub created_at: String,
    /// `md5(text)`, kept on the record so the secondary index can be rebuilt
    /// from a forward scan without recomputing hashes.
    pub text_hash: String,
}

impl SampleRecord {
    pub fn new(id: i64, text: String, label: u8, category: Option<String>, created_at: String) -> Self {
        let text_hash = format!("{:x}", md5::compute(text.as_bytes()));
        Self { id, text, label, category, created_at, text_hash }
    }
}

/// The current instant rendered as an ISO-8601 UTC timestamp, the format
/// every `created_at` field and status file on disk uses.
pub fn now_iso() -> String {
    Zoned::now().with_time_zone(TimeZone::UTC).strftime("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
