//! The per-profile key-value sample store.
//!
//! All reads and writes go through one [`std::sync::Mutex`] guarding the
//! RocksDB handle: store handles are process-wide per path, and every read
//! or write takes that lock. Counters (`meta:next_id`, `meta:count`,
//! `meta:count:0/1`) are therefore updated with plain read-modify-write under
//! that same lock rather than a RocksDB transaction, which is sufficient for
//! the single-node semantics needed here: no cross-host coordination.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, RwLock};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rocksdb::DB;

use crate::error::StoreError;
use crate::record::SampleRecord;

const KEY_NEXT_ID: &[u8] = b"meta:next_id";
const KEY_COUNT: &[u8] = b"meta:count";
const KEY_COUNT_0: &[u8] = b"meta:count:0";
const KEY_COUNT_1: &[u8] = b"meta:count:1";

fn sample_key(id: i64) -> String {
    format!("sample:{id:020}")
}

fn latest_key(hash: &str) -> String {
    format!("text_latest:{hash}")
}

fn get_u64(db: &DB, key: &[u8]) -> Result<u64, StoreError> {
    Ok(db.get(key)?.and_then(|v| String::from_utf8(v).ok()).and_then(|s| s.parse().ok()).unwrap_or(0))
}

/// A durable, crash-safe store of `(text, label, category, timestamp)` tuples
/// for one moderation profile.
pub struct SampleStore {
    db: Mutex<DB>,
}

impl SampleStore {
    /// Open (creating if absent) the RocksDB store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Insert a new record, assigning it the next id and bumping counters and
    /// the secondary `text_latest` index.
    pub fn insert(&self, text: &str, label: u8, category: Option<String>, created_at: String) -> Result<SampleRecord, StoreError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());

        let next_id = get_u64(&db, KEY_NEXT_ID) as i64;
        let record = SampleRecord::new(next_id, text.to_string(), label, category, created_at);

        let mut batch = rocksdb::WriteBatch::default();
        batch.put(sample_key(record.id), serde_json::to_vec(&record).expect("SampleRecord always serializes"));
        batch.put(latest_key(&record.text_hash), record.id.to_string());
        batch.put(KEY_NEXT_ID, (next_id + 1).to_string());
        batch.put(KEY_COUNT, (get_u64(&db, KEY_COUNT) + 1).to_string());
        let count_key = if label == 1 { KEY_COUNT_1 } else { KEY_COUNT_0 };
        batch.put(count_key, (get_u64(&db, count_key) + 1).to_string());

        db.write(batch)?;
        Ok(record)
    }

    /// Convenience over [`SampleStore::insert`] that stamps `created_at` with
    /// the current time, the form every hot-path caller wants.
    pub fn insert_now(&self, text: &str, label: u8, category: Option<String>) -> Result<SampleRecord, StoreError> {
        self.insert(text, label, category, crate::record::now_iso())
    }

    pub fn get(&self, id: i64) -> Result<Option<SampleRecord>, StoreError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        self.get_locked(&db, id)
    }

    fn get_locked(&self, db: &DB, id: i64) -> Result<Option<SampleRecord>, StoreError> {
        match db.get(sample_key(id))? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| StoreError::Corrupted(id, e)),
        }
    }

    /// Most recent id sharing `md5(text)`, via the secondary index; falls
    /// back to a reverse scan on a hash collision where the index no longer
    /// points at a record actually carrying that exact text.
    pub fn latest_by_text(&self, text: &str) -> Result<Option<SampleRecord>, StoreError> {
        let hash = format!("{:x}", md5::compute(text.as_bytes()));
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(id_bytes) = db.get(latest_key(&hash))? {
            let id: i64 = String::from_utf8_lossy(&id_bytes).parse().unwrap_or(-1);
            if let Some(record) = self.get_locked(&db, id)? {
                if record.text == text {
                    return Ok(Some(record));
                }
            }
        }

        for record in self.scan_locked(&db)?.into_iter().rev() {
            if record.text_hash == hash && record.text == text {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn counters(&self) -> Result<Counters, StoreError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Counters {
            total: get_u64(&db, KEY_COUNT),
            pass: get_u64(&db, KEY_COUNT_0),
            violation: get_u64(&db, KEY_COUNT_1),
            next_id: get_u64(&db, KEY_NEXT_ID) as i64,
        })
    }

    /// All records in ascending id order. Readers tolerate holes left by
    /// deletions.
    pub fn scan(&self) -> Result<Vec<SampleRecord>, StoreError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        self.scan_locked(&db)
    }

    fn scan_locked(&self, db: &DB) -> Result<Vec<SampleRecord>, StoreError> {
        let mut out = Vec::new();
        let iter = db.prefix_iterator(b"sample:");
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(b"sample:") {
                break;
            }
            let id: i64 = String::from_utf8_lossy(&key[b"sample:".len()..]).parse().unwrap_or(0);
            out.push(serde_json::from_slice(&value).map_err(|e| StoreError::Corrupted(id, e))?);
        }
        Ok(out)
    }

    /// Delete a record, updating counters and backfilling (or removing) the
    /// secondary index for its text hash.
    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        self.delete_locked(&db, id)
    }

    fn delete_locked(&self, db: &DB, id: i64) -> Result<(), StoreError> {
        let Some(record) = self.get_locked(db, id)? else { return Ok(()) };

        let mut batch = rocksdb::WriteBatch::default();
        batch.delete(sample_key(id));
        batch.put(KEY_COUNT, (get_u64(db, KEY_COUNT).saturating_sub(1)).to_string());
        let count_key = if record.label == 1 { KEY_COUNT_1 } else { KEY_COUNT_0 };
        batch.put(count_key, (get_u64(db, count_key).saturating_sub(1)).to_string());

        let still_latest = db
            .get(latest_key(&record.text_hash))?
            .and_then(|v| String::from_utf8(v).ok())
            .and_then(|s| s.parse::<i64>().ok())
            == Some(id);

        if still_latest {
            let replacement = self
                .scan_locked(db)?
                .into_iter()
                .rev()
                .find(|r| r.id != id && r.text_hash == record.text_hash);

            match replacement {
                Some(r) => batch.put(latest_key(&record.text_hash), r.id.to_string()),
                None => batch.delete(latest_key(&record.text_hash)),
            }
        }

        db.write(batch)?;
        Ok(())
    }

    /// Drop random records per class until each is at or below
    /// `max_items / 2`.
    pub fn cleanup_excess_samples(&self, max_items: u64, seed: u64) -> Result<u64, StoreError> {
        let target_per_class = max_items / 2;
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let records = self.scan_locked(&db)?;

        let mut by_class: HashMap<u8, Vec<i64>> = HashMap::new();
        for r in &records {
            by_class.entry(r.label).or_default().push(r.id);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut deleted = 0u64;

        for ids in by_class.values_mut() {
            ids.shuffle(&mut rng);
            while ids.len() as u64 > target_per_class {
                let Some(id) = ids.pop() else { break };
                self.delete_locked(&db, id)?;
                deleted += 1;
            }
        }

        Ok(deleted)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub total: u64,
    pub pass: u64,
    pub violation: u64,
    pub next_id: i64,
}

/// Process-wide registry of open [`SampleStore`] handles, keyed by the
/// `history.rocks` directory path, so every caller shares the same handle and
/// lock for a given profile.
pub struct StoreRegistry {
    stores: RwLock<HashMap<PathBuf, &'static SampleStore>>,
    opening: Mutex<HashSet<PathBuf>>,
}

impl StoreRegistry {
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<StoreRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| Self { stores: RwLock::new(HashMap::new()), opening: Mutex::new(HashSet::new()) })
    }

    /// Fetch the cached handle for `path`, or open and cache a new one.
    pub fn get_or_open(&self, path: &Path) -> Result<&'static SampleStore, StoreError> {
        if let Some(store) = self.stores.read().unwrap_or_else(|e| e.into_inner()).get(path) {
            return Ok(store);
        }

        let _guard = self.opening.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = self.stores.read().unwrap_or_else(|e| e.into_inner()).get(path) {
            return Ok(store);
        }

        let store: &'static SampleStore = Box::leak(Box::new(SampleStore::open(path)?));
        self.stores.write().unwrap_or_else(|e| e.into_inner()).insert(path.to_path_buf(), store);
        Ok(store)
    }
}

/// Bernoulli draw over a caller-supplied RNG, used by the Smart stage's
/// `ai_review_rate` check and seeded deterministically per profile.
pub fn bernoulli(rate: f64, rng: &mut impl Rng) -> bool {
    rng.random::<f64>() < rate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SampleStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(&dir.path().join("history.rocks")).unwrap();
        (dir, store)
    }

    #[test]
    fn counters_track_total_and_per_class() {
        let (_dir, store) = store();
        store.insert("a", 0, None, "t".to_string()).unwrap();
        store.insert("b", 1, Some("x".to_string()), "t".to_string()).unwrap();
        store.insert("c", 1, None, "t".to_string()).unwrap();

        let counters = store.counters().unwrap();
        assert_eq!(counters.total, 3);
        assert_eq!(counters.pass, 1);
        assert_eq!(counters.violation, 2);
        assert_eq!(counters.total, counters.pass + counters.violation);
    }

    #[test]
    fn next_id_exceeds_every_existing_id() {
        let (_dir, store) = store();
        for i in 0..5 {
            store.insert(&format!("text-{i}"), 0, None, "t".to_string()).unwrap();
        }
        let counters = store.counters().unwrap();
        let max_id = store.scan().unwrap().iter().map(|r| r.id).max().unwrap();
        assert!(counters.next_id > max_id);
    }

    #[test]
    fn latest_by_text_tracks_most_recent_insert() {
        let (_dir, store) = store();
        store.insert("dup", 0, None, "t1".to_string()).unwrap();
        let second = store.insert("dup", 1, None, "t2".to_string()).unwrap();

        let latest = store.latest_by_text("dup").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[test]
    fn deleting_latest_backfills_index_from_remaining_duplicate() {
        let (_dir, store) = store();
        let first = store.insert("dup", 0, None, "t1".to_string()).unwrap();
        let second = store.insert("dup", 1, None, "t2".to_string()).unwrap();

        store.delete(second.id).unwrap();
        let latest = store.latest_by_text("dup").unwrap().unwrap();
        assert_eq!(latest.id, first.id);
    }

    #[test]
    fn deleting_only_duplicate_removes_index_entry() {
        let (_dir, store) = store();
        let only = store.insert("solo", 0, None, "t1".to_string()).unwrap();
        store.delete(only.id).unwrap();
        assert!(store.latest_by_text("solo").unwrap().is_none());
    }

    #[test]
    fn cleanup_excess_samples_respects_per_class_cap() {
        let (_dir, store) = store();
        for i in 0..10 {
            store.insert(&format!("pass-{i}"), 0, None, "t".to_string()).unwrap();
        }
        for i in 0..10 {
            store.insert(&format!("violation-{i}"), 1, None, "t".to_string()).unwrap();
        }

        store.cleanup_excess_samples(8, 42).unwrap();
        let counters = store.counters().unwrap();
        assert_eq!(counters.pass, 4);
        assert_eq!(counters.violation, 4);
        assert_eq!(counters.total, 8);
    }

    #[test]
    fn cleanup_is_deterministic_given_a_seed() {
        let (_dir, store) = store();
        for i in 0..6 {
            store.insert(&format!("x-{i}"), 0, None, "t".to_string()).unwrap();
        }

        let remaining_ids = |store: &SampleStore| {
            let mut ids: Vec<i64> = store.scan().unwrap().iter().map(|r| r.id).collect();
            ids.sort();
            ids
        };

        store.cleanup_excess_samples(4, 7).unwrap();
        let first_run = remaining_ids(&store);

        let (_dir2, store2) = store();
        for i in 0..6 {
            store2.insert(&format!("x-{i}"), 0, None, "t".to_string()).unwrap();
        }
        store2.cleanup_excess_samples(4, 7).unwrap();
        let second_run = remaining_ids(&store2);

        assert_eq!(first_run, second_run);
    }
}
