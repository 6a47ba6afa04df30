//! Legacy SQLite → RocksDB migration, run once on first touch of a profile
//! whose legacy file exists but whose key-value store doesn't.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::StoreError;
use crate::store::SampleStore;

/// If `legacy_path` exists and `history_dir` doesn't, build a fresh RocksDB
/// store from the legacy rows (ascending id), atomically swap it into place,
/// and rename the legacy file out of the way. Returns `true` if a migration
/// ran.
pub fn migrate_if_needed(legacy_path: &Path, history_dir: &Path) -> Result<bool, StoreError> {
    if !legacy_path.exists() || history_dir.exists() {
        return Ok(false);
    }

    let tmp_dir = history_dir.with_extension("rocks.migrating");
    if tmp_dir.exists() {
        std::fs::remove_dir_all(&tmp_dir)?;
    }

    {
        let store = SampleStore::open(&tmp_dir)?;
        let conn = Connection::open(legacy_path)?;
        let mut stmt = conn.prepare("SELECT id, text, label, category, created_at FROM samples ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u8,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        for row in rows {
            let (_id, text, label, category, created_at) = row?;
            // Re-emitted through the normal insert path so ids stay
            // contiguous with `meta:next_id`; legacy ids are not preserved,
            // only internal consistency of the new store is required.
            store.insert(&text, label, category, created_at)?;
        }
    }

    std::fs::rename(&tmp_dir, history_dir)?;
    rename_legacy_out_of_the_way(legacy_path)?;

    Ok(true)
}

/// Rename the legacy file to `.bak`, falling back to a timestamped name if
/// that destination already exists, and to copy-then-unlink if the rename
/// itself is blocked (e.g. cross-filesystem).
fn rename_legacy_out_of_the_way(legacy_path: &Path) -> Result<(), StoreError> {
    let stem = legacy_path.file_stem().and_then(|s| s.to_str()).unwrap_or("history");
    let parent = legacy_path.parent().unwrap_or_else(|| Path::new("."));

    let mut backup: PathBuf = parent.join(format!("{stem}.bak"));
    if backup.exists() {
        let stamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
        backup = parent.join(format!("{stem}.bak.{stamp}"));
    }

    match std::fs::rename(legacy_path, &backup) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(legacy_path, &backup)?;
            std::fs::remove_file(legacy_path)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_legacy_db(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "CREATE TABLE samples (id INTEGER PRIMARY KEY, text TEXT, label INTEGER, category TEXT, created_at TEXT)",
            [],
        )
        .unwrap();
        for i in 0..5 {
            conn.execute(
                "INSERT INTO samples (id, text, label, category, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![i, format!("legacy-{i}"), i % 2, Option::<String>::None, "2024-01-01T00:00:00"],
            )
            .unwrap();
        }
    }

    #[test]
    fn migration_populates_store_and_backs_up_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let legacy_path = dir.path().join("history.db");
        let history_dir = dir.path().join("history.rocks");
        seed_legacy_db(&legacy_path);

        let migrated = migrate_if_needed(&legacy_path, &history_dir).unwrap();
        assert!(migrated);
        assert!(!legacy_path.exists());
        assert!(dir.path().join("history.bak").exists());

        let store = SampleStore::open(&history_dir).unwrap();
        let counters = store.counters().unwrap();
        assert_eq!(counters.total, 5);

        let last = store.scan().unwrap().into_iter().max_by_key(|r| r.id).unwrap();
        assert_eq!(last.text, "legacy-4");
    }

    #[test]
    fn skips_when_store_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let legacy_path = dir.path().join("history.db");
        let history_dir = dir.path().join("history.rocks");
        seed_legacy_db(&legacy_path);
        SampleStore::open(&history_dir).unwrap();

        assert!(!migrate_if_needed(&legacy_path, &history_dir).unwrap());
        assert!(legacy_path.exists());
    }

    #[test]
    fn skips_when_no_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!migrate_if_needed(&dir.path().join("nope.db"), &dir.path().join("history.rocks")).unwrap());
    }
}
