//! `.train_status.json`: the last-known outcome of a profile's training run.
//!
//! Written by the subprocess at every phase transition so the scheduler (and
//! an operator tailing the directory) can tell a hung run from a finished
//! one without parsing `train.log`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use storage::now_iso;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Started,
    Completed,
    Failed,
}

/// The full contents of `.train_status.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainStatus {
    pub status: Status,
    pub timestamp: String,
    pub pid: u32,
    pub model_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrainStatus {
    pub fn started(model_path: &Path) -> Self {
        Self {
            status: Status::Started,
            timestamp: now_iso(),
            pid: std::process::id(),
            model_path: model_path.display().to_string(),
            error: None,
        }
    }

    pub fn completed(model_path: &Path) -> Self {
        Self {
            status: Status::Completed,
            timestamp: now_iso(),
            pid: std::process::id(),
            model_path: model_path.display().to_string(),
            error: None,
        }
    }

    pub fn failed(model_path: &Path, error: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            timestamp: now_iso(),
            pid: std::process::id(),
            model_path: model_path.display().to_string(),
            error: Some(error.into()),
        }
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn read(path: &Path) -> std::io::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Whether the last recorded status was a failure within `cooldown` of now,
/// the scheduler's 30-minute-default skip window.
pub fn in_failure_cooldown(path: &Path, cooldown: std::time::Duration) -> bool {
    let Ok(Some(status)) = TrainStatus::read(path) else {
        return false;
    };
    if status.status != Status::Failed {
        return false;
    }

    let Ok(ts) = status.timestamp.parse::<jiff::Timestamp>() else {
        return false;
    };
    let age = jiff::Timestamp::now().duration_since(ts);
    age.unsigned_abs() < cooldown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".train_status.json");
        let model_path = dir.path().join("hashlinear.model");

        TrainStatus::completed(&model_path).write(&path).unwrap();
        let read = TrainStatus::read(&path).unwrap().unwrap();
        assert_eq!(read.status, Status::Completed);
        assert!(read.error.is_none());
    }

    #[test]
    fn recent_failure_is_in_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".train_status.json");
        let model_path = dir.path().join("hashlinear.model");

        TrainStatus::failed(&model_path, "boom").write(&path).unwrap();
        assert!(in_failure_cooldown(&path, std::time::Duration::from_secs(1800)));
    }

    #[test]
    fn missing_status_is_never_in_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".train_status.json");
        assert!(!in_failure_cooldown(&path, std::time::Duration::from_secs(1800)));
    }
}
