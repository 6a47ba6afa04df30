//! The per-profile `.train.lock` file.
//!
//! Holds a small text record (`pid=`, `created_at=`, `hostname=`, `type=`) of
//! whoever currently owns training for a profile. The scheduler takes a
//! `scheduler`-typed lock for the whole scan-to-subprocess round; the
//! subprocess it spawns takes the lock over as `subprocess` once it starts,
//! so a crashed scheduler and a crashed subprocess are both reclaimable by
//! the same staleness check.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Scheduler,
    Subprocess,
}

impl LockKind {
    fn as_str(self) -> &'static str {
        match self {
            LockKind::Scheduler => "scheduler",
            LockKind::Subprocess => "subprocess",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduler" => Some(LockKind::Scheduler),
            "subprocess" => Some(LockKind::Subprocess),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockInfo {
    pub pid: u32,
    pub created_at: i64,
    pub hostname: String,
    pub kind: LockKind,
}

impl LockInfo {
    fn current(kind: LockKind) -> Self {
        Self { pid: std::process::id(), created_at: now_unix(), hostname: hostname(), kind }
    }

    fn render(&self) -> String {
        format!("pid={}\ncreated_at={}\nhostname={}\ntype={}\n", self.pid, self.created_at, self.hostname, self.kind.as_str())
    }

    fn parse(content: &str) -> Option<Self> {
        let mut pid = None;
        let mut created_at = None;
        let mut hostname = None;
        let mut kind = None;
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else { continue };
            match key {
                "pid" => pid = value.parse().ok(),
                "created_at" => created_at = value.parse().ok(),
                "hostname" => hostname = Some(value.to_string()),
                "type" => kind = LockKind::parse(value),
                _ => {}
            }
        }
        Some(Self { pid: pid?, created_at: created_at?, hostname: hostname?, kind: kind? })
    }

    pub fn age(&self) -> Duration {
        Duration::from_secs((now_unix() - self.created_at).max(0) as u64)
    }

    pub fn is_alive(&self) -> bool {
        pid_alive(self.pid)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::SystemTime::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // Signal 0 sends nothing; it only probes whether the pid exists and is
    // reachable from this process.
    let ok = unsafe { libc::kill(pid as libc::pid_t, 0) == 0 };
    ok || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

/// A held `.train.lock`; the file is removed when this is dropped.
pub struct TrainLock {
    path: PathBuf,
}

impl TrainLock {
    fn create(path: &Path, kind: LockKind) -> std::io::Result<Self> {
        let info = LockInfo::current(kind);
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(info.render().as_bytes())?;
        Ok(Self { path: path.to_path_buf() })
    }

    /// Overwrite an existing lock file in place, used when a subprocess
    /// takes over its parent scheduler's lock.
    fn overwrite(path: &Path, kind: LockKind) -> std::io::Result<Self> {
        let info = LockInfo::current(kind);
        std::fs::write(path, info.render())?;
        Ok(Self { path: path.to_path_buf() })
    }
}

impl Drop for TrainLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn read_lock(path: &Path) -> std::io::Result<Option<LockInfo>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(LockInfo::parse(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove `path` if the lock recorded there has aged past `stale_threshold`
/// or its owning pid is no longer alive.
pub fn reclaim_if_stale(path: &Path, stale_threshold: Duration) -> std::io::Result<bool> {
    let Some(info) = read_lock(path)? else { return Ok(false) };
    if info.age() > stale_threshold || !info.is_alive() {
        std::fs::remove_file(path)?;
        return Ok(true);
    }
    Ok(false)
}

/// How a subprocess ended up holding `.train.lock`.
pub enum Acquired {
    Fresh(TrainLock),
    TookOverScheduler(TrainLock),
}

/// Subprocess-side lock acquisition: fresh create on an absent, stale, or
/// dead-owner lock; take-over of a `scheduler`-typed lock owned by this
/// process's parent; `None` otherwise, meaning the caller should exit with
/// code 2.
pub fn acquire_subprocess_lock(path: &Path, stale_threshold: Duration, parent_pid: u32) -> std::io::Result<Option<Acquired>> {
    match TrainLock::create(path, LockKind::Subprocess) {
        Ok(lock) => return Ok(Some(Acquired::Fresh(lock))),
        Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => return Err(e),
        Err(_) => {}
    }

    let Some(info) = read_lock(path)? else {
        return retry_fresh(path);
    };

    if info.age() > stale_threshold || !info.is_alive() {
        std::fs::remove_file(path)?;
        return retry_fresh(path);
    }

    if info.kind == LockKind::Scheduler && info.pid == parent_pid {
        return Ok(Some(Acquired::TookOverScheduler(TrainLock::overwrite(path, LockKind::Subprocess)?)));
    }

    Ok(None)
}

fn retry_fresh(path: &Path) -> std::io::Result<Option<Acquired>> {
    match TrainLock::create(path, LockKind::Subprocess) {
        Ok(lock) => Ok(Some(Acquired::Fresh(lock))),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

/// Scheduler-side acquisition covering the whole scan-to-subprocess round
/// for one profile. Reclaims a stale lock first, then takes a fresh
/// `scheduler`-typed one; `None` means someone else genuinely holds it.
pub fn acquire_scheduler_lock(path: &Path, stale_threshold: Duration) -> std::io::Result<Option<TrainLock>> {
    reclaim_if_stale(path, stale_threshold)?;
    match TrainLock::create(path, LockKind::Scheduler) {
        Ok(lock) => Ok(Some(lock)),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_lock_blocks_a_second_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".train.lock");

        let first = acquire_scheduler_lock(&path, Duration::from_secs(3600)).unwrap();
        assert!(first.is_some());
        let second = acquire_scheduler_lock(&path, Duration::from_secs(3600)).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn releasing_a_lock_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".train.lock");
        let lock = acquire_scheduler_lock(&path, Duration::from_secs(3600)).unwrap().unwrap();
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn stale_lock_with_dead_pid_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".train.lock");
        // A pid essentially guaranteed not to be alive in test environments.
        std::fs::write(&path, "pid=999999\ncreated_at=0\nhostname=h\ntype=scheduler\n").unwrap();

        let reclaimed = reclaim_if_stale(&path, Duration::from_secs(3600)).unwrap();
        assert!(reclaimed);
        assert!(!path.exists());
    }

    #[test]
    fn subprocess_takes_over_its_parent_schedulers_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".train.lock");
        let parent_pid = std::process::id();
        std::fs::write(&path, format!("pid={parent_pid}\ncreated_at={}\nhostname=h\ntype=scheduler\n", now_unix())).unwrap();

        let acquired = acquire_subprocess_lock(&path, Duration::from_secs(3600), parent_pid).unwrap();
        assert!(matches!(acquired, Some(Acquired::TookOverScheduler(_))));
        let info = read_lock(&path).unwrap().unwrap();
        assert_eq!(info.kind, LockKind::Subprocess);
    }

    #[test]
    fn subprocess_backs_off_when_a_live_unrelated_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".train.lock");
        std::fs::write(&path, format!("pid={}\ncreated_at={}\nhostname=h\ntype=subprocess\n", std::process::id(), now_unix())).unwrap();

        let acquired = acquire_subprocess_lock(&path, Duration::from_secs(3600), 1).unwrap();
        assert!(acquired.is_none());
    }
}
