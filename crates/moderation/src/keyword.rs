//! Basic (keyword) moderation stage.
//!
//! Keywords are matched as plain case-insensitive substrings, never as
//! regular expressions. The backing file is hot-reloaded whenever its mtime
//! changes, and the process-wide registry caches one filter per path so
//! repeated requests against the same file don't re-stat it under a lock
//! they don't need to take.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
    time::SystemTime,
};

use dashmap::DashMap;

struct Loaded {
    mtime: Option<SystemTime>,
    keywords: Vec<String>,
}

/// A single keyword file, reloaded under a short-lived mutex whenever its
/// mtime advances.
pub struct KeywordFilter {
    path: PathBuf,
    state: Mutex<Loaded>,
}

impl KeywordFilter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = load(&path);

        Self {
            path,
            state: Mutex::new(loaded),
        }
    }

    /// Return the first matching keyword, case-insensitively, or `None` if
    /// the text is clean. Reloads the backing file first if its mtime changed.
    pub fn check(&self, text: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let current_mtime = mtime(&self.path);
        if current_mtime != state.mtime {
            *state = load(&self.path);
        }

        let haystack = text.to_lowercase();
        state.keywords.iter().find(|kw| haystack.contains(kw.as_str())).cloned()
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

fn load(path: &Path) -> Loaded {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            log::warn!("keyword file {} unreadable: {err}", path.display());
            return Loaded {
                mtime: None,
                keywords: Vec::new(),
            };
        }
    };

    let keywords = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect();

    Loaded {
        mtime: mtime(path),
        keywords,
    }
}

/// Process-wide map from keyword file path to its loaded filter.
pub struct KeywordRegistry {
    filters: DashMap<PathBuf, &'static KeywordFilter>,
}

impl KeywordRegistry {
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<KeywordRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| Self { filters: DashMap::new() })
    }

    /// Check `text` against the filter for `path`, loading and caching it on
    /// first use.
    pub fn check(&self, path: &Path, text: &str) -> Option<String> {
        if let Some(filter) = self.filters.get(path) {
            return filter.check(text);
        }

        let filter: &'static KeywordFilter = Box::leak(Box::new(KeywordFilter::new(path)));
        self.filters.insert(path.to_path_buf(), filter);
        filter.check(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn matches_case_insensitively_and_ignores_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, "BadWord").unwrap();

        let filter = KeywordFilter::new(file.path());
        assert_eq!(filter.check("this has a badword in it").as_deref(), Some("badword"));
        assert_eq!(filter.check("nothing wrong here"), None);
    }

    #[test]
    fn reloads_on_mtime_change() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        let filter = KeywordFilter::new(file.path());
        assert_eq!(filter.check("first one"), Some("first".to_string()));

        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(file.path(), "second\n").unwrap();

        assert_eq!(filter.check("first one"), None);
        assert_eq!(filter.check("second one"), Some("second".to_string()));
    }
}
