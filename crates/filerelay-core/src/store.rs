use crate::error::{RelayError, Result};
use crate::types::{ProcessedEntry, ProcessedStatus};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

// ---------------------------------------------------------------------------
// ProcessedStore
// ---------------------------------------------------------------------------

/// Durable record of which filenames have reached a terminal outcome.
///
/// Entries are append-only: once a filename is marked it stays marked, and a
/// second `mark` for the same filename is a no-op.
pub trait ProcessedStore {
    fn contains(&self, filename: &str) -> Result<bool>;

    /// Record a terminal outcome. Returns `false` if the filename was
    /// already marked and nothing was written.
    fn mark(&mut self, filename: &str, status: ProcessedStatus, at: DateTime<Utc>) -> Result<bool>;

    fn all_processed(&self) -> Result<HashSet<String>>;

    /// Every entry in the order it was recorded.
    fn entries(&self) -> Result<Vec<ProcessedEntry>>;

    /// Path of the backing file, if any, so the scanner can skip it.
    fn artifact_path(&self) -> Option<&Path> {
        None
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// JSON Lines store: one `ProcessedEntry` per line.
///
/// The parsed file is cached and re-read whenever its length or mtime
/// changes, so marks written by another process (an operator running
/// `filerelay mark`) are seen on the next query.
pub struct FileStore {
    path: PathBuf,
    cache: RefCell<Option<Snapshot>>,
}

/// File length and mtime a snapshot was parsed at; a missing file is `(0, None)`.
type Stamp = (u64, Option<SystemTime>);

struct Snapshot {
    stamp: Stamp,
    entries: Vec<ProcessedEntry>,
    names: HashSet<String>,
}

impl Snapshot {
    fn parse(stamp: Stamp, data: &[u8], path: &Path) -> Self {
        let mut entries = Vec::new();
        for (lineno, line) in data.split(|&b| b == b'\n').enumerate() {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<ProcessedEntry>(line) {
                Ok(entry) => entries.push(entry),
                // A torn write leaves a partial line, possibly cut inside a
                // multibyte character; the file it described was never
                // confirmed, so it is delivered again.
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping unreadable processed-state entry"
                ),
            }
        }
        let names = entries.iter().map(|e| e.filename.clone()).collect();
        Self {
            stamp,
            entries,
            names,
        }
    }
}

impl FileStore {
    /// Open the store at `path`, creating an empty file if none exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::open_read_only(path)?;
        let path = &store.path;
        if !path.exists() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing::info!(path = %path.display(), "created processed-state store");
        }
        Ok(store)
    }

    /// Open without touching the filesystem; a missing file reads as empty.
    ///
    /// The file is still created by the first `mark`.
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.is_dir() {
            return Err(RelayError::CorruptStore {
                path: path.display().to_string(),
                reason: "path is a directory".to_string(),
            });
        }
        Ok(Self {
            path,
            cache: RefCell::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stamp(&self) -> Result<Stamp> {
        match std::fs::metadata(&self.path) {
            Ok(m) => Ok((m.len(), m.modified().ok())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((0, None)),
            Err(e) => Err(e.into()),
        }
    }

    /// Run `f` against an up-to-date parse of the file.
    fn with_snapshot<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Result<T> {
        let stamp = self.stamp()?;
        let mut cache = self.cache.borrow_mut();
        let snapshot = match cache.take() {
            Some(s) if s.stamp == stamp => s,
            _ => {
                let data = match std::fs::read(&self.path) {
                    Ok(d) => d,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => return Err(e.into()),
                };
                Snapshot::parse(stamp, &data, &self.path)
            }
        };
        let out = f(&snapshot);
        *cache = Some(snapshot);
        Ok(out)
    }
}

impl ProcessedStore for FileStore {
    fn contains(&self, filename: &str) -> Result<bool> {
        self.with_snapshot(|s| s.names.contains(filename))
    }

    fn mark(&mut self, filename: &str, status: ProcessedStatus, at: DateTime<Utc>) -> Result<bool> {
        let (seen, before) = self.with_snapshot(|s| (s.names.contains(filename), s.stamp))?;
        if seen {
            tracing::debug!(filename, "already marked, skipping");
            return Ok(false);
        }
        let entry = ProcessedEntry {
            filename: filename.to_string(),
            processed_at: at,
            status,
        };
        let line = serde_json::to_string(&entry)?;
        let written = crate::io::append_line_durable(&self.path, &line)?;

        // Extend the cache in place when our append is the only change;
        // otherwise the next query re-reads the file.
        let after = self.stamp()?;
        let cache = self.cache.get_mut();
        match cache.as_mut() {
            Some(s) if after.0 == before.0 + written => {
                s.stamp = after;
                s.names.insert(entry.filename.clone());
                s.entries.push(entry);
            }
            _ => *cache = None,
        }

        tracing::info!(filename, status = %status, "marked file as processed");
        Ok(true)
    }

    fn all_processed(&self) -> Result<HashSet<String>> {
        let set = self.with_snapshot(|s| s.names.clone())?;
        tracing::debug!(count = set.len(), "loaded processed filenames");
        Ok(set)
    }

    fn entries(&self) -> Result<Vec<ProcessedEntry>> {
        self.with_snapshot(|s| s.entries.clone())
    }

    fn artifact_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Vec<ProcessedEntry>,
    index: HashMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_of(&self, filename: &str) -> Option<ProcessedStatus> {
        self.index.get(filename).map(|&i| self.entries[i].status)
    }

    /// Filenames in the order they were marked.
    pub fn marked_order(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.filename.clone()).collect()
    }
}

impl ProcessedStore for MemoryStore {
    fn contains(&self, filename: &str) -> Result<bool> {
        Ok(self.index.contains_key(filename))
    }

    fn mark(&mut self, filename: &str, status: ProcessedStatus, at: DateTime<Utc>) -> Result<bool> {
        if self.index.contains_key(filename) {
            return Ok(false);
        }
        self.index.insert(filename.to_string(), self.entries.len());
        self.entries.push(ProcessedEntry {
            filename: filename.to_string(),
            processed_at: at,
            status,
        });
        Ok(true)
    }

    fn all_processed(&self) -> Result<HashSet<String>> {
        Ok(self.index.keys().cloned().collect())
    }

    fn entries(&self) -> Result<Vec<ProcessedEntry>> {
        Ok(self.entries.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (FileStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("processed.jsonl")).unwrap();
        (store, dir)
    }

    #[test]
    fn open_creates_empty_file() {
        let (store, _dir) = store();
        assert!(store.path().exists());
        assert!(store.all_processed().unwrap().is_empty());
    }

    #[test]
    fn open_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            FileStore::open(dir.path()),
            Err(RelayError::CorruptStore { .. })
        ));
    }

    #[test]
    fn mark_then_contains() {
        let (mut store, _dir) = store();
        assert!(!store.contains("a.txt").unwrap());
        assert!(store
            .mark("a.txt", ProcessedStatus::Success, Utc::now())
            .unwrap());
        assert!(store.contains("a.txt").unwrap());
        assert!(!store.contains("b.txt").unwrap());
    }

    #[test]
    fn mark_is_idempotent() {
        let (mut store, _dir) = store();
        assert!(store.mark("a.txt", ProcessedStatus::Error, Utc::now()).unwrap());
        assert!(!store
            .mark("a.txt", ProcessedStatus::Success, Utc::now())
            .unwrap());

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ProcessedStatus::Error);
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.jsonl");
        {
            let mut store = FileStore::open(&path).unwrap();
            store.mark("a.txt", ProcessedStatus::Success, Utc::now()).unwrap();
            store.mark("b.txt", ProcessedStatus::Error, Utc::now()).unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        let names: Vec<String> = store
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn torn_tail_is_skipped_and_later_marks_are_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.jsonl");
        let mut store = FileStore::open(&path).unwrap();
        store.mark("a.txt", ProcessedStatus::Success, Utc::now()).unwrap();

        // Simulate a crash mid-append.
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"filename\":\"b.t");
        std::fs::write(&path, raw).unwrap();

        assert!(!store.contains("b.txt").unwrap());
        store.mark("b.txt", ProcessedStatus::Success, Utc::now()).unwrap();
        let all = store.all_processed().unwrap();
        assert!(all.contains("a.txt"));
        assert!(all.contains("b.txt"));
    }

    #[test]
    fn torn_multibyte_tail_does_not_poison_the_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.jsonl");
        let mut store = FileStore::open(&path).unwrap();
        store.mark("a.txt", ProcessedStatus::Success, Utc::now()).unwrap();

        // Crash while appending "résumé.txt": the write stops inside "é".
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(b"{\"filename\":\"r\xc3");
        std::fs::write(&path, raw).unwrap();

        assert!(store.contains("a.txt").unwrap());
        assert!(!store.contains("résumé.txt").unwrap());
        assert!(store.mark("b.txt", ProcessedStatus::Success, Utc::now()).unwrap());

        let reopened = FileStore::open(&path).unwrap();
        let all = reopened.all_processed().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains("a.txt") && all.contains("b.txt"));
    }

    #[test]
    fn non_ascii_filenames_roundtrip() {
        let (mut store, dir) = store();
        store.mark("résumé.txt", ProcessedStatus::Success, Utc::now()).unwrap();
        let reopened = FileStore::open(dir.path().join("processed.jsonl")).unwrap();
        assert!(reopened.contains("résumé.txt").unwrap());
    }

    #[test]
    fn read_only_open_leaves_filesystem_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/processed.jsonl");
        let mut store = FileStore::open_read_only(&path).unwrap();

        assert!(store.entries().unwrap().is_empty());
        assert!(!store.contains("a.txt").unwrap());
        assert!(!path.exists());
        assert!(!dir.path().join("state").exists());

        store.mark("a.txt", ProcessedStatus::Error, Utc::now()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn read_only_open_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            FileStore::open_read_only(dir.path()),
            Err(RelayError::CorruptStore { .. })
        ));
    }

    #[test]
    fn warm_cache_still_sees_out_of_band_marks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.jsonl");
        let mut store = FileStore::open(&path).unwrap();
        store.mark("a.txt", ProcessedStatus::Success, Utc::now()).unwrap();
        assert!(!store.contains("stuck.txt").unwrap());

        let mut operator = FileStore::open(&path).unwrap();
        operator
            .mark("stuck.txt", ProcessedStatus::Error, Utc::now())
            .unwrap();

        assert!(store.contains("stuck.txt").unwrap());
        // Our own next mark must not drop the operator's entry from the cache.
        store.mark("b.txt", ProcessedStatus::Success, Utc::now()).unwrap();
        let names: Vec<String> = store
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert_eq!(names, vec!["a.txt", "stuck.txt", "b.txt"]);
    }

    #[test]
    fn sees_out_of_band_marks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.jsonl");
        let store = FileStore::open(&path).unwrap();
        let mut operator = FileStore::open(&path).unwrap();
        operator
            .mark("stuck.txt", ProcessedStatus::Error, Utc::now())
            .unwrap();
        assert!(store.contains("stuck.txt").unwrap());
    }

    #[test]
    fn filenames_with_separators_roundtrip() {
        let (mut store, _dir) = store();
        store
            .mark("odd|name \"quoted\".txt", ProcessedStatus::Success, Utc::now())
            .unwrap();
        assert!(store.contains("odd|name \"quoted\".txt").unwrap());
    }

    #[test]
    fn memory_store_tracks_order() {
        let mut store = MemoryStore::new();
        store.mark("b", ProcessedStatus::Success, Utc::now()).unwrap();
        store.mark("a", ProcessedStatus::Error, Utc::now()).unwrap();
        assert!(!store.mark("b", ProcessedStatus::Error, Utc::now()).unwrap());
        assert_eq!(store.marked_order(), vec!["b", "a"]);
        assert_eq!(store.status_of("a"), Some(ProcessedStatus::Error));
        assert_eq!(store.status_of("c"), None);
    }
}
