//! Durable, append-only run history with rotation.
//!
//! Each fetch run persists one timestamped JSON snapshot through a
//! pluggable [`StateStore`]. Storage failures degrade to `None`/`0` with
//! a warning; snapshotting being down never fails a run.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filename prefix for run snapshots.
pub const STATE_FILE_PREFIX: &str = "sam_state_";

/// Snapshots kept by default during rotation.
pub const DEFAULT_KEEP: usize = 10;

/// One persisted fetch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    /// ISO-8601 UTC timestamp of the run.
    pub timestamp: String,
    pub params: Value,
    pub summary: Value,
    #[serde(default)]
    pub failed_codes: Vec<String>,
}

/// A stored file's name plus the listing metadata rotation needs.
#[derive(Debug, Clone)]
pub struct StateFileInfo {
    pub name: String,
    pub modified: SystemTime,
    pub size: u64,
}

/// A snapshot annotated with where it came from, for diagnostics UIs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedSnapshot {
    pub filename: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
    pub snapshot: RunSnapshot,
}

/// Named-blob storage, enough for JSON snapshot files. The filesystem
/// implementation is below; a blob store works the same way.
pub trait StateStore: Send + Sync {
    fn put(&self, name: &str, contents: &str) -> io::Result<()>;
    fn get(&self, name: &str) -> io::Result<Option<String>>;
    fn exists(&self, name: &str) -> io::Result<bool>;
    /// Returns whether a file was actually removed.
    fn delete(&self, name: &str) -> io::Result<bool>;
    fn list(&self) -> io::Result<Vec<StateFileInfo>>;
}

/// Filesystem-backed store. The directory is created on first write.
pub struct LocalStateStore {
    dir: PathBuf,
}

impl LocalStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl StateStore for LocalStateStore {
    fn put(&self, name: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(name), contents)
    }

    fn get(&self, name: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        Ok(self.path_for(name).exists())
    }

    fn delete(&self, name: &str) -> io::Result<bool> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn list(&self) -> io::Result<Vec<StateFileInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            files.push(StateFileInfo {
                name,
                modified: metadata.modified()?,
                size: metadata.len(),
            });
        }
        Ok(files)
    }
}

/// Reads and writes run snapshots over a [`StateStore`].
pub struct StateFileManager {
    store: Arc<dyn StateStore>,
}

impl StateFileManager {
    /// Manager over a local directory.
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self::with_store(Arc::new(LocalStateStore::new(dir)))
    }

    pub fn with_store(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Persists one run. Returns the filename, or `None` when storage
    /// failed (warned, never raised).
    pub fn save(&self, params: &Value, summary: &Value, failed_codes: &[String]) -> Option<String> {
        let now = Utc::now();
        let filename = format!(
            "{}{}.json",
            STATE_FILE_PREFIX,
            now.format("%Y-%m-%d_%H-%M-%S-%6f")
        );
        let snapshot = RunSnapshot {
            timestamp: now.to_rfc3339(),
            params: params.clone(),
            summary: summary.clone(),
            failed_codes: failed_codes.to_vec(),
        };
        let contents = match serde_json::to_string_pretty(&snapshot) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!("Failed to serialize run snapshot: {}", e);
                return None;
            }
        };
        match self.store.put(&filename, &contents) {
            Ok(()) => Some(filename),
            Err(e) => {
                tracing::warn!("Failed to write run snapshot {}: {}", filename, e);
                None
            }
        }
    }

    /// Snapshot files only (`.json`), newest first by modification time.
    pub fn state_files(&self) -> Vec<StateFileInfo> {
        let mut files = match self.store.list() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Failed to list state files: {}", e);
                return Vec::new();
            }
        };
        files.retain(|f| f.name.ends_with(".json"));
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        files
    }

    /// The most recently modified snapshot, or `None` when no state
    /// exists or the file is unreadable.
    pub fn load_latest(&self) -> Option<RunSnapshot> {
        let files = self.state_files();
        let latest = files.first()?;
        self.load(&latest.name)
    }

    /// A specific snapshot by filename; `None` when absent or corrupt.
    pub fn load(&self, filename: &str) -> Option<RunSnapshot> {
        let contents = match self.store.get(filename) {
            Ok(contents) => contents?,
            Err(e) => {
                tracing::warn!("Failed to read state file {}: {}", filename, e);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("Corrupt state file {}: {}", filename, e);
                None
            }
        }
    }

    /// Deletes all but the `keep` most recent snapshots, returning how
    /// many were removed.
    pub fn rotate(&self, keep: usize) -> usize {
        let files = self.state_files();
        if files.len() <= keep {
            return 0;
        }
        files[keep..]
            .iter()
            .filter(|f| self.delete_file(&f.name))
            .count()
    }

    /// Deletes every snapshot, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.state_files()
            .iter()
            .filter(|f| self.delete_file(&f.name))
            .count()
    }

    fn delete_file(&self, name: &str) -> bool {
        match self.store.delete(name) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Failed to delete state file {}: {}", name, e);
                false
            }
        }
    }

    pub fn latest_summary(&self) -> Option<Value> {
        self.load_latest().map(|s| s.summary)
    }

    pub fn latest_timestamp(&self) -> Option<String> {
        self.load_latest().map(|s| s.timestamp)
    }

    pub fn latest_failed_codes(&self) -> Vec<String> {
        self.load_latest()
            .map(|s| s.failed_codes)
            .unwrap_or_default()
    }

    pub fn has_state(&self) -> bool {
        !self.state_files().is_empty()
    }

    pub fn count(&self) -> usize {
        self.state_files().len()
    }

    /// Every parseable snapshot with its file metadata, newest first.
    pub fn all(&self) -> Vec<AnnotatedSnapshot> {
        self.state_files()
            .iter()
            .filter_map(|info| {
                let snapshot = self.load(&info.name)?;
                Some(AnnotatedSnapshot {
                    filename: info.name.clone(),
                    modified: DateTime::<Utc>::from(info.modified),
                    size: info.size,
                    snapshot,
                })
            })
            .collect()
    }
}
