//! Persisted partial build-info, keyed by build identity.
//!
//! Each save call appends one immutable [`Partial`]. Nothing is overwritten
//! until the key is deleted. Two processes appending to the same key never
//! clobber each other's files, but no ordering is guaranteed between writers
//! racing on the same module id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::EngineError;
use crate::model::{now_ms, BuildRecord, BuildRunKey, Partial};

/// Everything persisted for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBuild {
    pub record: BuildRecord,
    /// Partials in arrival order.
    pub partials: Vec<Partial>,
}

/// Storage capability for partial build-info.
pub trait PartialStore {
    /// Return the key's record, creating it if this is the first save.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read or written.
    fn get_or_create(&self, key: &BuildRunKey) -> Result<BuildRecord, EngineError>;

    /// Append one partial to the key, creating the key if needed.
    ///
    /// # Errors
    /// Returns an error if the partial cannot be persisted.
    fn append(&self, key: &BuildRunKey, partial: &Partial) -> Result<(), EngineError>;

    /// Read the key's record and partials without modifying them.
    /// Returns `None` if nothing was ever saved under the key.
    ///
    /// # Errors
    /// Returns an error if stored data cannot be read or parsed.
    fn load(&self, key: &BuildRunKey) -> Result<Option<StoredBuild>, EngineError>;

    /// Remove the key and all its partials. Deleting a missing key succeeds.
    ///
    /// # Errors
    /// Returns an error if stored data exists but cannot be removed.
    fn delete(&self, key: &BuildRunKey) -> Result<(), EngineError>;
}

const RECORD_FILE: &str = "build.json";
const PARTIALS_DIR: &str = "partials";

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed store shared by every step running on the same host.
///
/// Layout: `<root>/<key cache id>/build.json` and
/// `<root>/<key cache id>/partials/<arrival-ordered name>.json`.
#[derive(Debug, Clone)]
pub struct FsPartialStore {
    root: PathBuf,
}

impl FsPartialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything for `key`.
    pub fn build_dir(&self, key: &BuildRunKey) -> PathBuf {
        self.root.join(key.cache_id())
    }

    fn read_record(path: &Path) -> Result<BuildRecord, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| EngineError::Metadata {
            message: format!("{}: {e}", path.display()),
        })
    }

    fn read_partials(dir: &Path) -> Result<Vec<Partial>, EngineError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EngineError::Io {
                    path: dir.display().to_string(),
                    source,
                })
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EngineError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // Dot-files are in-flight writes from `write_atomic`.
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            files.push((name, entry.path()));
        }
        files.sort();

        files
            .into_iter()
            .map(|(_, path)| {
                let content = std::fs::read_to_string(&path).map_err(|source| EngineError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                serde_json::from_str(&content).map_err(|e| EngineError::Metadata {
                    message: format!("{}: {e}", path.display()),
                })
            })
            .collect()
    }
}

impl PartialStore for FsPartialStore {
    fn get_or_create(&self, key: &BuildRunKey) -> Result<BuildRecord, EngineError> {
        let dir = self.build_dir(key);
        buildtrail_util::fs::ensure_dir(&dir.join(PARTIALS_DIR))?;

        let record_path = dir.join(RECORD_FILE);
        if record_path.exists() {
            return Self::read_record(&record_path);
        }

        let record = BuildRecord::new(key, now_ms());
        let json = serde_json::to_vec_pretty(&record).map_err(|e| EngineError::Metadata {
            message: e.to_string(),
        })?;
        buildtrail_util::fs::write_atomic(&record_path, &json)?;
        debug!(build = %key, dir = %dir.display(), "created build-info cache");
        Ok(record)
    }

    fn append(&self, key: &BuildRunKey, partial: &Partial) -> Result<(), EngineError> {
        self.get_or_create(key)?;
        let json = serde_json::to_vec(partial).map_err(|e| EngineError::Metadata {
            message: e.to_string(),
        })?;
        let path = self
            .build_dir(key)
            .join(PARTIALS_DIR)
            .join(next_partial_name());
        buildtrail_util::fs::write_atomic(&path, &json)?;
        debug!(build = %key, module = %partial.module_id, path = %path.display(), "saved partial");
        Ok(())
    }

    fn load(&self, key: &BuildRunKey) -> Result<Option<StoredBuild>, EngineError> {
        let dir = self.build_dir(key);
        if !dir.is_dir() {
            return Ok(None);
        }
        let record_path = dir.join(RECORD_FILE);
        let record = if record_path.exists() {
            Self::read_record(&record_path)?
        } else {
            BuildRecord::new(key, 0)
        };
        let partials = Self::read_partials(&dir.join(PARTIALS_DIR))?;
        Ok(Some(StoredBuild { record, partials }))
    }

    fn delete(&self, key: &BuildRunKey) -> Result<(), EngineError> {
        buildtrail_util::fs::remove_dir_all_if_exists(&self.build_dir(key))?;
        Ok(())
    }
}

/// File name that sorts in arrival order: epoch nanoseconds, pid, sequence.
fn next_partial_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:020}-{:010}-{seq:06}.json", std::process::id())
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPartialStore {
    builds: Mutex<HashMap<BuildRunKey, StoredBuild>>,
}

impl MemoryPartialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys holding data.
    pub fn len(&self) -> usize {
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialStore for MemoryPartialStore {
    fn get_or_create(&self, key: &BuildRunKey) -> Result<BuildRecord, EngineError> {
        let mut builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = builds.entry(key.clone()).or_insert_with(|| StoredBuild {
            record: BuildRecord::new(key, now_ms()),
            partials: Vec::new(),
        });
        Ok(stored.record.clone())
    }

    fn append(&self, key: &BuildRunKey, partial: &Partial) -> Result<(), EngineError> {
        let mut builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
        builds
            .entry(key.clone())
            .or_insert_with(|| StoredBuild {
                record: BuildRecord::new(key, now_ms()),
                partials: Vec::new(),
            })
            .partials
            .push(partial.clone());
        Ok(())
    }

    fn load(&self, key: &BuildRunKey) -> Result<Option<StoredBuild>, EngineError> {
        let builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(builds.get(key).cloned())
    }

    fn delete(&self, key: &BuildRunKey) -> Result<(), EngineError> {
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
