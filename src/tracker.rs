//! Persistent file-hash tracking.
//!
//! The tracker owns the `relative_path → TrackedFile` mapping that survives
//! across runs. It is persisted as a versioned, human-inspectable JSON
//! document; a missing or unreadable file degrades to an empty mapping so
//! that the next sync cycle re-derives truth from the filesystem and the
//! store rather than failing outright.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::EngineError;
use crate::models::TrackedFile;

/// In-memory tracking state, keyed by relative path.
///
/// A `BTreeMap` keeps the persisted JSON stable and diff-friendly.
pub type FileMap = BTreeMap<String, TrackedFile>;

/// On-disk format version. Bumped on incompatible layout changes; an
/// unknown version is treated as corrupt state.
const TRACKER_VERSION: u32 = 1;

#[derive(serde::Serialize)]
struct TrackerStateRef<'a> {
    version: u32,
    files: &'a FileMap,
}

#[derive(serde::Deserialize)]
struct TrackerState {
    version: u32,
    files: FileMap,
}

/// Loads and persists the tracked-file mapping.
pub struct HashTracker {
    path: PathBuf,
}

impl HashTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted mapping.
    ///
    /// Fails softly: a missing file yields an empty mapping, and a corrupt
    /// one is logged and likewise yields an empty mapping. Corruption is
    /// never fatal; the next sync cycle performs a full re-index.
    pub fn load(&self) -> FileMap {
        match self.try_load() {
            Ok(files) => files,
            Err(EngineError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => FileMap::new(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "tracking file unreadable, starting from empty state"
                );
                FileMap::new()
            }
        }
    }

    fn try_load(&self) -> Result<FileMap, EngineError> {
        let bytes = std::fs::read(&self.path)?;
        let state: TrackerState = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::CorruptState(e.to_string()))?;
        if state.version != TRACKER_VERSION {
            return Err(EngineError::CorruptState(format!(
                "unknown tracker version {}",
                state.version
            )));
        }
        Ok(state.files)
    }

    /// Persist the mapping atomically.
    ///
    /// Writes to a temporary file in the destination directory and renames
    /// it into place, so a crash mid-write never leaves a state that `load`
    /// cannot read.
    pub fn save(&self, files: &FileMap) -> Result<(), EngineError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        let state = TrackerStateRef {
            version: TRACKER_VERSION,
            files,
        };
        serde_json::to_writer_pretty(tmp.as_file(), &state)
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| EngineError::Io(e.error))?;
        Ok(())
    }

    /// SHA-256 over raw file bytes, formatted as 64 lowercase hex chars.
    pub fn hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }
}
