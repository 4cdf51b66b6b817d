//! Core data models used throughout docsync.
//!
//! These types represent the tracked files, chunks, and vector records that
//! flow through the synchronization and query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file known to the hash tracker.
///
/// One record per relative path. `vector_ids` is the exact, ordered set of
/// ids this file currently owns in the vector store; after a successful sync
/// cycle it matches the store's contents for that `source_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub relative_path: String,
    /// 64-hex-char SHA-256 over the raw file bytes.
    pub content_hash: String,
    /// When this record was last written by a reconciliation.
    pub last_modified: DateTime<Utc>,
    pub vector_ids: Vec<String>,
}

/// A bounded segment of a document's extracted text.
///
/// Produced transiently by the chunker and never persisted; its identity is
/// derived from `source_path` + `sequence_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub sequence_index: usize,
    pub source_path: String,
    /// Character offset of this chunk's first non-overlap character in the
    /// original extracted text.
    pub char_offset: usize,
}

/// Metadata stored alongside each vector in the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub source_path: String,
    pub chunk_text: String,
    pub sequence_index: usize,
}

/// A record written to the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Deterministic id: `<sanitized_relative_path>_<sequence_index>`.
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A single nearest-neighbor match returned by the store.
#[derive(Debug, Clone, Serialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Index-wide statistics reported by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vectors: u64,
    pub dimension: usize,
}

/// One file that failed to reconcile during a sync cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub path: String,
    pub error: String,
}

/// Aggregate result of one sync cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Files inserted or replaced.
    pub processed: usize,
    /// Files present and unchanged.
    pub skipped: usize,
    /// Tracked files removed because they left the folder.
    pub deleted: usize,
    pub errors: Vec<SyncFailure>,
}

/// A match surfaced to the caller of the query/answer composer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMatch {
    pub chunk_text: String,
    pub source_path: String,
    pub score: f32,
}

/// Result of the query/answer composer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub matches: Vec<QueryMatch>,
    pub response_text: String,
}

/// Local engine status (no network calls).
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub tracked_files: usize,
    pub tracked_vectors: usize,
    pub docs_root: String,
    pub tracker_path: String,
}
