//! Vector lifecycle management.
//!
//! Decides, per file, whether to skip, insert, replace, or delete, and
//! drives the embedding and store calls that carry the decision out. The
//! policy is a state machine over file presence and hash equality:
//!
//! | Old record | File present | Hash equal | Action |
//! |------------|--------------|------------|--------|
//! | absent | yes | n/a | extract, chunk, embed, upsert; record new entry |
//! | present | yes | yes | skip |
//! | present | yes | no | delete old ids, then insert fresh |
//! | present | no | n/a | delete old ids, drop the entry |
//! | absent | no | n/a | no-op |
//!
//! Deletion of old vectors always precedes insertion of new ones, and both
//! sides self-heal: vector ids are deterministic and deletes are idempotent,
//! so a cycle interrupted between the two steps converges on the next run
//! by re-deriving truth from the filesystem and the store.
//!
//! Embedding failures are atomic per file: every chunk is embedded before
//! anything is upserted, so a failed batch never leaves a partial vector
//! set behind.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

use crate::chunk::{chunk_text, vector_id};
use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::extract::extract_text;
use crate::models::{Chunk, TrackedFile, VectorMetadata, VectorRecord};
use crate::store::VectorStore;

/// Result of reconciling one file against the tracked state.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// File present and byte-identical to the tracked record; nothing done.
    Unchanged(TrackedFile),
    /// File inserted or replaced; the new record to track.
    Updated(TrackedFile),
    /// File gone from the folder; its vectors were deleted and the record
    /// should be dropped.
    Removed,
    /// Neither tracked nor present.
    Absent,
}

/// Drives per-file vector lifecycle decisions against the store.
pub struct VectorLifecycle {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl VectorLifecycle {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
        embedding: &EmbeddingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunking,
            batch_size: embedding.batch_size.max(1),
        }
    }

    /// Reconcile one file. `old` is the tracked record if any; `content` is
    /// the file's current bytes, or `None` if it no longer exists.
    pub async fn reconcile(
        &self,
        relative_path: &str,
        old: Option<&TrackedFile>,
        content: Option<&[u8]>,
    ) -> Result<ReconcileOutcome, EngineError> {
        match (old, content) {
            (None, None) => Ok(ReconcileOutcome::Absent),

            (Some(record), None) => {
                self.store.delete(&record.vector_ids).await?;
                Ok(ReconcileOutcome::Removed)
            }

            (old, Some(bytes)) => {
                let content_hash = crate::tracker::HashTracker::hash(bytes);
                if let Some(record) = old {
                    if record.content_hash == content_hash {
                        return Ok(ReconcileOutcome::Unchanged(record.clone()));
                    }
                    // Changed: remove the old generation before inserting the
                    // new one so stale chunk ids never outlive the file.
                    self.store.delete(&record.vector_ids).await?;
                }
                let record = self.index_file(relative_path, bytes, content_hash).await?;
                Ok(ReconcileOutcome::Updated(record))
            }
        }
    }

    /// Extract, chunk, embed, and upsert a file, returning its new record.
    async fn index_file(
        &self,
        relative_path: &str,
        bytes: &[u8],
        content_hash: String,
    ) -> Result<TrackedFile, EngineError> {
        let extension = Path::new(relative_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let text = extract_text(bytes, extension)?;

        let chunks = chunk_text(
            relative_path,
            &text,
            self.chunking.max_chars,
            self.chunking.overlap,
        );

        // A file whose extracted text is empty stays tracked with no vectors
        if chunks.is_empty() {
            return Ok(TrackedFile {
                relative_path: relative_path.to_string(),
                content_hash,
                last_modified: Utc::now(),
                vector_ids: Vec::new(),
            });
        }

        let records = self.embed_chunks(&chunks).await?;
        let vector_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        self.store.upsert(&records).await?;

        Ok(TrackedFile {
            relative_path: relative_path.to_string(),
            content_hash,
            last_modified: Utc::now(),
            vector_ids,
        })
    }

    /// Embed all chunks (batched) and pair them with deterministic ids.
    ///
    /// All batches must succeed before anything is returned; a failure here
    /// fails the whole file.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<VectorRecord>, EngineError> {
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EngineError::Provider(format!(
                    "embedding count mismatch: sent {}, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(vectors);
        }

        Ok(chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, values)| VectorRecord {
                id: vector_id(&chunk.source_path, chunk.sequence_index),
                values,
                metadata: VectorMetadata {
                    source_path: chunk.source_path.clone(),
                    chunk_text: chunk.text.clone(),
                    sequence_index: chunk.sequence_index,
                },
            })
            .collect())
    }
}
