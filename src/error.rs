//! Crate-wide error taxonomy.
//!
//! Every fallible engine operation returns [`EngineError`]. The variants map
//! onto how a failure is handled rather than where it occurred:
//!
//! | Variant | Handling |
//! |---------|----------|
//! | [`UnsupportedFormat`](EngineError::UnsupportedFormat) | File skipped, collected per-file |
//! | [`Extraction`](EngineError::Extraction) | File skipped, collected per-file |
//! | [`Provider`](EngineError::Provider) | Retried with backoff, then file skipped (sync) or surfaced (query) |
//! | [`Store`](EngineError::Store) | Same retry policy as `Provider` |
//! | [`CorruptState`](EngineError::CorruptState) | Recovered by treating tracking state as empty |
//! | [`InvalidInput`](EngineError::InvalidInput) | Surfaced directly to the caller |
//! | [`SyncInProgress`](EngineError::SyncInProgress) | Surfaced directly; the running cycle is left alone |
//! | [`Io`](EngineError::Io) | Collected per-file during sync, surfaced otherwise |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// File extension outside the supported set (`.txt`, `.pdf`, `.docx`).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A supported file could not be parsed into text.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Embedding or completion provider failure (quota, auth, network).
    #[error("provider error: {0}")]
    Provider(String),

    /// Vector store unavailable or returned an error.
    #[error("vector store error: {0}")]
    Store(String),

    /// The persisted tracking file is unreadable or has an unknown version.
    #[error("corrupt tracking state: {0}")]
    CorruptState(String),

    /// Caller-supplied input rejected before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A sync cycle was requested while another is in flight.
    #[error("a sync cycle is already in progress")]
    SyncInProgress,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
