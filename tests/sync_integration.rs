//! End-to-end engine tests over an in-memory store and stub providers.
//!
//! Covers the consistency guarantees of the sync cycle: idempotence,
//! change-triggered replacement, deletion, cleanup, error isolation, and
//! the query/answer path.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use docsync::answer::{Generator, NO_MATCH_RESPONSE};
use docsync::config::{
    ChunkingConfig, CompletionConfig, Config, DocsConfig, EmbeddingConfig, IndexConfig,
    QueryConfig, ServerConfig, SyncConfig, TrackerConfig,
};
use docsync::embedding::Embedder;
use docsync::error::EngineError;
use docsync::store::{MemoryStore, VectorStore};
use docsync::sync::SyncEngine;

/// Deterministic embedder; counts batch calls so tests can assert that
/// unchanged files trigger no provider traffic.
struct StubEmbedder {
    calls: AtomicUsize,
}

impl StubEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn dims(&self) -> usize {
        8
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = [0.0f32; 8];
                for (i, b) in t.to_lowercase().bytes().enumerate() {
                    v[(i * 7 + b as usize) % 8] += 1.0;
                }
                v.to_vec()
            })
            .collect())
    }
}

/// Generator stub; counts calls so tests can assert the no-match
/// short-circuit skips generation.
struct StubGenerator {
    calls: AtomicUsize,
}

impl StubGenerator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("Grounded answer.".to_string())
    }
}

struct TestHarness {
    _tmp: TempDir,
    docs: PathBuf,
    tracker_path: PathBuf,
    store: Arc<MemoryStore>,
    embedder: Arc<StubEmbedder>,
    generator: Arc<StubGenerator>,
}

impl TestHarness {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        let tracker_path = tmp.path().join("tracker.json");
        Self {
            docs,
            tracker_path,
            store: Arc::new(MemoryStore::new()),
            embedder: StubEmbedder::new(),
            generator: StubGenerator::new(),
            _tmp: tmp,
        }
    }

    fn config(&self) -> Config {
        Config {
            docs: DocsConfig {
                root: self.docs.clone(),
                exclude_globs: Vec::new(),
            },
            tracker: TrackerConfig {
                path: self.tracker_path.clone(),
            },
            chunking: ChunkingConfig {
                max_chars: 20,
                overlap: 0,
            },
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            index: IndexConfig::default(),
            sync: SyncConfig { concurrency: 3 },
            query: QueryConfig {
                top_k: 3,
                max_query_len: 100,
            },
            server: ServerConfig::default(),
        }
    }

    /// Build a fresh engine over the shared store and providers, loading
    /// whatever tracking state is on disk.
    fn engine(&self) -> SyncEngine {
        SyncEngine::new(
            self.config(),
            self.store.clone(),
            self.embedder.clone(),
            self.generator.clone(),
        )
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.docs.join(name), content).unwrap();
    }

    fn remove(&self, name: &str) {
        std::fs::remove_file(self.docs.join(name)).unwrap();
    }
}

async fn total_vectors(store: &MemoryStore) -> u64 {
    store.stats().await.unwrap().total_vectors
}

#[tokio::test]
async fn test_first_sync_indexes_with_deterministic_ids() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");

    let engine = h.engine();
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.deleted, 0);
    assert!(report.errors.is_empty());

    assert_eq!(total_vectors(&h.store).await, 2);

    // Ids derive from path + sequence index
    h.store
        .delete(&["a_txt_0".to_string(), "a_txt_1".to_string()])
        .await
        .unwrap();
    assert_eq!(total_vectors(&h.store).await, 0);
}

#[tokio::test]
async fn test_second_sync_is_idempotent() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");
    h.write("b.txt", "Beta file. More text.");

    let engine = h.engine();
    engine.run_sync().await.unwrap();
    let calls_after_first = h.embedder.call_count();
    let vectors_after_first = total_vectors(&h.store).await;

    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 2);
    // Zero embedding/upsert traffic on the unchanged run
    assert_eq!(h.embedder.call_count(), calls_after_first);
    assert_eq!(total_vectors(&h.store).await, vectors_after_first);
}

#[tokio::test]
async fn test_changed_file_is_replaced_not_duplicated() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");

    let engine = h.engine();
    engine.run_sync().await.unwrap();
    assert_eq!(total_vectors(&h.store).await, 2);

    h.write("a.txt", "Hello. Universe.");
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(total_vectors(&h.store).await, 2);

    // Same id scheme, updated chunk text
    let query = h.embedder.embed(&["Universe.".to_string()]).await.unwrap();
    let matches = h.store.query(&query[0], 2).await.unwrap();
    assert!(matches
        .iter()
        .any(|m| m.id == "a_txt_1" && m.metadata.chunk_text == "Universe."));
}

#[tokio::test]
async fn test_deleted_file_removes_exactly_its_vectors() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");
    h.write("b.txt", "Keep me around.");

    let engine = h.engine();
    engine.run_sync().await.unwrap();
    let before = total_vectors(&h.store).await;

    h.remove("a.txt");
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(total_vectors(&h.store).await, before - 2);

    let status = engine.status().await;
    assert_eq!(status.tracked_files, 1);
}

#[tokio::test]
async fn test_cleanup_returns_removed_vector_count() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");

    let engine = h.engine();
    engine.run_sync().await.unwrap();
    assert_eq!(total_vectors(&h.store).await, 2);

    h.remove("a.txt");
    let removed = engine.cleanup().await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(total_vectors(&h.store).await, 0);
    assert_eq!(engine.status().await.tracked_files, 0);

    // Idempotent: nothing left to repair
    assert_eq!(engine.cleanup().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_leaves_new_and_changed_files_alone() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");

    let engine = h.engine();
    engine.run_sync().await.unwrap();

    // A new file and a content change; cleanup must touch neither
    h.write("b.txt", "Fresh file.");
    h.write("a.txt", "Hello. Changed.");
    let removed = engine.cleanup().await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(total_vectors(&h.store).await, 2);
    assert_eq!(h.embedder.call_count(), 1);
}

#[tokio::test]
async fn test_ask_returns_match_and_attribution() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");

    let engine = h.engine();
    engine.run_sync().await.unwrap();

    let answer = engine.ask("World", Some(1)).await.unwrap();
    assert_eq!(answer.matches.len(), 1);
    assert_eq!(answer.matches[0].source_path, "a.txt");
    assert!(!answer.response_text.is_empty());
    assert!(answer.response_text.contains("Sources: a.txt"));
    assert_eq!(h.generator.call_count(), 1);
}

#[tokio::test]
async fn test_ask_with_empty_index_skips_generation() {
    let h = TestHarness::new();
    let engine = h.engine();

    let answer = engine.ask("anything", None).await.unwrap();
    assert!(answer.matches.is_empty());
    assert_eq!(answer.response_text, NO_MATCH_RESPONSE);
    assert_eq!(h.generator.call_count(), 0);
}

#[tokio::test]
async fn test_ask_rejects_overlong_query() {
    let h = TestHarness::new();
    let engine = h.engine();

    let long_query = "x".repeat(101);
    let err = engine.ask(&long_query, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_per_file_errors_do_not_abort_the_cycle() {
    let h = TestHarness::new();
    h.write("good.txt", "Indexable text.");
    h.write("image.png", "not a document");

    let engine = h.engine();
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "image.png");
    assert!(report.errors[0].error.contains("unsupported format"));

    // The failed file stays untracked and is retried next cycle
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_tracking_state_survives_engine_restart() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");

    h.engine().run_sync().await.unwrap();
    let calls_after_first = h.embedder.call_count();

    // Fresh engine, same tracker file: nothing to re-embed
    let engine = h.engine();
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.embedder.call_count(), calls_after_first);
}

#[tokio::test]
async fn test_corrupt_tracker_recovers_by_reindexing() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");

    h.engine().run_sync().await.unwrap();
    std::fs::write(&h.tracker_path, b"{ definitely not json").unwrap();

    // State loads empty; the cycle re-derives everything. Deterministic
    // ids make the re-insert overwrite rather than duplicate.
    let engine = h.engine();
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(total_vectors(&h.store).await, 2);
}

#[tokio::test]
async fn test_one_byte_change_triggers_exactly_one_replacement() {
    let h = TestHarness::new();
    h.write("a.txt", "Hello. World.");

    let engine = h.engine();
    engine.run_sync().await.unwrap();

    h.write("a.txt", "Hello. World!");
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(total_vectors(&h.store).await, 2);
}

#[tokio::test]
async fn test_missing_docs_folder_is_invalid_input() {
    let h = TestHarness::new();
    std::fs::remove_dir(&h.docs).unwrap();

    let engine = h.engine();
    let err = engine.run_sync().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_many_files_under_bounded_concurrency() {
    let h = TestHarness::new();
    for i in 0..20 {
        h.write(&format!("doc{i:02}.txt"), &format!("Document number {i}."));
    }

    let engine = h.engine();
    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.processed, 20);
    assert!(report.errors.is_empty());
    assert_eq!(total_vectors(&h.store).await, 20);

    let report = engine.run_sync().await.unwrap();
    assert_eq!(report.skipped, 20);
}
