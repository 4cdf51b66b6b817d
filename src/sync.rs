//! Sync orchestration.
//!
//! [`SyncEngine`] walks the document folder, reconciles it against the hash
//! tracker, and drives the vector lifecycle for every file that is new,
//! changed, or gone. One engine instance owns the tracking state for its
//! lifetime: loaded at construction, mutated under a lock during cycles,
//! persisted at the end of each cycle.
//!
//! Reconciliations fan out across a bounded worker pool (`sync.concurrency`)
//! to respect provider rate limits; the in-memory state map is mutated one
//! reconciliation at a time. Only one cycle runs at a time: a sync or
//! cleanup requested while another is in flight is rejected, which prevents
//! duplicate vector creation races. Queries are read-only against the store
//! and run freely alongside a cycle.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::answer::{self, create_generator, Generator};
use crate::config::{Config, DocsConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::EngineError;
use crate::models::{IndexStats, QueryAnswer, StatusReport, SyncFailure, SyncReport, TrackedFile};
use crate::reconcile::{ReconcileOutcome, VectorLifecycle};
use crate::store::{create_store, VectorStore};
use crate::tracker::{FileMap, HashTracker};

/// The document synchronization engine.
pub struct SyncEngine {
    config: Config,
    tracker: HashTracker,
    state: Arc<Mutex<FileMap>>,
    lifecycle: Arc<VectorLifecycle>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    /// Mutual exclusion for sync/cleanup cycles.
    cycle_gate: Mutex<()>,
}

impl SyncEngine {
    /// Build an engine with explicit collaborators. The tracking state is
    /// loaded from the configured tracker path (empty if absent or corrupt).
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let tracker = HashTracker::new(&config.tracker.path);
        let state = Arc::new(Mutex::new(tracker.load()));
        let lifecycle = Arc::new(VectorLifecycle::new(
            store.clone(),
            embedder.clone(),
            config.chunking.clone(),
            &config.embedding,
        ));
        Self {
            config,
            tracker,
            state,
            lifecycle,
            store,
            embedder,
            generator,
            cycle_gate: Mutex::new(()),
        }
    }

    /// Build an engine with collaborators selected by configuration.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        let store = create_store(&config.index)?;
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.completion)?;
        Ok(Self::new(config, store, embedder, generator))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one full sync cycle over the document folder.
    ///
    /// Reconciles the union of tracked and present paths, so new, changed,
    /// and deleted files are all handled in one pass. Per-file failures are
    /// collected in the report, never aborting the cycle; the tracker is
    /// persisted once at the end.
    pub async fn run_sync(&self) -> Result<SyncReport, EngineError> {
        let _gate = self
            .cycle_gate
            .try_lock()
            .map_err(|_| EngineError::SyncInProgress)?;

        let current = scan_folder(&self.config.docs)?;
        let known: BTreeSet<String> = self.state.lock().await.keys().cloned().collect();
        let mut all = known.clone();
        all.extend(current.keys().cloned());

        info!(
            present = current.len(),
            tracked = known.len(),
            "starting sync cycle"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.sync.concurrency));
        let mut workers = JoinSet::new();
        for path in all.iter().cloned() {
            let semaphore = semaphore.clone();
            let state = self.state.clone();
            let lifecycle = self.lifecycle.clone();
            let abs_path = current.get(&path).cloned();
            workers.spawn(async move {
                // Never closed; acquire only fails after close
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = reconcile_one(&lifecycle, &state, &path, abs_path).await;
                (path, result)
            });
        }

        let mut results: HashMap<String, Result<ReconcileOutcome, EngineError>> = HashMap::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((path, result)) => {
                    results.insert(path, result);
                }
                Err(e) => warn!(error = %e, "sync worker terminated abnormally"),
            }
        }

        let mut report = SyncReport::default();
        for path in all {
            match results.remove(&path) {
                Some(Ok(ReconcileOutcome::Unchanged(_))) => report.skipped += 1,
                Some(Ok(ReconcileOutcome::Updated(_))) => report.processed += 1,
                Some(Ok(ReconcileOutcome::Removed)) => report.deleted += 1,
                Some(Ok(ReconcileOutcome::Absent)) => {}
                Some(Err(e)) => {
                    warn!(path = %path, error = %e, "file reconciliation failed");
                    report.errors.push(SyncFailure {
                        path,
                        error: e.to_string(),
                    });
                }
                None => report.errors.push(SyncFailure {
                    path,
                    error: "sync worker terminated abnormally".to_string(),
                }),
            }
        }

        self.persist_state().await?;
        info!(
            processed = report.processed,
            skipped = report.skipped,
            deleted = report.deleted,
            errors = report.errors.len(),
            "sync cycle complete"
        );
        Ok(report)
    }

    /// Remove vectors and tracking records for every tracked path that is no
    /// longer in the folder, without touching new or changed files.
    ///
    /// Idempotent repair operation; returns the number of vector ids
    /// removed.
    pub async fn cleanup(&self) -> Result<usize, EngineError> {
        let _gate = self
            .cycle_gate
            .try_lock()
            .map_err(|_| EngineError::SyncInProgress)?;

        let current = scan_folder(&self.config.docs)?;
        let stale: Vec<TrackedFile> = {
            let state = self.state.lock().await;
            state
                .values()
                .filter(|record| !current.contains_key(&record.relative_path))
                .cloned()
                .collect()
        };

        let mut removed = 0usize;
        for record in stale {
            match self
                .lifecycle
                .reconcile(&record.relative_path, Some(&record), None)
                .await
            {
                Ok(_) => {
                    removed += record.vector_ids.len();
                    self.state.lock().await.remove(&record.relative_path);
                }
                Err(e) => {
                    warn!(path = %record.relative_path, error = %e, "cleanup failed for tracked file");
                }
            }
        }

        self.persist_state().await?;
        info!(removed_vectors = removed, "cleanup complete");
        Ok(removed)
    }

    /// Local engine status; makes no network calls.
    pub async fn status(&self) -> StatusReport {
        let state = self.state.lock().await;
        StatusReport {
            tracked_files: state.len(),
            tracked_vectors: state.values().map(|r| r.vector_ids.len()).sum(),
            docs_root: self.config.docs.root.display().to_string(),
            tracker_path: self.tracker.path().display().to_string(),
        }
    }

    /// Index-wide statistics from the store.
    pub async fn stats(&self) -> Result<IndexStats, EngineError> {
        self.store.stats().await
    }

    /// Answer a question against the index. `top_k` defaults to the
    /// configured value.
    pub async fn ask(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<QueryAnswer, EngineError> {
        let top_k = top_k.unwrap_or(self.config.query.top_k);
        answer::compose(
            self.embedder.as_ref(),
            self.store.as_ref(),
            self.generator.as_ref(),
            &self.config.query,
            query,
            top_k,
        )
        .await
    }

    async fn persist_state(&self) -> Result<(), EngineError> {
        let state = self.state.lock().await;
        self.tracker.save(&state)
    }
}

/// Reconcile a single path and apply the outcome to the shared state map.
///
/// The state mutation and the reconciliation result are applied together so
/// the map always reflects what actually happened in the store; on error the
/// old entry is left untouched and the next cycle retries.
async fn reconcile_one(
    lifecycle: &VectorLifecycle,
    state: &Mutex<FileMap>,
    path: &str,
    abs_path: Option<PathBuf>,
) -> Result<ReconcileOutcome, EngineError> {
    let old = { state.lock().await.get(path).cloned() };

    let content = match &abs_path {
        Some(p) => match tokio::fs::read(p).await {
            Ok(bytes) => Some(bytes),
            // Deleted between scan and read: fall through to the
            // deleted-file branch of the policy
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    let outcome = lifecycle
        .reconcile(path, old.as_ref(), content.as_deref())
        .await?;

    let mut map = state.lock().await;
    match &outcome {
        ReconcileOutcome::Unchanged(record) | ReconcileOutcome::Updated(record) => {
            map.insert(path.to_string(), record.clone());
        }
        ReconcileOutcome::Removed | ReconcileOutcome::Absent => {
            map.remove(path);
        }
    }
    Ok(outcome)
}

/// Enumerate document files in the folder.
///
/// The scan is flat: the document folder is a single drop-in directory and
/// subdirectories are not descended into. Hidden files (`.DS_Store` and
/// friends) and configured exclude globs are skipped. Returns relative file
/// name → absolute path.
pub fn scan_folder(docs: &DocsConfig) -> Result<BTreeMap<String, PathBuf>, EngineError> {
    let root = &docs.root;
    if !root.is_dir() {
        return Err(EngineError::InvalidInput(format!(
            "document folder does not exist: {}",
            root.display()
        )));
    }

    let exclude = build_globset(&docs.exclude_globs)?;
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| EngineError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if exclude.is_match(&name) {
            continue;
        }
        files.insert(name, entry.path().to_path_buf());
    }
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, EngineError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| EngineError::InvalidInput(e.to_string()))?);
    }
    builder
        .build()
        .map_err(|e| EngineError::InvalidInput(e.to_string()))
}
