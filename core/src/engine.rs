//! Process-wide engine handle.
//!
//! `Engine` is built once with [`Engine::open`] and shared as `Arc<Engine>`.
//! At most one indexing job runs at a time. The job reports progress through
//! the job slot (polled with [`Engine::currently_indexing`]) and a `watch`
//! channel. `clear_all` cancels a running job by invalidating its store
//! generation; the job id check keeps a cancelled job from touching the
//! status of whatever runs next.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::index::Snapshot;
use crate::indexer::{IndexEvent, IndexSummary, Indexer};
use crate::search::{QueryEngine, SearchResult, SearchResults};
use crate::store::IndexStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub root: PathBuf,
    pub current_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub document_count: usize,
    pub generation: u64,
    pub indexing: Option<Progress>,
}

struct JobSlot {
    id: u64,
    progress: Progress,
}

pub struct Engine {
    store: Arc<IndexStore>,
    query_engine: QueryEngine,
    indexer: Indexer,
    job: Mutex<Option<JobSlot>>,
    next_job_id: AtomicU64,
    progress_tx: watch::Sender<Option<PathBuf>>,
    config: EngineConfig,
}

/// A running indexing job.
pub struct IndexingJob {
    pub root: PathBuf,
    pub events: UnboundedReceiver<IndexEvent>,
    handle: JoinHandle<IndexSummary>,
}

impl IndexingJob {
    pub async fn wait(self) -> Result<IndexSummary> {
        self.handle.await.map_err(|e| EngineError::Task(e.to_string()))
    }
}

/// Returns the engine to idle when the job task ends, panics included.
struct JobGuard {
    engine: Arc<Engine>,
    id: u64,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.engine.finish_job(self.id);
    }
}

impl Engine {
    pub fn open(config: EngineConfig) -> Result<Arc<Self>> {
        let store = match &config.index_dir {
            Some(dir) => IndexStore::open(dir, config.analyzer)?,
            None => IndexStore::in_memory(config.analyzer),
        };
        let (progress_tx, _) = watch::channel(None);
        Ok(Arc::new(Self {
            query_engine: QueryEngine::new(*store.analyzer()),
            store: Arc::new(store),
            indexer: Indexer::new(config.indexer.clone()),
            job: Mutex::new(None),
            next_job_id: AtomicU64::new(1),
            progress_tx,
            config,
        }))
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn store(&self) -> &Arc<IndexStore> { &self.store }

    pub fn document_count(&self) -> usize { self.store.document_count() }

    pub fn current_snapshot(&self) -> Arc<Snapshot> { self.store.snapshot() }

    /// Count, generation and progress read together; count and generation
    /// come from the same snapshot.
    pub fn status(&self) -> EngineStatus {
        let snapshot = self.store.snapshot();
        EngineStatus {
            document_count: snapshot.document_count(),
            generation: snapshot.generation(),
            indexing: self.job.lock().as_ref().map(|slot| slot.progress.clone()),
        }
    }

    /// The path being processed, or the root before the first file. `None` when idle.
    pub fn currently_indexing(&self) -> Option<PathBuf> {
        self.job
            .lock()
            .as_ref()
            .map(|slot| slot.progress.current_file.clone().unwrap_or_else(|| slot.progress.root.clone()))
    }

    /// Push-style view of the same progress `currently_indexing` polls.
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<PathBuf>> {
        self.progress_tx.subscribe()
    }

    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        Ok(self.query_engine.search(query, &self.store.snapshot())?)
    }

    pub fn search_limit(&self, query: &str, limit: usize) -> Result<SearchResults> {
        Ok(self.query_engine.search_limit(query, &self.store.snapshot(), limit)?)
    }

    /// Start indexing `root` on a background task. Must be called from
    /// within a Tokio runtime.
    pub fn start_indexing(self: &Arc<Self>, root: impl AsRef<Path>) -> Result<IndexingJob> {
        let root = validate_folder(root.as_ref())?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| EngineError::Task(e.to_string()))?;

        let mut job = self.job.lock();
        if let Some(slot) = job.as_ref() {
            return Err(EngineError::AlreadyIndexing { root: slot.progress.root.clone() });
        }
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        *job = Some(JobSlot { id, progress: Progress { root: root.clone(), current_file: None } });
        // Bound to the current generation while the slot is held, so a clear cannot slip in between.
        let writer = self.store.writer();
        drop(job);
        self.progress_tx.send_replace(Some(root.clone()));
        info!(root = %root.display(), job = id, generation = writer.generation(), "indexing started");

        let (tx, events) = unbounded_channel();
        let guard = JobGuard { engine: Arc::clone(self), id };
        let job_root = root.clone();
        let handle = runtime.spawn(async move {
            let engine = Arc::clone(&guard.engine);
            let summary = engine
                .indexer
                .index_folder(&job_root, writer, &tx, |path| engine.set_current_file(id, path))
                .await;
            drop(guard);
            summary
        });
        Ok(IndexingJob { root, events, handle })
    }

    /// Drop every document. A running job is cancelled: its store generation
    /// is invalidated so its remaining writes are discarded. The empty index
    /// is saved after the job slot is released, so status reads never wait
    /// on the disk write.
    pub fn clear_all(&self) -> Result<()> {
        {
            let mut job = self.job.lock();
            self.store.reset();
            if let Some(slot) = job.take() {
                warn!(root = %slot.progress.root.display(), job = slot.id, "clear cancelled running indexing job");
                self.progress_tx.send_replace(None);
            }
        }
        self.store.flush()
    }

    /// Stored text of an indexed document.
    pub fn read_indexed_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let snapshot = self.store.snapshot();
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        snapshot
            .document_by_path(&canonical)
            .or_else(|| snapshot.document_by_path(path))
            .map(|doc| doc.content.clone())
            .ok_or_else(|| EngineError::NotIndexed(path.to_path_buf()))
    }

    fn set_current_file(&self, id: u64, path: &Path) {
        let mut job = self.job.lock();
        if let Some(slot) = job.as_mut().filter(|slot| slot.id == id) {
            slot.progress.current_file = Some(path.to_path_buf());
            self.progress_tx.send_replace(Some(path.to_path_buf()));
        }
    }

    fn finish_job(&self, id: u64) {
        let mut job = self.job.lock();
        if job.as_ref().map(|slot| slot.id) == Some(id) {
            *job = None;
            self.progress_tx.send_replace(None);
            info!(job = id, "indexing job finished");
        }
    }
}

fn validate_folder(path: &Path) -> Result<PathBuf> {
    let invalid = |reason: &str| EngineError::InvalidPath { path: path.to_path_buf(), reason: reason.to_string() };
    let metadata = std::fs::metadata(path).map_err(|_| invalid("does not exist"))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory"));
    }
    Ok(std::fs::canonicalize(path)?)
}
