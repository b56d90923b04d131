//! The inverted index store.
//!
//! Readers take an `Arc<Snapshot>` under a read lock held only long enough to
//! clone the pointer, so they never wait on the indexer. Writers buffer
//! changes in an [`IndexWriter`] and publish them with `commit`, which swaps
//! in a new snapshot in one step. `remove_all` bumps the store generation;
//! writers created against an older generation have their commits discarded.
//!
//! Disk writes are serialized by their own lock and always save the latest
//! published snapshot, so publishing never waits on a save in progress.

use crate::error::{EngineError, Result};
use crate::index::{DocId, Document, PostingList, Snapshot};
use crate::persist::{load_index, save_index, IndexPaths};
use crate::tokenizer::{Analyzer, AnalyzerConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct IndexStore {
    published: RwLock<Arc<Snapshot>>,
    commit_lock: Mutex<()>,
    pub(crate) persist_lock: Mutex<()>,
    generation: AtomicU64,
    next_doc_id: AtomicU32,
    analyzer: Analyzer,
    paths: Option<IndexPaths>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Published { generation: u64, documents: usize },
    /// The store was cleared after this writer was created; its batch was dropped.
    Discarded { generation: u64 },
}

impl IndexStore {
    pub fn in_memory(analyzer: AnalyzerConfig) -> Self {
        Self {
            published: RwLock::new(Arc::new(Snapshot::empty(0))),
            commit_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            next_doc_id: AtomicU32::new(0),
            analyzer: Analyzer::new(analyzer),
            paths: None,
        }
    }

    /// Open the index persisted under `dir`, or start an empty one there.
    /// An existing index keeps the analyzer it was built with.
    pub fn open<P: AsRef<Path>>(dir: P, analyzer: AnalyzerConfig) -> Result<Self> {
        let paths = IndexPaths::new(dir);
        let store = match load_index(&paths)? {
            Some(loaded) => {
                if loaded.meta.analyzer != analyzer {
                    warn!(root = %paths.root.display(), "index was built with a different analyzer; keeping the persisted one");
                }
                info!(
                    root = %paths.root.display(),
                    documents = loaded.snapshot.document_count(),
                    generation = loaded.meta.generation,
                    "opened index"
                );
                Self {
                    generation: AtomicU64::new(loaded.meta.generation),
                    next_doc_id: AtomicU32::new(loaded.meta.next_doc_id),
                    published: RwLock::new(Arc::new(loaded.snapshot)),
                    commit_lock: Mutex::new(()),
                    persist_lock: Mutex::new(()),
                    analyzer: Analyzer::new(loaded.meta.analyzer),
                    paths: Some(paths),
                }
            }
            None => {
                info!(root = %paths.root.display(), "creating new index");
                Self { paths: Some(paths), ..Self::in_memory(analyzer) }
            }
        };
        Ok(store)
    }

    pub fn analyzer(&self) -> &Analyzer { &self.analyzer }

    pub fn generation(&self) -> u64 { self.generation.load(Ordering::SeqCst) }

    /// The latest committed state. Later commits never mutate it.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.published.read().clone()
    }

    pub fn document_count(&self) -> usize {
        self.published.read().document_count()
    }

    /// Postings for the normalized form of `term` in `snapshot`.
    pub fn query<'a>(&self, snapshot: &'a Snapshot, term: &str) -> Option<&'a PostingList> {
        let (normalized, _) = self.analyzer.analyze(term).into_iter().next()?;
        snapshot.postings(&normalized)
    }

    pub fn writer(self: &Arc<Self>) -> IndexWriter {
        IndexWriter {
            store: Arc::clone(self),
            generation: self.generation(),
            pending: Vec::new(),
        }
    }

    /// Index one document and commit it immediately. Fails with
    /// [`EngineError::Cleared`] if the store was cleared before the commit.
    pub fn add_document(self: &Arc<Self>, path: impl Into<PathBuf>, content: &str, modified: u64) -> Result<DocId> {
        commit_one(self.writer(), path, content, modified)
    }

    /// Discard every document and posting, bump the generation and persist
    /// the empty index.
    pub fn remove_all(&self) -> Result<u64> {
        let generation = self.reset();
        self.flush()?;
        Ok(generation)
    }

    /// In-memory half of `remove_all`: bump the generation and publish an
    /// empty snapshot without touching disk. Follow with `flush` to persist.
    pub fn reset(&self) -> u64 {
        let _guard = self.commit_lock.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.published.write() = Arc::new(Snapshot::empty(generation));
        info!(generation, "index cleared");
        generation
    }

    /// Write the latest committed snapshot to disk. No-op for in-memory stores.
    pub fn flush(&self) -> Result<()> {
        let Some(paths) = &self.paths else { return Ok(()) };
        let _guard = self.persist_lock.lock();
        let snapshot = self.snapshot();
        save_index(paths, &snapshot, self.next_doc_id.load(Ordering::SeqCst), self.analyzer.config())?;
        debug!(documents = snapshot.document_count(), generation = snapshot.generation(), "index flushed");
        Ok(())
    }

    fn next_doc_id(&self) -> DocId {
        self.next_doc_id.fetch_add(1, Ordering::SeqCst)
    }
}

fn commit_one(mut writer: IndexWriter, path: impl Into<PathBuf>, content: &str, modified: u64) -> Result<DocId> {
    let id = writer.add_document(path, content, modified);
    match writer.commit() {
        CommitOutcome::Published { .. } => Ok(id),
        CommitOutcome::Discarded { .. } => Err(EngineError::Cleared { generation: writer.generation() }),
    }
}

enum PendingOp {
    Add(Document, HashMap<String, Vec<u32>>),
    Remove(PathBuf),
}

/// A batch of changes bound to the store generation current at creation.
pub struct IndexWriter {
    store: Arc<IndexStore>,
    generation: u64,
    pending: Vec<PendingOp>,
}

impl IndexWriter {
    pub fn generation(&self) -> u64 { self.generation }

    pub fn store(&self) -> &Arc<IndexStore> { &self.store }

    pub fn pending(&self) -> usize { self.pending.len() }

    /// True once the store has been cleared out from under this writer.
    pub fn is_stale(&self) -> bool { self.store.generation() != self.generation }

    /// Analyze `content` and buffer it. Replaces any document already stored
    /// under `path` when committed.
    pub fn add_document(&mut self, path: impl Into<PathBuf>, content: &str, modified: u64) -> DocId {
        let mut term_positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (term, pos) in self.store.analyzer.analyze(content) {
            term_positions.entry(term).or_default().push(pos);
        }
        let id = self.store.next_doc_id();
        let doc = Document {
            id,
            path: path.into(),
            content: content.to_string(),
            modified,
            terms: term_positions.keys().cloned().collect(),
        };
        self.pending.push(PendingOp::Add(doc, term_positions));
        id
    }

    pub fn remove_document(&mut self, path: impl Into<PathBuf>) {
        self.pending.push(PendingOp::Remove(path.into()));
    }

    /// Publish the buffered batch atomically, or drop it if the generation moved on.
    pub fn commit(&mut self) -> CommitOutcome {
        let store = &self.store;
        let _guard = store.commit_lock.lock();
        let ops = std::mem::take(&mut self.pending);

        let current = store.generation();
        if current != self.generation {
            warn!(writer_generation = self.generation, current, dropped = ops.len(), "discarding stale batch");
            return CommitOutcome::Discarded { generation: self.generation };
        }
        if ops.is_empty() {
            return CommitOutcome::Published { generation: current, documents: store.document_count() };
        }

        let mut next = Snapshot::clone(&store.published.read());
        for op in ops {
            match op {
                PendingOp::Add(doc, terms) => next.insert_document(doc, terms),
                PendingOp::Remove(path) => {
                    if let Some(id) = next.by_path.get(&path).copied() {
                        next.remove_document(id);
                    }
                }
            }
        }
        let documents = next.document_count();
        *store.published.write() = Arc::new(next);
        debug!(generation = current, documents, "batch committed");
        CommitOutcome::Published { generation: current, documents }
    }
}
