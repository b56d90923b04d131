//! Folder walker that feeds the index store.

use crate::config::IndexerConfig;
use crate::index::DocId;
use crate::store::{CommitOutcome, IndexWriter};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Bytes inspected by the binary-content heuristic.
const BINARY_SNIFF_LEN: usize = 8192;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub modified: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Unreadable(String),
    Binary,
    NotUtf8,
    TooLarge(u64),
    Walk(String),
    /// Excluded by configuration: a pruned directory or a file outside the extension list.
    Filtered(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(e) => write!(f, "unreadable: {e}"),
            SkipReason::Binary => f.write_str("binary content"),
            SkipReason::NotUtf8 => f.write_str("not valid UTF-8"),
            SkipReason::TooLarge(size) => write!(f, "too large ({size} bytes)"),
            SkipReason::Walk(e) => write!(f, "walk error: {e}"),
            SkipReason::Filtered(why) => write!(f, "filtered: {why}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub root: PathBuf,
    pub indexed: usize,
    pub skipped: Vec<SkippedFile>,
    /// The store was cleared while the run was in flight.
    pub cancelled: bool,
    /// Run-level failure (for example the index could not be flushed).
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl IndexSummary {
    pub fn is_success(&self) -> bool { !self.cancelled && self.error.is_none() }
}

#[derive(Debug, Clone)]
pub enum IndexEvent {
    Started { root: PathBuf, files: usize },
    Indexed { path: PathBuf, doc_id: DocId },
    Skipped(SkippedFile),
    Committed { generation: u64, documents: usize },
    Finished(IndexSummary),
}

#[derive(Debug, Clone, Default)]
pub struct Indexer {
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(config: IndexerConfig) -> Self { Self { config } }

    pub fn config(&self) -> &IndexerConfig { &self.config }

    /// Enumerate indexable regular files under `root` in file-name order.
    /// Everything else the walk meets comes back as a skip: unwalkable
    /// entries, oversized files, filtered files and each pruned directory.
    pub fn walk(&self, root: &Path) -> (Vec<FileEntry>, Vec<SkippedFile>) {
        let cfg = &self.config;
        let mut files = Vec::new();
        let mut skipped = Vec::new();
        let mut walker = WalkDir::new(root).follow_links(cfg.follow_links).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    skipped.push(SkippedFile { path, reason: SkipReason::Walk(err.to_string()) });
                    continue;
                }
            };
            if entry.depth() > 0 && entry.file_type().is_dir() {
                if entry.file_name().to_str().map(|n| cfg.is_skipped_dir(n)).unwrap_or(false) {
                    walker.skip_current_dir();
                    let reason = SkipReason::Filtered("skipped directory".to_string());
                    skipped.push(SkippedFile { path: entry.into_path(), reason });
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if !cfg.is_indexable(entry.path()) {
                let reason = SkipReason::Filtered("extension not indexed".to_string());
                skipped.push(SkippedFile { path: entry.into_path(), reason });
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    skipped.push(SkippedFile { path: entry.into_path(), reason: SkipReason::Unreadable(err.to_string()) });
                    continue;
                }
            };
            if metadata.len() > cfg.max_file_size {
                skipped.push(SkippedFile { path: entry.into_path(), reason: SkipReason::TooLarge(metadata.len()) });
                continue;
            }
            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            files.push(FileEntry { path: entry.into_path(), size: metadata.len(), modified });
        }
        (files, skipped)
    }

    /// Index every file under `root` through `writer`, committing every
    /// `batch_size` files. `on_file` runs after each file is handled. The run
    /// stops early, without committing, once the writer goes stale.
    pub async fn index_folder<F>(
        &self,
        root: &Path,
        mut writer: IndexWriter,
        events: &UnboundedSender<IndexEvent>,
        mut on_file: F,
    ) -> IndexSummary
    where
        F: FnMut(&Path) + Send,
    {
        let start = Instant::now();
        let mut summary = IndexSummary {
            root: root.to_path_buf(),
            indexed: 0,
            skipped: Vec::new(),
            cancelled: false,
            error: None,
            elapsed: Duration::ZERO,
        };

        let walker = self.clone();
        let walk_root = root.to_path_buf();
        let (files, walk_skips) = match tokio::task::spawn_blocking(move || walker.walk(&walk_root)).await {
            Ok(found) => found,
            Err(e) => {
                summary.error = Some(format!("walk task failed: {e}"));
                return finish(summary, start, events);
            }
        };
        info!(root = %root.display(), files = files.len(), skipped = walk_skips.len(), "walk complete");
        let _ = events.send(IndexEvent::Started { root: root.to_path_buf(), files: files.len() });
        for skip in walk_skips {
            record_skip(&mut summary, skip, events);
        }

        let batch_size = self.config.batch_size.max(1);
        for file in files {
            if writer.is_stale() {
                summary.cancelled = true;
                break;
            }
            match read_text(&file.path).await {
                Ok(content) => {
                    let doc_id = writer.add_document(&file.path, &content, file.modified);
                    summary.indexed += 1;
                    debug!(path = %file.path.display(), doc_id, "indexed");
                    let _ = events.send(IndexEvent::Indexed { path: file.path.clone(), doc_id });
                }
                Err(reason) => record_skip(&mut summary, SkippedFile { path: file.path.clone(), reason }, events),
            }
            on_file(&file.path);

            if writer.pending() >= batch_size && !commit(&mut writer, &mut summary, events) {
                break;
            }
        }

        if !summary.cancelled && commit(&mut writer, &mut summary, events) {
            let store = writer.store().clone();
            match tokio::task::spawn_blocking(move || store.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => summary.error = Some(e.to_string()),
                Err(e) => summary.error = Some(format!("flush task failed: {e}")),
            }
        }
        finish(summary, start, events)
    }
}

/// Returns false when the batch was discarded because the store was cleared.
fn commit(writer: &mut IndexWriter, summary: &mut IndexSummary, events: &UnboundedSender<IndexEvent>) -> bool {
    match writer.commit() {
        CommitOutcome::Published { generation, documents } => {
            let _ = events.send(IndexEvent::Committed { generation, documents });
            true
        }
        CommitOutcome::Discarded { .. } => {
            summary.cancelled = true;
            false
        }
    }
}

fn record_skip(summary: &mut IndexSummary, skip: SkippedFile, events: &UnboundedSender<IndexEvent>) {
    match skip.reason {
        SkipReason::Filtered(_) => debug!(path = %skip.path.display(), reason = %skip.reason, "skipping file"),
        _ => warn!(path = %skip.path.display(), reason = %skip.reason, "skipping file"),
    }
    let _ = events.send(IndexEvent::Skipped(skip.clone()));
    summary.skipped.push(skip);
}

fn finish(mut summary: IndexSummary, start: Instant, events: &UnboundedSender<IndexEvent>) -> IndexSummary {
    summary.elapsed = start.elapsed();
    info!(
        root = %summary.root.display(),
        indexed = summary.indexed,
        skipped = summary.skipped.len(),
        cancelled = summary.cancelled,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "indexing finished"
    );
    let _ = events.send(IndexEvent::Finished(summary.clone()));
    summary
}

pub(crate) fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

async fn read_text(path: &Path) -> Result<String, SkipReason> {
    let bytes = tokio::fs::read(path).await.map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    if looks_binary(&bytes) {
        return Err(SkipReason::Binary);
    }
    let text = String::from_utf8(bytes).map_err(|_| SkipReason::NotUtf8)?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}
