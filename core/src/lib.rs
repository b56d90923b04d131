//! Full-text indexing and search over the files of a directory tree.
//!
//! - [`IndexStore`]: inverted index with snapshot reads and generation-checked batch commits
//! - [`Indexer`]: folder walker that feeds the store
//! - [`QueryEngine`]: boolean/phrase query parser and TF-IDF ranking
//! - [`Engine`]: shared handle coordinating one indexing job with concurrent readers

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod persist;
pub mod query;
pub mod search;
pub mod store;
pub mod tokenizer;

pub use config::{EngineConfig, IndexerConfig};
pub use engine::{Engine, EngineStatus, IndexingJob, Progress};
pub use error::{EngineError, QueryError, Result};
pub use index::{DocId, Document, Posting, PostingList, Snapshot};
pub use indexer::{IndexEvent, IndexSummary, Indexer, SkipReason, SkippedFile};
pub use search::{QueryEngine, SearchResult, SearchResults};
pub use store::{CommitOutcome, IndexStore, IndexWriter};
pub use tokenizer::{Analyzer, AnalyzerConfig};
