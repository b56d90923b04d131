use crate::error::{EngineError, Result};
use crate::index::{DocId, Document, PostingList, Snapshot};
use crate::tokenizer::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub generation: u64,
    pub next_doc_id: DocId,
    pub num_docs: u32,
    pub analyzer: AnalyzerConfig,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// What `load_index` hands back to the store.
pub struct LoadedIndex {
    pub meta: MetaFile,
    pub snapshot: Snapshot,
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let json = serde_json::to_string_pretty(meta)?;
    write_atomic(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<Option<MetaFile>> {
    let buf = match fs::read_to_string(paths.meta()) {
        Ok(buf) => buf,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta: MetaFile = serde_json::from_str(&buf)?;
    if meta.version != FORMAT_VERSION {
        return Err(EngineError::Corrupt(format!(
            "unsupported index version {} (expected {FORMAT_VERSION})",
            meta.version
        )));
    }
    Ok(Some(meta))
}

/// Persist a full snapshot. Documents and postings go first and the meta
/// file last, so a reader never sees a meta file ahead of its data.
pub fn save_index(paths: &IndexPaths, snapshot: &Snapshot, next_doc_id: DocId, analyzer: AnalyzerConfig) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut docs: Vec<&Document> = snapshot.docs.values().map(|d| d.as_ref()).collect();
    docs.sort_by_key(|d| d.id);
    write_atomic(&paths.docs(), &bincode::serialize(&docs)?)?;

    let postings: HashMap<&str, &PostingList> = snapshot
        .postings
        .iter()
        .map(|(term, list)| (term.as_str(), list.as_ref()))
        .collect();
    write_atomic(&paths.postings(), &bincode::serialize(&postings)?)?;

    let meta = MetaFile {
        version: FORMAT_VERSION,
        generation: snapshot.generation,
        next_doc_id,
        num_docs: docs.len() as u32,
        analyzer,
        updated_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
    };
    save_meta(paths, &meta)
}

/// Load a persisted index. `Ok(None)` when the directory holds no index yet.
pub fn load_index(paths: &IndexPaths) -> Result<Option<LoadedIndex>> {
    let meta = match load_meta(paths)? {
        Some(meta) => meta,
        None => return Ok(None),
    };
    let docs: Vec<Document> = bincode::deserialize(&fs::read(paths.docs())?)?;
    let postings: HashMap<String, PostingList> = bincode::deserialize(&fs::read(paths.postings())?)?;

    let mut snapshot = Snapshot::empty(meta.generation);
    for doc in docs {
        snapshot.by_path.insert(doc.path.clone(), doc.id);
        snapshot.docs.insert(doc.id, Arc::new(doc));
    }
    for (term, list) in postings {
        if let Some(p) = list.postings.iter().find(|p| !snapshot.docs.contains_key(&p.doc_id)) {
            return Err(EngineError::Corrupt(format!("posting for '{term}' references missing document {}", p.doc_id)));
        }
        snapshot.postings.insert(term, Arc::new(list));
    }
    if snapshot.docs.len() != meta.num_docs as usize {
        return Err(EngineError::Corrupt(format!(
            "meta.json records {} documents but docs.bin holds {}",
            meta.num_docs,
            snapshot.docs.len()
        )));
    }
    Ok(Some(LoadedIndex { meta, snapshot }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn sample() -> Snapshot {
        let mut snap = Snapshot::empty(3);
        let mut terms = HashMap::new();
        terms.insert("rust".to_string(), vec![0, 4]);
        snap.insert_document(
            Document { id: 7, path: PathBuf::from("/src/a.rs"), content: "rust is rust".into(), modified: 10, terms: vec!["rust".into()] },
            terms,
        );
        snap
    }

    #[test]
    fn missing_directory_loads_as_none() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("nothing-here"));
        assert!(load_index(&paths).unwrap().is_none());
    }

    #[test]
    fn saved_index_reloads_with_same_documents() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        save_index(&paths, &sample(), 8, AnalyzerConfig::default()).unwrap();

        let loaded = load_index(&paths).unwrap().unwrap();
        assert_eq!(loaded.meta.next_doc_id, 8);
        assert_eq!(loaded.meta.generation, 3);
        assert_eq!(loaded.snapshot.document_count(), 1);
        let doc = loaded.snapshot.document_by_path(Path::new("/src/a.rs")).unwrap();
        assert_eq!(doc.id, 7);
        assert_eq!(loaded.snapshot.postings("rust").unwrap().get(7).unwrap().positions, vec![0, 4]);
    }

    #[test]
    fn version_mismatch_is_corrupt() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        save_index(&paths, &sample(), 8, AnalyzerConfig::default()).unwrap();
        let mut meta = load_meta(&paths).unwrap().unwrap();
        meta.version = 99;
        save_meta(&paths, &meta).unwrap();
        assert!(matches!(load_index(&paths), Err(EngineError::Corrupt(_))));
    }
}
