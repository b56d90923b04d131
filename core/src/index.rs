use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type DocId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub path: PathBuf,
    pub content: String,
    /// Seconds since the Unix epoch.
    pub modified: u64,
    /// Distinct terms of this document, used to retire its postings on replace.
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub positions: Vec<u32>, // ascending
}

impl Posting {
    pub fn term_freq(&self) -> u32 { self.positions.len() as u32 }
}

/// Postings for one term, sorted by doc_id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingList {
    pub postings: Vec<Posting>,
}

impl PostingList {
    pub fn doc_freq(&self) -> usize { self.postings.len() }

    pub fn get(&self, doc_id: DocId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|i| &self.postings[i])
    }

    pub(crate) fn insert(&mut self, posting: Posting) {
        match self.postings.binary_search_by_key(&posting.doc_id, |p| p.doc_id) {
            Ok(i) => self.postings[i] = posting,
            Err(i) => self.postings.insert(i, posting),
        }
    }

    pub(crate) fn remove(&mut self, doc_id: DocId) {
        if let Ok(i) = self.postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
            self.postings.remove(i);
        }
    }
}

/// Immutable view of the index at one commit. Cloning the maps only copies
/// `Arc` pointers, so the writer builds the next snapshot copy-on-write.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub(crate) generation: u64,
    pub(crate) docs: HashMap<DocId, Arc<Document>>,
    pub(crate) by_path: HashMap<PathBuf, DocId>,
    pub(crate) postings: HashMap<String, Arc<PostingList>>,
}

impl Snapshot {
    pub(crate) fn empty(generation: u64) -> Self {
        Self { generation, ..Self::default() }
    }

    pub fn generation(&self) -> u64 { self.generation }

    pub fn document_count(&self) -> usize { self.docs.len() }

    pub fn term_count(&self) -> usize { self.postings.len() }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.docs.get(&id).map(|d| d.as_ref())
    }

    pub fn document_by_path(&self, path: &Path) -> Option<&Document> {
        self.by_path.get(path).and_then(|id| self.document(*id))
    }

    pub fn postings(&self, term: &str) -> Option<&PostingList> {
        self.postings.get(term).map(|p| p.as_ref())
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values().map(|d| d.as_ref())
    }

    /// All live document ids, ascending.
    pub fn all_doc_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.docs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn insert_document(&mut self, doc: Document, term_positions: HashMap<String, Vec<u32>>) {
        if let Some(old) = self.by_path.get(&doc.path).copied() {
            self.remove_document(old);
        }
        for (term, positions) in term_positions {
            let list = self.postings.entry(term).or_default();
            Arc::make_mut(list).insert(Posting { doc_id: doc.id, positions });
        }
        self.by_path.insert(doc.path.clone(), doc.id);
        self.docs.insert(doc.id, Arc::new(doc));
    }

    pub(crate) fn remove_document(&mut self, id: DocId) -> bool {
        let doc = match self.docs.remove(&id) {
            Some(doc) => doc,
            None => return false,
        };
        self.by_path.remove(&doc.path);
        for term in &doc.terms {
            if let Some(list) = self.postings.get_mut(term) {
                Arc::make_mut(list).remove(id);
                if list.postings.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        true
    }
}
