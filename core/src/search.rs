use crate::error::QueryError;
use crate::index::{DocId, PostingList, Snapshot};
use crate::query::{parse, Query};
use crate::tokenizer::Analyzer;
use htmlescape::encode_minimal;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(skip)]
    pub doc_id: DocId,
    pub path: PathBuf,
    pub score: f32,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub total_hits: usize,
    pub results: Vec<SearchResult>,
}

/// Matching documents with their accumulated scores.
type Hits = BTreeMap<DocId, f32>;

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine {
    analyzer: Analyzer,
}

impl QueryEngine {
    /// `analyzer` must be the one the snapshot's documents were indexed with.
    pub fn new(analyzer: Analyzer) -> Self { Self { analyzer } }

    /// Every matching document, best first; equal scores order by doc id.
    pub fn search(&self, query_text: &str, snapshot: &Snapshot) -> Result<Vec<SearchResult>, QueryError> {
        let query = parse(query_text)?;
        let hits = self.eval(&query, snapshot).unwrap_or_default();

        let mut scored: Vec<(DocId, f32)> = hits.into_iter().collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let highlighter = Highlighter::new(&query.positive_texts());
        let results = scored
            .into_iter()
            .filter_map(|(doc_id, score)| {
                let doc = snapshot.document(doc_id)?;
                Some(SearchResult { doc_id, path: doc.path.clone(), score, snippet: highlighter.snippet(&doc.content) })
            })
            .collect();
        Ok(results)
    }

    pub fn search_limit(&self, query_text: &str, snapshot: &Snapshot, limit: usize) -> Result<SearchResults, QueryError> {
        let mut results = self.search(query_text, snapshot)?;
        let total_hits = results.len();
        results.truncate(limit);
        Ok(SearchResults { query: query_text.to_string(), total_hits, results })
    }

    /// `None` means the clause analyzed to nothing and does not constrain the match.
    fn eval(&self, query: &Query, snap: &Snapshot) -> Option<Hits> {
        match query {
            Query::Term(text) | Query::Phrase(text) => {
                let tokens = self.analyzer.analyze(text);
                match tokens.len() {
                    0 => None,
                    1 => Some(term_hits(snap, &tokens[0].0)),
                    _ => Some(phrase_hits(snap, &tokens)),
                }
            }
            Query::And(clauses) => {
                let mut acc: Option<Hits> = None;
                for clause in clauses {
                    acc = match (acc, self.eval(clause, snap)) {
                        (Some(a), Some(b)) => Some(intersect(a, &b)),
                        (one, other) => one.or(other),
                    };
                }
                acc
            }
            Query::Or(clauses) => {
                let mut acc: Option<Hits> = None;
                for clause in clauses {
                    acc = match (acc, self.eval(clause, snap)) {
                        (Some(a), Some(b)) => Some(union(a, b)),
                        (one, other) => one.or(other),
                    };
                }
                acc
            }
            Query::Not(inner) => {
                let excluded = self.eval(inner, snap)?;
                Some(snap.all_doc_ids().into_iter().filter(|id| !excluded.contains_key(id)).map(|id| (id, 0.0)).collect())
            }
        }
    }
}

fn idf(snap: &Snapshot, list: &PostingList) -> f32 {
    let n = snap.document_count().max(1) as f32;
    let df = list.doc_freq().max(1) as f32;
    (1.0 + n / df).ln()
}

fn tf_weight(tf: u32) -> f32 {
    if tf > 0 { 1.0 + (tf as f32).ln() } else { 0.0 }
}

fn term_hits(snap: &Snapshot, term: &str) -> Hits {
    let Some(list) = snap.postings(term) else { return Hits::new() };
    let idf = idf(snap, list);
    list.postings.iter().map(|p| (p.doc_id, tf_weight(p.term_freq()) * idf)).collect()
}

/// Documents where the tokens occur at the same relative positions as in
/// the query text.
fn phrase_hits(snap: &Snapshot, tokens: &[(String, u32)]) -> Hits {
    let mut lists = Vec::with_capacity(tokens.len());
    for (term, _) in tokens {
        match snap.postings(term) {
            Some(list) => lists.push(list),
            None => return Hits::new(),
        }
    }
    let base = tokens[0].1;
    let offsets: Vec<u32> = tokens.iter().map(|(_, p)| p - base).collect();
    let idf_sum: f32 = lists.iter().map(|l| idf(snap, l)).sum();

    let mut hits = Hits::new();
    for first in &lists[0].postings {
        let others: Option<Vec<&[u32]>> =
            lists[1..].iter().map(|l| l.get(first.doc_id).map(|p| p.positions.as_slice())).collect();
        let Some(others) = others else { continue };
        let occurrences = first
            .positions
            .iter()
            .filter(|&&start| {
                others.iter().zip(&offsets[1..]).all(|(positions, off)| positions.binary_search(&(start + off)).is_ok())
            })
            .count() as u32;
        if occurrences > 0 {
            hits.insert(first.doc_id, tf_weight(occurrences) * idf_sum);
        }
    }
    hits
}

fn intersect(a: Hits, b: &Hits) -> Hits {
    a.into_iter().filter_map(|(id, s)| b.get(&id).map(|t| (id, s + t))).collect()
}

fn union(mut a: Hits, b: Hits) -> Hits {
    for (id, s) in b {
        *a.entry(id).or_insert(0.0) += s;
    }
    a
}

/// Builds snippets around the first match of any positive query text.
/// Document text is HTML-escaped; only the `<em>` tags are markup.
struct Highlighter {
    pattern: Option<Regex>,
}

impl Highlighter {
    fn new(texts: &[&str]) -> Self {
        let mut alternatives: Vec<String> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.split_whitespace().map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
            .collect();
        alternatives.sort();
        alternatives.dedup();
        let pattern = if alternatives.is_empty() {
            None
        } else {
            RegexBuilder::new(&alternatives.join("|")).case_insensitive(true).build().ok()
        };
        Self { pattern }
    }

    fn snippet(&self, text: &str) -> Option<String> {
        if text.is_empty() { return None; }
        let first = self.pattern.as_ref().and_then(|re| re.find(text)).map(|m| m.start());
        let window = match first {
            Some(idx) => {
                let start = floor_boundary(text, idx.saturating_sub(SNIPPET_BEFORE));
                let end = ceil_boundary(text, (idx + SNIPPET_AFTER).min(text.len()));
                &text[start..end]
            }
            None => {
                let end = text.char_indices().nth(SNIPPET_AFTER).map(|(i, _)| i).unwrap_or(text.len());
                &text[..end]
            }
        };
        let Some(re) = &self.pattern else { return Some(encode_minimal(window)) };
        let mut out = String::with_capacity(window.len() + 32);
        let mut last = 0;
        for m in re.find_iter(window) {
            out.push_str(&encode_minimal(&window[last..m.start()]));
            out.push_str("<em>");
            out.push_str(&encode_minimal(m.as_str()));
            out.push_str("</em>");
            last = m.end();
        }
        out.push_str(&encode_minimal(&window[last..]));
        Some(out)
    }
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) { i -= 1; }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) { i += 1; }
    i
}
