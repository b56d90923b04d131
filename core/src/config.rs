use crate::error::Result;
use crate::tokenizer::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Directory names pruned from the walk wherever they appear.
    pub skip_dirs: Vec<String>,
    /// Lowercase extensions (without the dot) eligible for indexing. `None` indexes every file.
    pub extensions: Option<Vec<String>>,
    pub max_file_size: u64,
    /// Files per commit.
    pub batch_size: usize,
    pub follow_links: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        let skip_dirs = [".git", ".svn", ".hg", "node_modules", "target", ".idea", ".vscode", "__pycache__"];
        Self {
            skip_dirs: skip_dirs.iter().map(|s| s.to_string()).collect(),
            extensions: None,
            max_file_size: 10 * 1024 * 1024,
            batch_size: 64,
            follow_links: false,
        }
    }
}

impl IndexerConfig {
    pub fn is_skipped_dir(&self, name: &str) -> bool {
        self.skip_dirs.iter().any(|d| d == name)
    }

    pub fn is_indexable(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else { return true };
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .map(|e| allowed.iter().any(|a| *a == e))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the index is persisted. `None` keeps it in memory only.
    pub index_dir: Option<PathBuf>,
    pub analyzer: AnalyzerConfig,
    pub indexer: IndexerConfig,
    /// Folders offered to clients as indexing candidates.
    pub folder_suggestions: Vec<PathBuf>,
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let buf = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&buf)?)
    }

    pub fn with_index_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.index_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"indexer": {"batch_size": 8, "extensions": null}}"#).unwrap();
        assert_eq!(cfg.indexer.batch_size, 8);
        assert!(cfg.indexer.extensions.is_none());
        assert!(cfg.indexer.is_skipped_dir("node_modules"));
        assert!(cfg.analyzer.stem);
        assert!(cfg.index_dir.is_none());
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(IndexerConfig::default().is_indexable(Path::new("Makefile")));

        let cfg = IndexerConfig { extensions: Some(vec!["java".into(), "txt".into()]), ..IndexerConfig::default() };
        assert!(cfg.is_indexable(Path::new("src/Main.JAVA")));
        assert!(!cfg.is_indexable(Path::new("image.png")));
        assert!(!cfg.is_indexable(Path::new("Makefile")));
    }
}
