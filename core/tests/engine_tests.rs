use sift_core::{Engine, EngineConfig, EngineError, IndexEvent, IndexerConfig, QueryEngine};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn config() -> EngineConfig {
    EngineConfig {
        indexer: IndexerConfig { extensions: None, batch_size: 2, ..IndexerConfig::default() },
        ..EngineConfig::default()
    }
}

fn write_files(dir: &Path, files: &[(&str, &str)]) {
    for (name, body) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }
}

fn file_names(engine: &Engine, query: &str) -> Vec<String> {
    engine
        .search(query)
        .unwrap()
        .into_iter()
        .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn indexing_a_folder_makes_every_file_searchable() {
    let dir = tempdir().unwrap();
    let files: Vec<(String, String)> = (0..7).map(|i| (format!("dir{}/file{i}.txt", i % 3), format!("common uniqueterm{i}"))).collect();
    let borrowed: Vec<(&str, &str)> = files.iter().map(|(n, b)| (n.as_str(), b.as_str())).collect();
    write_files(dir.path(), &borrowed);

    let engine = Engine::open(config()).unwrap();
    let summary = engine.start_indexing(dir.path()).unwrap().wait().await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.indexed, 7);
    assert_eq!(engine.document_count(), 7);
    assert!(engine.currently_indexing().is_none());
    for i in 0..7 {
        assert_eq!(file_names(&engine, &format!("uniqueterm{i}")), vec![format!("file{i}.txt")]);
    }
    assert_eq!(engine.search("common").unwrap().len(), 7);
}

#[tokio::test]
async fn const_or_bar_example() {
    let dir = tempdir().unwrap();
    write_files(dir.path(), &[("a.txt", "const foo"), ("b.txt", "var bar")]);
    let engine = Engine::open(config()).unwrap();
    engine.start_indexing(dir.path()).unwrap().wait().await.unwrap();

    assert_eq!(file_names(&engine, "const"), vec!["a.txt"]);
    let results = engine.search("const OR bar").unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn phrase_versus_implicit_and() {
    let dir = tempdir().unwrap();
    write_files(dir.path(), &[("a.txt", "let value = compute()"), ("b.txt", "compute the value later")]);
    let engine = Engine::open(config()).unwrap();
    engine.start_indexing(dir.path()).unwrap().wait().await.unwrap();

    assert_eq!(file_names(&engine, "\"value compute\""), vec!["a.txt"]);
    let mut both = file_names(&engine, "compute value");
    both.sort();
    assert_eq!(both, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn empty_or_malformed_queries_fail() {
    let engine = Engine::open(config()).unwrap();
    for q in ["", "   ", "(unclosed", "\"open"] {
        assert!(matches!(engine.search(q), Err(EngineError::Query(_))), "query {q:?}");
    }
}

#[tokio::test(flavor = "current_thread")]
async fn second_start_is_rejected_while_indexing() {
    let dir = tempdir().unwrap();
    write_files(dir.path(), &[("a.txt", "alpha"), ("b.txt", "beta")]);
    let engine = Engine::open(config()).unwrap();

    let job = engine.start_indexing(dir.path()).unwrap();
    let before = engine.currently_indexing();
    assert!(before.is_some());

    let err = engine.start_indexing(dir.path()).err().unwrap();
    assert!(matches!(err, EngineError::AlreadyIndexing { .. }));
    assert_eq!(engine.currently_indexing(), before);
    assert_eq!(engine.document_count(), 0);

    job.wait().await.unwrap();
    assert!(engine.currently_indexing().is_none());
    assert_eq!(engine.document_count(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn clear_during_indexing_discards_the_run() {
    let dir = tempdir().unwrap();
    write_files(dir.path(), &[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")]);
    let engine = Engine::open(config()).unwrap();

    let job = engine.start_indexing(dir.path()).unwrap();
    engine.clear_all().unwrap();
    assert!(engine.currently_indexing().is_none());

    let summary = job.wait().await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(engine.document_count(), 0);
    assert!(engine.search("alpha").unwrap().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn cancelled_job_does_not_disturb_the_next_one() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    write_files(first.path(), &[("old.txt", "stale")]);
    write_files(second.path(), &[("new.txt", "fresh")]);
    let engine = Engine::open(config()).unwrap();

    let old_job = engine.start_indexing(first.path()).unwrap();
    engine.clear_all().unwrap();
    let new_job = engine.start_indexing(second.path()).unwrap();

    assert!(old_job.wait().await.unwrap().cancelled);
    assert!(new_job.wait().await.unwrap().is_success());
    assert_eq!(engine.document_count(), 1);
    assert!(engine.search("stale").unwrap().is_empty());
    assert_eq!(file_names(&engine, "fresh"), vec!["new.txt"]);
}

#[tokio::test]
async fn clear_when_idle_empties_the_index() {
    let dir = tempdir().unwrap();
    write_files(dir.path(), &[("a.txt", "alpha")]);
    let engine = Engine::open(config()).unwrap();
    engine.start_indexing(dir.path()).unwrap().wait().await.unwrap();
    assert_eq!(engine.document_count(), 1);

    let generation = engine.status().generation;
    engine.clear_all().unwrap();
    assert_eq!(engine.document_count(), 0);
    assert!(engine.status().generation > generation);
}

#[tokio::test]
async fn events_end_with_summary_and_skips_are_reported() {
    let dir = tempdir().unwrap();
    write_files(dir.path(), &[("a.txt", "alpha")]);
    fs::write(dir.path().join("blob.dat"), [0u8, 159, 146, 150]).unwrap();
    let engine = Engine::open(config()).unwrap();

    let mut job = engine.start_indexing(dir.path()).unwrap();
    let mut events = Vec::new();
    while let Some(event) = job.events.recv().await {
        events.push(event);
    }
    let summary = job.wait().await.unwrap();

    assert!(matches!(events.first(), Some(IndexEvent::Started { files: 2, .. })));
    assert!(matches!(events.last(), Some(IndexEvent::Finished(_))));
    assert!(events.iter().any(|e| matches!(e, IndexEvent::Skipped(s) if s.path.ends_with("blob.dat"))));
    assert_eq!(summary.indexed, 1);
    assert_eq!(summary.skipped.len(), 1);
}

#[tokio::test]
async fn reopened_index_keeps_its_documents() {
    let folder = tempdir().unwrap();
    let index = tempdir().unwrap();
    write_files(folder.path(), &[("a.txt", "persisted alpha"), ("b.txt", "persisted beta")]);

    {
        let engine = Engine::open(config().with_index_dir(index.path())).unwrap();
        engine.start_indexing(folder.path()).unwrap().wait().await.unwrap();
        assert_eq!(engine.document_count(), 2);
    }

    let engine: Arc<Engine> = Engine::open(config().with_index_dir(index.path())).unwrap();
    assert_eq!(engine.document_count(), 2);
    assert_eq!(file_names(&engine, "beta"), vec!["b.txt"]);
    let text = engine.read_indexed_file(folder.path().join("a.txt")).unwrap();
    assert_eq!(text, "persisted alpha");
}

#[tokio::test]
async fn reindexing_replaces_documents_instead_of_duplicating() {
    let dir = tempdir().unwrap();
    write_files(dir.path(), &[("a.txt", "before")]);
    let engine = Engine::open(config()).unwrap();
    engine.start_indexing(dir.path()).unwrap().wait().await.unwrap();

    write_files(dir.path(), &[("a.txt", "after")]);
    engine.start_indexing(dir.path()).unwrap().wait().await.unwrap();

    assert_eq!(engine.document_count(), 1);
    assert!(engine.search("before").unwrap().is_empty());
    assert_eq!(file_names(&engine, "after"), vec!["a.txt"]);
}

#[tokio::test(flavor = "current_thread")]
async fn progress_moves_through_files_and_searches_see_whole_batches() {
    let dir = tempdir().unwrap();
    let files: Vec<(String, String)> = (0..200).map(|i| (format!("f{i:03}.txt"), format!("common word{i}"))).collect();
    let borrowed: Vec<(&str, &str)> = files.iter().map(|(n, b)| (n.as_str(), b.as_str())).collect();
    write_files(dir.path(), &borrowed);
    let config = EngineConfig {
        indexer: IndexerConfig { extensions: None, batch_size: 1, ..IndexerConfig::default() },
        ..EngineConfig::default()
    };
    let engine = Engine::open(config).unwrap();

    let job = engine.start_indexing(dir.path()).unwrap();
    let root = job.root.clone();
    let mut progress = engine.subscribe_progress();
    let watcher = Arc::clone(&engine);
    let monitor = tokio::spawn(async move {
        let query_engine = QueryEngine::new(*watcher.store().analyzer());
        let mut polled = Vec::new();
        let mut counts = Vec::new();
        loop {
            let Some(current) = progress.borrow_and_update().clone() else { break };
            if let Some(path) = watcher.currently_indexing() {
                polled.push(path);
            }
            polled.push(current);
            let snapshot = watcher.current_snapshot();
            let hits = query_engine.search("common", &snapshot).unwrap();
            assert_eq!(hits.len(), snapshot.document_count());
            counts.push(snapshot.document_count());
            if progress.changed().await.is_err() {
                break;
            }
        }
        (polled, counts)
    });

    let summary = job.wait().await.unwrap();
    let (polled, counts) = monitor.await.unwrap();

    assert_eq!(summary.indexed, 200);
    assert!(polled.iter().any(|p| *p != root && p.starts_with(&root)), "no file path observed");
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(engine.document_count(), 200);
    assert!(engine.currently_indexing().is_none());
}
