use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sift_core::{Engine, EngineConfig, IndexEvent};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sift-indexer")]
#[command(about = "Build and manage a full-text index of a folder", long_about = None)]
struct Cli {
    /// Index directory
    #[arg(long, global = true, default_value = "./index")]
    index: PathBuf,
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every readable text file under a folder
    Build {
        /// Folder to index
        #[arg(long)]
        input: PathBuf,
        /// Print every indexed file, not just skips and commits
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },
    /// Print document count and generation
    Stats,
    /// Remove every document from the index
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let engine = Engine::open(config.with_index_dir(&cli.index))?;

    match cli.command {
        Commands::Build { input, verbose } => build(&engine, input, verbose).await,
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.status())?);
            Ok(())
        }
        Commands::Clear => {
            engine.clear_all()?;
            tracing::info!(index = %cli.index.display(), "index cleared");
            Ok(())
        }
    }
}

async fn build(engine: &std::sync::Arc<Engine>, input: PathBuf, verbose: bool) -> Result<()> {
    let mut job = engine.start_indexing(&input)?;
    while let Some(event) = job.events.recv().await {
        match event {
            IndexEvent::Started { root, files } => eprintln!("indexing {} ({files} candidate files)", root.display()),
            IndexEvent::Indexed { path, doc_id } if verbose => eprintln!("  [{doc_id}] {}", path.display()),
            IndexEvent::Indexed { .. } => {}
            IndexEvent::Skipped(skip) => eprintln!("  skipped {}: {}", skip.path.display(), skip.reason),
            IndexEvent::Committed { documents, .. } => eprintln!("  committed, {documents} documents"),
            IndexEvent::Finished(_) => {}
        }
    }
    let summary = job.wait().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if let Some(err) = summary.error {
        bail!("indexing failed: {err}");
    }
    Ok(())
}
