// src/bin/offline_run.rs
//
// Runs dedup and scoring against a JSON array of organization records instead
// of Postgres, and writes the run report (absorption map, scorings, stats).

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use leads_lib::matching::{build_similarity_scorer, MergeResolver};
use leads_lib::pipeline::run_pipeline;
use leads_lib::scoring::LeadScorer;
use leads_lib::storage::JsonFileStore;
use leads_lib::utils::env::load_env;
use leads_lib::utils::pipeline_config::{PipelineConfig, SimilarityBackend};
use leads_lib::utils::progress_bars::progress_config::ProgressConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct OfflineArgs {
    /// JSON file containing an array of organization records
    #[arg(long)]
    input: PathBuf,

    /// Where to write the run report
    #[arg(long)]
    output: PathBuf,

    /// JSON pipeline config; environment variables are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the surviving, scored organizations here
    #[arg(long)]
    canonical_output: Option<PathBuf>,

    /// Override the configured similarity backend (lexical, local_embedding, remote)
    #[arg(long)]
    backend: Option<SimilarityBackend>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = OfflineArgs::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::from_env().context("Invalid pipeline configuration")?,
    };
    if let Some(backend) = args.backend {
        config.similarity.backend = backend;
        config.validate()?;
    }
    config.log_config();

    let store = JsonFileStore::open(&args.input).await?;
    let resolver = MergeResolver::new(build_similarity_scorer(&config.similarity), config.dedup.clone());
    let scorer = LeadScorer::new(config.scoring.clone());

    let progress_config = ProgressConfig::from_env();
    let multi_progress = progress_config.create_multi_progress();
    let report = run_pipeline(&store, &resolver, &scorer, multi_progress.as_ref()).await?;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
    tokio::fs::write(&args.output, json)
        .await
        .with_context(|| format!("Failed to write report to {}", args.output.display()))?;
    info!("Wrote run report to {}", args.output.display());

    if let Some(path) = &args.canonical_output {
        store.save_to(path).await?;
        info!("Wrote canonical organizations to {}", path.display());
    }
    Ok(())
}
