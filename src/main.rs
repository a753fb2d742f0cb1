// src/main.rs
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use leads_lib::matching::{build_similarity_scorer, MergeResolver};
use leads_lib::pipeline::run_pipeline;
use leads_lib::scoring::LeadScorer;
use leads_lib::storage::PgOrganizationStore;
use leads_lib::utils::db_connect::{connect, get_pool_status};
use leads_lib::utils::env::load_env;
use leads_lib::utils::pipeline_config::PipelineConfig;
use leads_lib::utils::progress_bars::progress_config::ProgressConfig;
use log::info;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting wildfire lead dedup and scoring pipeline");
    load_env();

    // Configuration errors are the only fatal errors once the batch starts.
    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    config.log_config();

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();
    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Connecting to database...");
        pb
    });

    let pool = connect().await.context("Failed to connect to database")?;
    info!("Successfully connected to the database");

    let similarity = build_similarity_scorer(&config.similarity);
    let resolver = MergeResolver::new(similarity, config.dedup.clone());
    let scorer = LeadScorer::new(config.scoring.clone());
    let store = PgOrganizationStore::new(pool.clone());

    if let Some(pb) = &main_pb {
        pb.set_message("Running dedup and scoring...");
    }
    let start = Instant::now();
    let detail_progress = if progress_config.should_show_detailed() {
        multi_progress.as_ref()
    } else {
        None
    };
    let report = run_pipeline(&store, &resolver, &scorer, detail_progress).await?;

    if let Some(pb) = &main_pb {
        pb.finish_with_message("Pipeline complete");
    }

    let (connections, idle) = get_pool_status(&pool);
    info!("DB pool at exit: {} connections ({} idle)", connections, idle);
    info!("Run {} summary:", report.run_id);
    info!(
        "  Dedup: {} records, {} blocks ({} compared), {} comparisons, {} absorbed, {} commit failures",
        report.dedup.records_loaded,
        report.dedup.total_blocks,
        report.dedup.candidate_blocks,
        report.dedup.comparisons,
        report.dedup.records_absorbed,
        report.dedup.commit_failures
    );
    info!(
        "  Scoring: {} organizations, tiers {:?}, average {:.1}, {} scoring failures, {} upsert failures",
        report.scoring.organizations_scored,
        report.scoring.tier_counts,
        report.scoring.avg_propensity_score,
        report.scoring.scoring_failures,
        report.scoring.upsert_failures
    );
    info!("Total elapsed: {:.2?}", start.elapsed());
    Ok(())
}
