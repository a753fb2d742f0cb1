// src/pipeline.rs - Batch orchestration: dedup, persist merges, score, upsert
use anyhow::{Context, Result};
use indicatif::MultiProgress;
use log::info;
use std::time::Instant;
use uuid::Uuid;

use crate::matching::MergeResolver;
use crate::models::{DedupStats, PipelineReport, ScoringStats};
use crate::scoring::LeadScorer;
use crate::storage::OrganizationStore;
use crate::utils::progress_bars::logging::{Stage, StageLogger};
use crate::utils::progress_bars::progress_config::phase_bar;

/// Runs one full batch against `store`. Only load failures abort the run:
/// a failed merge commit or scoring upsert is counted and the batch moves on.
pub async fn run_pipeline(
    store: &dyn OrganizationStore,
    resolver: &MergeResolver,
    scorer: &LeadScorer,
    multi_progress: Option<&MultiProgress>,
) -> Result<PipelineReport> {
    let start = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    let mut report = PipelineReport {
        run_id: run_id.clone(),
        ..PipelineReport::default()
    };

    let dedup = deduplicate(store, resolver, multi_progress, &run_id, &mut report).await?;
    report.dedup = dedup;
    let scoring = score_organizations(store, scorer, multi_progress, &run_id, &mut report).await?;
    report.scoring = scoring;

    report.total_processing_time = start.elapsed().as_secs_f64();
    info!(
        "Pipeline run {} finished in {:.2}s: {} merge groups committed, {} organizations scored",
        run_id,
        report.total_processing_time,
        report.absorption.len(),
        report.scoring.organizations_scored
    );
    Ok(report)
}

async fn deduplicate(
    store: &dyn OrganizationStore,
    resolver: &MergeResolver,
    multi_progress: Option<&MultiProgress>,
    run_id: &str,
    report: &mut PipelineReport,
) -> Result<DedupStats> {
    let logger = StageLogger::new(Stage::Dedup);
    logger.log_start(run_id, &format!("{} similarity", resolver.backend_name()));

    let records = store
        .load_organizations()
        .await
        .context("Failed to load organizations for dedup")?;
    let mut stats = DedupStats {
        records_loaded: records.len(),
        ..DedupStats::default()
    };

    let outcome = resolver.resolve(records).await;
    stats.total_blocks = outcome.total_blocks;
    stats.candidate_blocks = outcome.candidate_blocks;
    stats.comparisons = outcome.comparisons;
    stats.merge_groups = outcome.merges.len();
    logger.log_blocking(stats.records_loaded, stats.total_blocks, stats.candidate_blocks);

    let persist_logger = StageLogger::new(Stage::Persist);
    let groups = format!("{} groups", outcome.merges.len());
    persist_logger.log_phase("Committing merge groups", Some(groups.as_str()));
    let pb = phase_bar(multi_progress, outcome.merges.len() as u64, "Committing merges");

    for group in &outcome.merges {
        let committed = match outcome.canonical_record(&group.primary_id) {
            Some(canonical) => store.commit_merge(group, canonical).await,
            None => Err(anyhow::anyhow!(
                "No canonical record produced for primary {}",
                group.primary_id
            )),
        };
        match committed {
            Ok(()) => {
                persist_logger.log_debug(&format!(
                    "Committed {} absorbed records into {}",
                    group.absorbed.len(),
                    group.primary_id
                ));
                stats.records_absorbed += group.absorbed.len();
                report
                    .absorption
                    .insert(group.primary_id.clone(), group.absorbed.clone());
            }
            Err(e) => {
                stats.commit_failures += 1;
                persist_logger.log_error(&format!(
                    "Merge into {} rolled back: {:#}",
                    group.primary_id, e
                ));
            }
        }
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = &pb {
        pb.finish_with_message("Merges committed");
    }

    stats.processing_time = logger.elapsed_secs();
    logger.log_completion(&format!(
        "{} records absorbed into {} organizations ({} commit failures)",
        stats.records_absorbed,
        report.absorption.len(),
        stats.commit_failures
    ));
    Ok(stats)
}

async fn score_organizations(
    store: &dyn OrganizationStore,
    scorer: &LeadScorer,
    multi_progress: Option<&MultiProgress>,
    run_id: &str,
    report: &mut PipelineReport,
) -> Result<ScoringStats> {
    let logger = StageLogger::new(Stage::Scoring);
    logger.log_start(run_id, "scoring surviving organizations");

    // Reload so failed merge commits are reflected exactly as stored.
    let organizations = store
        .load_organizations()
        .await
        .context("Failed to reload organizations for scoring")?;
    let mut stats = ScoringStats::default();
    let pb = phase_bar(multi_progress, organizations.len() as u64, "Scoring organizations");

    let mut score_sum = 0.0;
    for org in &organizations {
        let lead = scorer.score(org);
        if lead.degraded {
            stats.scoring_failures += 1;
        }
        if let Err(e) = store.upsert_lead_scoring(&lead.scoring).await {
            stats.upsert_failures += 1;
            logger.log_error(&format!("Upsert for {} rolled back: {:#}", org.id, e));
        }

        stats.organizations_scored += 1;
        stats.record_tier(lead.scoring.tier);
        score_sum += lead.scoring.propensity_score;
        report.scorings.push(lead.scoring);
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = &pb {
        pb.finish_with_message("Scoring complete");
    }

    if stats.organizations_scored > 0 {
        stats.avg_propensity_score = score_sum / stats.organizations_scored as f64;
    }
    if stats.scoring_failures > 0 {
        logger.log_warning(&format!(
            "{} organizations scored 0.0 after computation errors",
            stats.scoring_failures
        ));
    }
    stats.processing_time = logger.elapsed_secs();
    logger.log_completion(&format!(
        "{} organizations scored, tiers {:?}, average {:.1}",
        stats.organizations_scored, stats.tier_counts, stats.avg_propensity_score
    ));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{LexicalSimilarity, MergeGroup};
    use crate::models::{LeadScoring, OrganizationId, OrganizationRecord, RiskOverlay, Tier};
    use crate::storage::JsonFileStore;
    use crate::utils::pipeline_config::{DedupConfig, ScoringConfig};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn org(id: &str, name: &str, sector: &str, country: &str, minutes: i64) -> OrganizationRecord {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut org = OrganizationRecord::new(id, name, country, base + Duration::minutes(minutes));
        org.sector = sector.to_string();
        org
    }

    fn seed() -> Vec<OrganizationRecord> {
        let mut absorbed = org("calfire-2", "The Cal Fire", "Government", "USA", 5);
        absorbed.website = Some("https://www.fire.ca.gov".to_string());
        absorbed.risk_overlay = Some(RiskOverlay {
            exposure_score: Some(50.0),
            ..RiskOverlay::default()
        });
        vec![
            org("calfire-1", "Cal Fire", "Government", "USA", 0),
            absorbed,
            org("verein", "Waldbrand Verein", "Nonprofit", "Germany", 1),
        ]
    }

    fn engines() -> (MergeResolver, LeadScorer) {
        (
            MergeResolver::new(Arc::new(LexicalSimilarity), DedupConfig::default()),
            LeadScorer::new(ScoringConfig::default()),
        )
    }

    /// Delegates to a JSON store but fails commits or upserts for chosen ids.
    struct FlakyStore {
        inner: JsonFileStore,
        fail_commit_for: Option<OrganizationId>,
        fail_upsert_for: Option<OrganizationId>,
    }

    #[async_trait]
    impl OrganizationStore for FlakyStore {
        async fn load_organizations(&self) -> Result<Vec<OrganizationRecord>> {
            self.inner.load_organizations().await
        }

        async fn commit_merge(&self, group: &MergeGroup, canonical: &OrganizationRecord) -> Result<()> {
            if self.fail_commit_for.as_ref() == Some(&group.primary_id) {
                anyhow::bail!("simulated commit failure");
            }
            self.inner.commit_merge(group, canonical).await
        }

        async fn upsert_lead_scoring(&self, scoring: &LeadScoring) -> Result<()> {
            if self.fail_upsert_for.as_ref() == Some(&scoring.org_id) {
                anyhow::bail!("simulated upsert failure");
            }
            self.inner.upsert_lead_scoring(scoring).await
        }
    }

    #[tokio::test]
    async fn test_full_run_merges_then_scores_survivors() {
        let store = JsonFileStore::new("unused.json", seed());
        let (resolver, scorer) = engines();
        let report = run_pipeline(&store, &resolver, &scorer, None).await.unwrap();

        assert_eq!(report.dedup.records_loaded, 3);
        assert_eq!(report.dedup.merge_groups, 1);
        assert_eq!(report.dedup.records_absorbed, 1);
        assert_eq!(
            report.absorption.get(&OrganizationId::from("calfire-1")),
            Some(&vec![OrganizationId::from("calfire-2")])
        );

        assert_eq!(report.scoring.organizations_scored, 2);
        assert_eq!(report.scoring.tier_counts.get(&Tier::A), Some(&1));
        assert_eq!(report.scoring.tier_counts.get(&Tier::C), Some(&1));

        let records = store.snapshot().await;
        assert_eq!(records.len(), 2);
        let canonical = &records[0];
        assert_eq!(canonical.id.as_str(), "calfire-1");
        assert_eq!(canonical.website.as_deref(), Some("https://www.fire.ca.gov"));
        let scoring = canonical.lead_scoring.as_ref().unwrap();
        // 70 base + 20 adopted exposure + 4 priority country
        assert!((scoring.propensity_score - 94.0).abs() < 1e-9);
        assert_eq!(scoring.tier, Tier::A);
        assert_eq!(records[1].lead_scoring.as_ref().unwrap().propensity_score, 10.0);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_both_records_and_continues() {
        let store = FlakyStore {
            inner: JsonFileStore::new("unused.json", seed()),
            fail_commit_for: Some(OrganizationId::from("calfire-1")),
            fail_upsert_for: None,
        };
        let (resolver, scorer) = engines();
        let report = run_pipeline(&store, &resolver, &scorer, None).await.unwrap();

        assert_eq!(report.dedup.commit_failures, 1);
        assert_eq!(report.dedup.records_absorbed, 0);
        assert!(report.absorption.is_empty());
        // Nothing was merged in storage, so all three records are scored.
        assert_eq!(report.scoring.organizations_scored, 3);
        assert_eq!(store.inner.snapshot().await.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_upsert_is_counted_not_fatal() {
        let store = FlakyStore {
            inner: JsonFileStore::new("unused.json", seed()),
            fail_commit_for: None,
            fail_upsert_for: Some(OrganizationId::from("verein")),
        };
        let (resolver, scorer) = engines();
        let report = run_pipeline(&store, &resolver, &scorer, None).await.unwrap();

        assert_eq!(report.scoring.upsert_failures, 1);
        assert_eq!(report.scoring.organizations_scored, 2);
        let records = store.inner.snapshot().await;
        let verein = records.iter().find(|o| o.id.as_str() == "verein").unwrap();
        assert!(verein.lead_scoring.is_none());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = JsonFileStore::new("unused.json", Vec::new());
        let (resolver, scorer) = engines();
        let report = run_pipeline(&store, &resolver, &scorer, None).await.unwrap();
        assert_eq!(report.dedup.total_blocks, 0);
        assert_eq!(report.scoring.organizations_scored, 0);
        assert_eq!(report.scoring.avg_propensity_score, 0.0);
    }
}
