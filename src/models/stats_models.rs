// src/models/stats_models.rs
use serde::Serialize;
use std::collections::BTreeMap;

use super::core::{LeadScoring, OrganizationId, Tier};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupStats {
    pub records_loaded: usize,
    pub total_blocks: usize,
    /// Blocks with two or more records; singletons are never compared.
    pub candidate_blocks: usize,
    pub comparisons: usize,
    pub merge_groups: usize,
    pub records_absorbed: usize,
    pub commit_failures: usize,
    pub processing_time: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoringStats {
    pub organizations_scored: usize,
    /// Organizations whose score degraded to 0.0 after a computation error.
    pub scoring_failures: usize,
    pub upsert_failures: usize,
    pub tier_counts: BTreeMap<Tier, usize>,
    pub avg_propensity_score: f64,
    pub processing_time: f64,
}

impl ScoringStats {
    pub fn record_tier(&mut self, tier: Tier) {
        *self.tier_counts.entry(tier).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub dedup: DedupStats,
    pub scoring: ScoringStats,
    /// Canonical id -> absorbed ids, only for groups that were committed.
    pub absorption: BTreeMap<OrganizationId, Vec<OrganizationId>>,
    pub scorings: Vec<LeadScoring>,
    pub total_processing_time: f64,
}
