// src/matching/merge.rs - Single-pass, per-block merge resolution
use futures::stream::{self, StreamExt};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::matching::blocking::{blocking_key, Block, BlockingIndex};
use crate::matching::normalize::{canonical_website, normalize_name};
use crate::matching::similarity::SimilarityScorer;
use crate::models::core::is_blank;
use crate::models::{OrganizationId, OrganizationRecord};
use crate::utils::pipeline_config::DedupConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeReason {
    NameSimilarity(f64),
    WebsiteSimilarity(f64),
}

/// What one absorption contributed beyond contacts and programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeProvenance {
    pub absorbed_id: OrganizationId,
    pub took_risk_overlay: bool,
    pub took_lead_scoring: bool,
}

/// One committed unit of work for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroup {
    pub primary_id: OrganizationId,
    /// In the order the records were absorbed.
    pub absorbed: Vec<OrganizationId>,
    pub risk_overlay_from: Option<OrganizationId>,
    pub lead_scoring_from: Option<OrganizationId>,
}

impl MergeGroup {
    fn new(primary_id: OrganizationId) -> Self {
        Self {
            primary_id,
            absorbed: Vec::new(),
            risk_overlay_from: None,
            lead_scoring_from: None,
        }
    }

    fn record(&mut self, provenance: MergeProvenance) {
        if provenance.took_risk_overlay {
            self.risk_overlay_from = Some(provenance.absorbed_id.clone());
        }
        if provenance.took_lead_scoring {
            self.lead_scoring_from = Some(provenance.absorbed_id.clone());
        }
        self.absorbed.push(provenance.absorbed_id);
    }
}

#[derive(Debug, Clone)]
pub struct BlockResolution {
    /// The (possibly merged) primary first, then unmerged records in creation order.
    pub survivors: Vec<OrganizationRecord>,
    pub merge: Option<MergeGroup>,
    pub comparisons: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub canonical: Vec<OrganizationRecord>,
    pub merges: Vec<MergeGroup>,
    pub total_blocks: usize,
    pub candidate_blocks: usize,
    pub comparisons: usize,
}

impl DedupOutcome {
    pub fn absorption_map(&self) -> BTreeMap<OrganizationId, Vec<OrganizationId>> {
        self.merges
            .iter()
            .map(|g| (g.primary_id.clone(), g.absorbed.clone()))
            .collect()
    }

    pub fn absorbed_count(&self) -> usize {
        self.merges.iter().map(|g| g.absorbed.len()).sum()
    }

    pub fn canonical_record(&self, id: &OrganizationId) -> Option<&OrganizationRecord> {
        self.canonical.iter().find(|org| &org.id == id)
    }
}

fn fill_if_blank(target: &mut Option<String>, source: Option<String>) {
    if is_blank(target) && !is_blank(&source) {
        *target = source;
    }
}

/// Folds `secondary` into `primary`: children are reparented, the overlay and
/// lead scoring are adopted only when the primary has none, and singleton
/// fields are filled first-wins. A populated primary field is never overwritten.
pub fn merge_into(primary: &mut OrganizationRecord, secondary: OrganizationRecord) -> MergeProvenance {
    let OrganizationRecord {
        id: absorbed_id,
        role,
        website,
        region_state,
        size_band,
        latitude,
        longitude,
        notes,
        contacts,
        programs,
        risk_overlay,
        lead_scoring,
        ..
    } = secondary;

    primary.contacts.extend(contacts);
    primary.programs.extend(programs);

    let took_risk_overlay = primary.risk_overlay.is_none() && risk_overlay.is_some();
    if took_risk_overlay {
        primary.risk_overlay = risk_overlay;
    }

    let took_lead_scoring = primary.lead_scoring.is_none() && lead_scoring.is_some();
    if took_lead_scoring {
        primary.lead_scoring = lead_scoring.map(|mut scoring| {
            scoring.org_id = primary.id.clone();
            scoring
        });
    }

    fill_if_blank(&mut primary.role, role);
    fill_if_blank(&mut primary.website, website);
    fill_if_blank(&mut primary.region_state, region_state);
    fill_if_blank(&mut primary.size_band, size_band);
    fill_if_blank(&mut primary.notes, notes);

    let primary_has_coords = primary.latitude.is_some() && primary.longitude.is_some();
    if !primary_has_coords {
        if let (Some(lat), Some(lon)) = (latitude, longitude) {
            primary.latitude = Some(lat);
            primary.longitude = Some(lon);
        }
    }

    MergeProvenance {
        absorbed_id,
        took_risk_overlay,
        took_lead_scoring,
    }
}

pub struct MergeResolver {
    scorer: Arc<dyn SimilarityScorer>,
    config: DedupConfig,
}

impl MergeResolver {
    pub fn new(scorer: Arc<dyn SimilarityScorer>, config: DedupConfig) -> Self {
        Self { scorer, config }
    }

    pub fn backend_name(&self) -> &str {
        self.scorer.backend_name()
    }

    pub async fn merge_reason(
        &self,
        primary: &OrganizationRecord,
        candidate: &OrganizationRecord,
    ) -> Option<MergeReason> {
        if blocking_key(primary) != blocking_key(candidate) {
            return None;
        }

        let name_sim = self
            .scorer
            .similarity(&normalize_name(&primary.name), &normalize_name(&candidate.name))
            .await;
        if name_sim > self.config.name_similarity_threshold {
            return Some(MergeReason::NameSimilarity(name_sim));
        }

        if let (Some(w1), Some(w2)) = (primary.website_value(), candidate.website_value()) {
            let website_sim = self
                .scorer
                .similarity(&canonical_website(w1), &canonical_website(w2))
                .await;
            if website_sim > self.config.website_similarity_threshold {
                return Some(MergeReason::WebsiteSimilarity(website_sim));
            }
        }
        None
    }

    pub async fn should_merge(&self, primary: &OrganizationRecord, candidate: &OrganizationRecord) -> bool {
        self.merge_reason(primary, candidate).await.is_some()
    }

    /// Walks the block oldest-first. Each later record is compared only
    /// against the running primary, which accumulates fields as records are
    /// absorbed. Candidates are never compared with each other, so a record
    /// that resembles an absorbed record but not the accumulated primary stays
    /// separate.
    pub async fn resolve_block(&self, block: Block) -> BlockResolution {
        let mut members = block.members;
        if members.len() < 2 {
            return BlockResolution {
                survivors: members,
                merge: None,
                comparisons: 0,
            };
        }
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut records = members.into_iter();
        let mut primary = match records.next() {
            Some(first) => first,
            None => {
                return BlockResolution {
                    survivors: Vec::new(),
                    merge: None,
                    comparisons: 0,
                }
            }
        };

        let mut group = MergeGroup::new(primary.id.clone());
        let mut unmerged = Vec::new();
        let mut comparisons = 0;

        for candidate in records {
            comparisons += 1;
            match self.merge_reason(&primary, &candidate).await {
                Some(reason) => {
                    debug!(
                        "Merging '{}' ({}) into '{}' ({}): {:?}",
                        candidate.name, candidate.id, primary.name, primary.id, reason
                    );
                    let provenance = merge_into(&mut primary, candidate);
                    group.record(provenance);
                }
                None => unmerged.push(candidate),
            }
        }

        let mut survivors = Vec::with_capacity(unmerged.len() + 1);
        survivors.push(primary);
        survivors.extend(unmerged);

        BlockResolution {
            survivors,
            merge: if group.absorbed.is_empty() { None } else { Some(group) },
            comparisons,
        }
    }

    /// Partitions `records` by blocking key and resolves every block. Pure with
    /// respect to storage: persisting the outcome is the caller's job.
    pub async fn resolve(&self, records: Vec<OrganizationRecord>) -> DedupOutcome {
        let index = BlockingIndex::build(records);
        let total_blocks = index.len();
        let candidate_blocks = index.candidate_block_count();
        info!(
            "Resolving {} blocks ({} need comparison) with {} similarity",
            total_blocks,
            candidate_blocks,
            self.scorer.backend_name()
        );

        let resolutions: Vec<BlockResolution> = stream::iter(index.into_blocks())
            .map(|block| self.resolve_block(block))
            .buffered(self.config.max_concurrent_blocks.max(1))
            .collect()
            .await;

        let mut outcome = DedupOutcome {
            total_blocks,
            candidate_blocks,
            ..DedupOutcome::default()
        };
        for resolution in resolutions {
            outcome.comparisons += resolution.comparisons;
            outcome.canonical.extend(resolution.survivors);
            if let Some(group) = resolution.merge {
                outcome.merges.push(group);
            }
        }
        outcome
    }
}
