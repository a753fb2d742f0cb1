// src/storage/json_file.rs - Organization store over a JSON hand-off file
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::matching::MergeGroup;
use crate::models::{LeadScoring, OrganizationRecord};
use crate::storage::OrganizationStore;

/// Holds the records in memory; `save` writes them back as a JSON array.
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<Vec<OrganizationRecord>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, records: Vec<OrganizationRecord>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(records),
        }
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read organizations from {}", path.display()))?;
        let records: Vec<OrganizationRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse organizations in {}", path.display()))?;
        info!("Loaded {} organizations from {}", records.len(), path.display());
        Ok(Self::new(path, records))
    }

    pub async fn snapshot(&self) -> Vec<OrganizationRecord> {
        self.records.lock().await.clone()
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&self.path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let records = self.records.lock().await;
        let json = serde_json::to_string_pretty(&*records).context("Failed to serialize organizations")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write organizations to {}", path.display()))?;
        debug!("Wrote {} organizations to {}", records.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl OrganizationStore for JsonFileStore {
    async fn load_organizations(&self) -> Result<Vec<OrganizationRecord>> {
        Ok(self.snapshot().await)
    }

    async fn commit_merge(&self, group: &MergeGroup, canonical: &OrganizationRecord) -> Result<()> {
        if canonical.id != group.primary_id {
            bail!(
                "Canonical record {} does not match merge primary {}",
                canonical.id,
                group.primary_id
            );
        }

        let mut records = self.records.lock().await;
        // Validate everything before touching the records so a failed merge leaves them unchanged.
        let primary_idx = records
            .iter()
            .position(|org| org.id == group.primary_id)
            .with_context(|| format!("Primary organization {} not found", group.primary_id))?;
        for absorbed in &group.absorbed {
            if !records.iter().any(|org| &org.id == absorbed) {
                bail!("Absorbed organization {} not found", absorbed);
            }
        }

        records[primary_idx] = canonical.clone();
        records.retain(|org| !group.absorbed.contains(&org.id));
        Ok(())
    }

    async fn upsert_lead_scoring(&self, scoring: &LeadScoring) -> Result<()> {
        let mut records = self.records.lock().await;
        let org = records
            .iter_mut()
            .find(|org| org.id == scoring.org_id)
            .with_context(|| format!("Cannot score unknown organization {}", scoring.org_id))?;

        match org.lead_scoring.as_mut() {
            Some(existing) => {
                existing.propensity_score = scoring.propensity_score;
                existing.tier = scoring.tier;
                existing.rationale = scoring.rationale.clone();
            }
            None => org.lead_scoring = Some(scoring.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrganizationId, ReviewerStatus, Tier};
    use chrono::Utc;

    fn org(id: &str, name: &str) -> OrganizationRecord {
        OrganizationRecord::new(id, name, "USA", Utc::now())
    }

    fn scoring(id: &str, score: f64, tier: Tier) -> LeadScoring {
        LeadScoring {
            org_id: OrganizationId::from(id),
            propensity_score: score,
            tier,
            rationale: format!("score {}", score),
            reviewer_status: ReviewerStatus::Pending,
            reviewer_notes: None,
        }
    }

    #[tokio::test]
    async fn test_open_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orgs.json");
        let store = JsonFileStore::new(&path, vec![org("1", "Cal Fire"), org("2", "Red Cross")]);
        store.save().await.unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let records = reopened.load_organizations().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "Red Cross");
    }

    #[tokio::test]
    async fn test_open_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_commit_merge_replaces_primary_and_drops_absorbed() {
        let store = JsonFileStore::new("unused.json", vec![org("1", "Cal Fire"), org("2", "The Cal Fire")]);
        let mut canonical = org("1", "Cal Fire");
        canonical.website = Some("fire.ca.gov".to_string());
        let group = MergeGroup {
            primary_id: OrganizationId::from("1"),
            absorbed: vec![OrganizationId::from("2")],
            risk_overlay_from: None,
            lead_scoring_from: None,
        };

        store.commit_merge(&group, &canonical).await.unwrap();
        let records = store.snapshot().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].website.as_deref(), Some("fire.ca.gov"));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_records_untouched() {
        let store = JsonFileStore::new("unused.json", vec![org("1", "Cal Fire"), org("2", "The Cal Fire")]);
        let group = MergeGroup {
            primary_id: OrganizationId::from("1"),
            absorbed: vec![OrganizationId::from("2"), OrganizationId::from("missing")],
            risk_overlay_from: None,
            lead_scoring_from: None,
        };

        assert!(store.commit_merge(&group, &org("1", "Cal Fire")).await.is_err());
        assert_eq!(store.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_keeps_reviewer_status() {
        let mut reviewed = org("1", "Cal Fire");
        reviewed.lead_scoring = Some(LeadScoring {
            reviewer_status: ReviewerStatus::Rejected,
            reviewer_notes: Some("Out of region".to_string()),
            ..scoring("1", 20.0, Tier::C)
        });
        let store = JsonFileStore::new("unused.json", vec![reviewed, org("2", "Red Cross")]);

        store.upsert_lead_scoring(&scoring("1", 74.0, Tier::A)).await.unwrap();
        store.upsert_lead_scoring(&scoring("2", 55.0, Tier::B)).await.unwrap();
        assert!(store.upsert_lead_scoring(&scoring("3", 10.0, Tier::C)).await.is_err());

        let records = store.snapshot().await;
        let first = records[0].lead_scoring.as_ref().unwrap();
        assert_eq!(first.propensity_score, 74.0);
        assert_eq!(first.tier, Tier::A);
        assert_eq!(first.reviewer_status, ReviewerStatus::Rejected);
        assert_eq!(first.reviewer_notes.as_deref(), Some("Out of region"));
        assert_eq!(records[1].lead_scoring.as_ref().unwrap().reviewer_status, ReviewerStatus::Pending);
    }
}
