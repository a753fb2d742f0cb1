// src/storage/postgres.rs - Postgres-backed organization store
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::matching::MergeGroup;
use crate::models::{
    Contact, LeadScoring, OrganizationId, OrganizationRecord, Program, ReviewerStatus, RiskOverlay,
};
use crate::storage::OrganizationStore;
use crate::utils::db_connect::PgPool;

const ORGANIZATIONS_QUERY: &str = "
    SELECT org_id::text AS org_id, name, sector, role, website, country, region_state,
           size_band, latitude, longitude, notes, created_at
    FROM public.organizations
    ORDER BY created_at, org_id";

const CONTACTS_QUERY: &str = "
    SELECT contact_id::text AS contact_id, org_id::text AS org_id, name, title,
           channel_type::text AS channel_type, value, verified_bool, source_url
    FROM public.contacts
    ORDER BY created_at, contact_id";

const PROGRAMS_QUERY: &str = "
    SELECT program_id::text AS program_id, org_id::text AS org_id, name, url, description, source_url
    FROM public.programs
    ORDER BY created_at, program_id";

const RISK_OVERLAY_QUERY: &str = "
    SELECT org_id::text AS org_id, susceptibility, ignition, exposure_score
    FROM public.risk_overlay";

const LEAD_SCORING_QUERY: &str = "
    SELECT org_id::text AS org_id, propensity_score, tier::text AS tier, rationale,
           reviewer_status::text AS reviewer_status, reviewer_notes
    FROM public.lead_scoring";

pub struct PgOrganizationStore {
    pool: PgPool,
}

impl PgOrganizationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A merge only commits when every absorbed row was actually deleted.
fn ensure_all_absorbed(primary: &str, deleted: u64, expected: usize) -> Result<()> {
    if deleted as usize != expected {
        bail!(
            "Merge into {} deleted {} of {} absorbed organizations",
            primary,
            deleted,
            expected
        );
    }
    Ok(())
}

#[async_trait]
impl OrganizationStore for PgOrganizationStore {
    async fn load_organizations(&self) -> Result<Vec<OrganizationRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for load_organizations")?;

        let mut contacts: HashMap<String, Vec<Contact>> = HashMap::new();
        for row in conn
            .query(CONTACTS_QUERY, &[])
            .await
            .context("Failed to query contacts")?
        {
            let org_id: String = row.get("org_id");
            let contact_id: String = row.get("contact_id");
            let raw_channel: String = row.get("channel_type");
            let channel_type = match raw_channel.parse() {
                Ok(channel) => channel,
                Err(e) => {
                    warn!("Skipping contact {} of org {}: {}", contact_id, org_id, e);
                    continue;
                }
            };
            contacts.entry(org_id).or_default().push(Contact {
                id: contact_id,
                name: row.get("name"),
                title: row.get("title"),
                channel_type,
                value: row.get("value"),
                verified: row.get::<_, Option<bool>>("verified_bool").unwrap_or(false),
                source_url: row.get("source_url"),
            });
        }

        let mut programs: HashMap<String, Vec<Program>> = HashMap::new();
        for row in conn
            .query(PROGRAMS_QUERY, &[])
            .await
            .context("Failed to query programs")?
        {
            let org_id: String = row.get("org_id");
            programs.entry(org_id).or_default().push(Program {
                id: row.get("program_id"),
                name: row.get("name"),
                url: row.get("url"),
                description: row.get("description"),
                source_url: row.get("source_url"),
            });
        }

        let mut overlays: HashMap<String, RiskOverlay> = HashMap::new();
        for row in conn
            .query(RISK_OVERLAY_QUERY, &[])
            .await
            .context("Failed to query risk_overlay")?
        {
            overlays.insert(
                row.get("org_id"),
                RiskOverlay {
                    susceptibility: row.get("susceptibility"),
                    ignition: row.get("ignition"),
                    exposure_score: row.get("exposure_score"),
                },
            );
        }

        let mut scorings: HashMap<String, LeadScoring> = HashMap::new();
        for row in conn
            .query(LEAD_SCORING_QUERY, &[])
            .await
            .context("Failed to query lead_scoring")?
        {
            let org_id: String = row.get("org_id");
            let raw_tier: String = row.get("tier");
            let tier = match raw_tier.parse() {
                Ok(tier) => tier,
                Err(e) => {
                    warn!("Ignoring lead scoring of org {}: {}", org_id, e);
                    continue;
                }
            };
            let reviewer_status = row
                .get::<_, Option<String>>("reviewer_status")
                .and_then(|s| s.parse().ok())
                .unwrap_or(ReviewerStatus::Pending);
            scorings.insert(
                org_id.clone(),
                LeadScoring {
                    org_id: OrganizationId(org_id),
                    propensity_score: row.get("propensity_score"),
                    tier,
                    rationale: row.get("rationale"),
                    reviewer_status,
                    reviewer_notes: row.get("reviewer_notes"),
                },
            );
        }

        let rows = conn
            .query(ORGANIZATIONS_QUERY, &[])
            .await
            .context("Failed to query organizations")?;
        let mut organizations = Vec::with_capacity(rows.len());
        for row in rows {
            let org_id: String = row.get("org_id");
            let created_at: Option<DateTime<Utc>> = row.get("created_at");
            organizations.push(OrganizationRecord {
                id: OrganizationId(org_id.clone()),
                name: row.get("name"),
                sector: row
                    .get::<_, Option<String>>("sector")
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "Other".to_string()),
                role: row.get("role"),
                website: row.get("website"),
                country: row.get::<_, Option<String>>("country").unwrap_or_default(),
                region_state: row.get("region_state"),
                size_band: row.get("size_band"),
                latitude: row.get("latitude"),
                longitude: row.get("longitude"),
                notes: row.get("notes"),
                created_at: created_at.unwrap_or_default(),
                contacts: contacts.remove(&org_id).unwrap_or_default(),
                programs: programs.remove(&org_id).unwrap_or_default(),
                risk_overlay: overlays.remove(&org_id),
                lead_scoring: scorings.remove(&org_id),
            });
        }

        info!(
            "Loaded {} organizations from Postgres",
            organizations.len()
        );
        Ok(organizations)
    }

    async fn commit_merge(&self, group: &MergeGroup, canonical: &OrganizationRecord) -> Result<()> {
        let primary = group.primary_id.as_str();
        let absorbed: Vec<String> = group.absorbed.iter().map(|id| id.0.clone()).collect();

        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for commit_merge")?;
        // Dropping the transaction without commit rolls the whole merge back.
        let tx = conn
            .transaction()
            .await
            .context("Failed to start merge transaction")?;

        for table in ["contacts", "programs", "sources"] {
            let moved = tx
                .execute(
                    format!(
                        "UPDATE public.{} SET org_id = $1::text::uuid WHERE org_id::text = ANY($2)",
                        table
                    )
                    .as_str(),
                    &[&primary, &absorbed],
                )
                .await
                .with_context(|| format!("Failed to reparent {} onto {}", table, primary))?;
            debug!("Reparented {} {} rows onto {}", moved, table, primary);
        }

        if let Some(from) = &group.risk_overlay_from {
            tx.execute(
                "UPDATE public.risk_overlay SET org_id = $1::text::uuid, updated_at = NOW()
                 WHERE org_id::text = $2",
                &[&primary, &from.as_str()],
            )
            .await
            .context("Failed to adopt risk overlay")?;
        }
        if let Some(from) = &group.lead_scoring_from {
            tx.execute(
                "UPDATE public.lead_scoring SET org_id = $1::text::uuid, updated_at = NOW()
                 WHERE org_id::text = $2",
                &[&primary, &from.as_str()],
            )
            .await
            .context("Failed to adopt lead scoring")?;
        }
        // Overlays and scorings that were not adopted go with their records.
        tx.execute(
            "DELETE FROM public.risk_overlay WHERE org_id::text = ANY($1)",
            &[&absorbed],
        )
        .await
        .context("Failed to drop leftover risk overlays")?;
        tx.execute(
            "DELETE FROM public.lead_scoring WHERE org_id::text = ANY($1)",
            &[&absorbed],
        )
        .await
        .context("Failed to drop leftover lead scorings")?;

        tx.execute(
            "UPDATE public.organizations
             SET role = $2, website = $3, region_state = $4, size_band = $5, notes = $6,
                 latitude = $7, longitude = $8, updated_at = NOW()
             WHERE org_id::text = $1",
            &[
                &primary,
                &canonical.role,
                &canonical.website,
                &canonical.region_state,
                &canonical.size_band,
                &canonical.notes,
                &canonical.latitude,
                &canonical.longitude,
            ],
        )
        .await
        .context("Failed to update canonical organization")?;

        let deleted = tx
            .execute(
                "DELETE FROM public.organizations WHERE org_id::text = ANY($1)",
                &[&absorbed],
            )
            .await
            .context("Failed to delete absorbed organizations")?;
        ensure_all_absorbed(primary, deleted, absorbed.len())?;

        tx.commit().await.context("Failed to commit merge transaction")?;
        debug!("Committed merge of {:?} into {}", absorbed, primary);
        Ok(())
    }

    async fn upsert_lead_scoring(&self, scoring: &LeadScoring) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for upsert_lead_scoring")?;

        conn.execute(
            "INSERT INTO public.lead_scoring
                (org_id, propensity_score, tier, rationale, reviewer_status, reviewer_notes, created_at)
             VALUES ($1::text::uuid, $2, ($3::text)::tier_enum, $4, ($5::text)::reviewer_status_enum, $6, NOW())
             ON CONFLICT (org_id) DO UPDATE SET
                propensity_score = EXCLUDED.propensity_score,
                tier = EXCLUDED.tier,
                rationale = EXCLUDED.rationale,
                updated_at = NOW()",
            &[
                &scoring.org_id.as_str(),
                &scoring.propensity_score,
                &scoring.tier.as_str(),
                &scoring.rationale,
                &scoring.reviewer_status.as_str(),
                &scoring.reviewer_notes,
            ],
        )
        .await
        .with_context(|| format!("Failed to upsert lead scoring for {}", scoring.org_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_delete_aborts_merge() {
        assert!(ensure_all_absorbed("calfire-1", 2, 2).is_ok());

        let err = ensure_all_absorbed("calfire-1", 1, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Merge into calfire-1 deleted 1 of 2 absorbed organizations"
        );
        assert!(ensure_all_absorbed("calfire-1", 0, 1).is_err());
    }
}
