// src/storage/mod.rs
//! Persistence seam between the engines and whatever owns the organization
//! rows. Every method is one unit of work: it either applies completely or
//! leaves the store untouched.

pub mod json_file;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;

use crate::matching::MergeGroup;
use crate::models::{LeadScoring, OrganizationRecord};

pub use json_file::JsonFileStore;
pub use postgres::PgOrganizationStore;

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// All organizations with their contacts, programs, overlay and scoring attached.
    async fn load_organizations(&self) -> Result<Vec<OrganizationRecord>>;

    /// Reparents the absorbed records' children onto `group.primary_id`,
    /// writes the merged singleton fields from `canonical`, and only then
    /// deletes the absorbed records.
    async fn commit_merge(&self, group: &MergeGroup, canonical: &OrganizationRecord) -> Result<()>;

    /// Inserts or updates the scoring. An existing reviewer status is never overwritten.
    async fn upsert_lead_scoring(&self, scoring: &LeadScoring) -> Result<()>;
}
