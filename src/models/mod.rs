// src/models/mod.rs
pub mod core;
pub mod stats_models;

pub use self::core::{
    ChannelType, Contact, LeadScoring, OrganizationId, OrganizationRecord, Program,
    ReviewerStatus, RiskOverlay, Tier,
};
pub use stats_models::{DedupStats, PipelineReport, ScoringStats};
