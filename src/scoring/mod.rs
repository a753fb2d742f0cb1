// src/scoring/mod.rs
pub mod calculator;
pub mod tier;

use log::warn;

use crate::models::{LeadScoring, OrganizationRecord, ReviewerStatus};
use crate::utils::pipeline_config::ScoringConfig;

pub use calculator::{is_wildfire_program, ScoreBreakdown, ScoreCalculator, ScoringError};
pub use tier::{rationale, tier, TierClassifier};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLead {
    pub scoring: LeadScoring,
    /// True when the score degraded to 0.0 after a computation error.
    pub degraded: bool,
}

/// Builds the `LeadScoring` value object handed to storage and review.
pub struct LeadScorer {
    calculator: ScoreCalculator,
    classifier: TierClassifier,
}

impl LeadScorer {
    pub fn new(config: ScoringConfig) -> Self {
        let classifier = TierClassifier::from_config(&config);
        Self {
            calculator: ScoreCalculator::new(config),
            classifier,
        }
    }

    /// Review state already attached to the organization is carried over; a
    /// first scoring starts as pending.
    pub fn score(&self, org: &OrganizationRecord) -> ScoredLead {
        let (propensity_score, rationale, degraded) = match self.calculator.breakdown(org) {
            Ok(breakdown) => (breakdown.total, tier::rationale(org.sector.trim(), &breakdown), false),
            Err(e) => {
                warn!("⚠️ Scoring failed for {} ({}), reporting 0.0: {}", org.name, org.id, e);
                (0.0, format!("Score unavailable: {}", e), true)
            }
        };

        let (reviewer_status, reviewer_notes) = match &org.lead_scoring {
            Some(existing) => (existing.reviewer_status, existing.reviewer_notes.clone()),
            None => (ReviewerStatus::Pending, None),
        };

        ScoredLead {
            scoring: LeadScoring {
                org_id: org.id.clone(),
                propensity_score,
                tier: self.classifier.classify(propensity_score),
                rationale,
                reviewer_status,
                reviewer_notes,
            },
            degraded,
        }
    }
}
