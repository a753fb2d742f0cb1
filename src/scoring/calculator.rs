// src/scoring/calculator.rs - Weighted propensity score for a canonical organization
use log::{debug, error};

use crate::models::{OrganizationRecord, Program};
use crate::utils::pipeline_config::ScoringConfig;

/// Base score for sectors missing from the configured table.
pub const DEFAULT_SECTOR_SCORE: f64 = 10.0;
/// Exposure (0-100) contributes at most 40 points.
pub const EXPOSURE_FACTOR: f64 = 0.4;
pub const PROGRAM_BONUS_CAP_MULTIPLIER: f64 = 3.0;

const MAX_SCORE: f64 = 100.0;

/// Matched against case-folded program name + description.
const WILDFIRE_KEYWORDS: [&str; 9] = [
    "wildfire",
    "fire",
    "wui",
    "mitigation",
    "psps",
    "underwriting",
    "hazard",
    "risk assessment",
    "emergency",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("{term} is not a finite number ({value})")]
    NonFinite { term: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub exposure: f64,
    pub program: f64,
    pub contact: f64,
    pub country: f64,
    /// Sum of the terms clamped to [0, 100].
    pub total: f64,
}

fn finite(term: &'static str, value: f64) -> Result<f64, ScoringError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScoringError::NonFinite { term, value })
    }
}

pub fn is_wildfire_program(program: &Program) -> bool {
    let text = format!(
        "{} {}",
        program.name,
        program.description.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    WILDFIRE_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

pub struct ScoreCalculator {
    config: ScoringConfig,
}

impl ScoreCalculator {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn base_score(&self, org: &OrganizationRecord) -> f64 {
        self.config
            .sector_base_scores
            .get(org.sector.trim())
            .copied()
            .unwrap_or(DEFAULT_SECTOR_SCORE)
    }

    fn exposure(&self, org: &OrganizationRecord) -> Option<f64> {
        org.risk_overlay.as_ref().and_then(|overlay| {
            overlay.effective_exposure(self.config.susceptibility_weight, self.config.ignition_weight)
        })
    }

    /// 0.0 when there is no overlay or no usable exposure signal.
    pub fn exposure_bonus(&self, org: &OrganizationRecord) -> f64 {
        self.exposure(org)
            .map(|exposure| exposure.clamp(0.0, MAX_SCORE) * EXPOSURE_FACTOR)
            .unwrap_or(0.0)
    }

    pub fn program_bonus(&self, org: &OrganizationRecord) -> f64 {
        let qualifying = org.programs.iter().filter(|p| is_wildfire_program(p)).count();
        let per_program = self.config.wildfire_program_bonus;
        (qualifying as f64 * per_program).min(per_program * PROGRAM_BONUS_CAP_MULTIPLIER)
    }

    pub fn contact_bonus(&self, org: &OrganizationRecord) -> f64 {
        if org.has_verified_contact() {
            self.config.verified_contact_bonus
        } else {
            0.0
        }
    }

    pub fn country_bonus(&self, org: &OrganizationRecord) -> f64 {
        if self.config.priority_countries.contains(org.country.trim()) {
            self.config.priority_country_bonus
        } else {
            0.0
        }
    }

    pub fn breakdown(&self, org: &OrganizationRecord) -> Result<ScoreBreakdown, ScoringError> {
        let base = finite("base sector score", self.base_score(org))?.clamp(0.0, MAX_SCORE);
        if let Some(raw) = self.exposure(org) {
            finite("exposure score", raw)?;
        }
        let exposure = self.exposure_bonus(org);
        let program = finite("wildfire program bonus", self.program_bonus(org))?.max(0.0);
        let contact = finite("verified contact bonus", self.contact_bonus(org))?.max(0.0);
        let country = finite("priority country bonus", self.country_bonus(org))?.max(0.0);

        let total = (base + exposure + program + contact + country).clamp(0.0, MAX_SCORE);
        debug!(
            "Score for {} ({}): base={}, exposure={:.1}, program={}, contact={}, country={}, total={:.1}",
            org.name, org.id, base, exposure, program, contact, country, total
        );
        Ok(ScoreBreakdown {
            base,
            exposure,
            program,
            contact,
            country,
            total,
        })
    }

    /// Never fails: a computation error is logged and scored as 0.0.
    pub fn propensity_score(&self, org: &OrganizationRecord) -> f64 {
        match self.breakdown(org) {
            Ok(breakdown) => breakdown.total,
            Err(e) => {
                error!("Error calculating propensity score for {} ({}): {}", org.name, org.id, e);
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelType, Contact, RiskOverlay};
    use chrono::Utc;

    fn calculator() -> ScoreCalculator {
        ScoreCalculator::new(ScoringConfig::default())
    }

    fn org(sector: &str, country: &str) -> OrganizationRecord {
        let mut org = OrganizationRecord::new("org-1", "Test Org", country, Utc::now());
        org.sector = sector.to_string();
        org
    }

    fn program(name: &str, description: Option<&str>) -> Program {
        Program {
            id: name.to_string(),
            name: name.to_string(),
            url: None,
            description: description.map(String::from),
            source_url: None,
        }
    }

    fn verified_contact() -> Contact {
        Contact {
            id: "c1".to_string(),
            name: Some("Jane Doe".to_string()),
            title: None,
            channel_type: ChannelType::Email,
            value: "jane@example.org".to_string(),
            verified: true,
            source_url: None,
        }
    }

    fn overlay(exposure: f64) -> Option<RiskOverlay> {
        Some(RiskOverlay {
            exposure_score: Some(exposure),
            ..RiskOverlay::default()
        })
    }

    #[test]
    fn test_insurance_scenario_clamps_to_hundred() {
        let mut org = org("Insurance", "USA");
        org.risk_overlay = overlay(50.0);
        org.contacts.push(verified_contact());

        let b = calculator().breakdown(&org).unwrap();
        assert_eq!(b.base, 80.0);
        assert!((b.exposure - 20.0).abs() < 1e-9);
        assert_eq!(b.program, 0.0);
        assert_eq!(b.contact, 3.0);
        assert_eq!(b.country, 4.0);
        assert_eq!(b.total, 100.0);
    }

    #[test]
    fn test_unknown_sector_without_signals() {
        let org = org("Hospitality", "Germany");
        assert_eq!(calculator().propensity_score(&org), 10.0);
    }

    #[test]
    fn test_no_signals_equals_sector_base() {
        let calc = calculator();
        for (sector, base) in [("Government", 70.0), ("Research", 60.0), ("Other", 10.0)] {
            assert_eq!(calc.propensity_score(&org(sector, "Brazil")), base);
        }
    }

    #[test]
    fn test_unverified_contacts_do_not_count() {
        let mut org = org("Research", "Germany");
        let mut contact = verified_contact();
        contact.verified = false;
        org.contacts.push(contact);
        assert_eq!(calculator().contact_bonus(&org), 0.0);
    }

    #[test]
    fn test_program_bonus_counts_each_program_once() {
        let mut org = org("Research", "Germany");
        org.programs.push(program(
            "Wildfire hazard mitigation",
            Some("Emergency risk assessment"),
        ));
        assert_eq!(calculator().program_bonus(&org), 5.0);
    }

    #[test]
    fn test_program_bonus_is_capped() {
        let mut org = org("Research", "Germany");
        for i in 0..7 {
            org.programs.push(program(&format!("Fire program {}", i), None));
        }
        assert_eq!(calculator().program_bonus(&org), 15.0);

        let mut config = ScoringConfig::default();
        config.wildfire_program_bonus = 2.5;
        assert_eq!(ScoreCalculator::new(config).program_bonus(&org), 7.5);
    }

    #[test]
    fn test_program_keywords_are_case_insensitive() {
        assert!(is_wildfire_program(&program("WUI Grants", None)));
        assert!(is_wildfire_program(&program("Outreach", Some("PSPS event support"))));
        assert!(is_wildfire_program(&program("Property Underwriting", None)));
        assert!(!is_wildfire_program(&program("Flood Insurance", Some("Coastal risk"))));
    }

    #[test]
    fn test_exposure_bonus_is_bounded() {
        let calc = calculator();
        let mut org = org("Research", "Germany");
        for (exposure, expected) in [(0.0, 0.0), (100.0, 40.0), (250.0, 40.0), (-30.0, 0.0)] {
            org.risk_overlay = overlay(exposure);
            let bonus = calc.exposure_bonus(&org);
            assert!((bonus - expected).abs() < 1e-9, "exposure {} gave {}", exposure, bonus);
        }
    }

    #[test]
    fn test_exposure_derived_from_risk_signals() {
        let mut org = org("Research", "Germany");
        org.risk_overlay = Some(RiskOverlay {
            susceptibility: Some(0.5),
            ignition: Some(0.25),
            exposure_score: None,
        });
        // (0.6 * 0.5 + 0.4 * 0.25) * 100 = 40 -> 16 points
        assert!((calculator().exposure_bonus(&org) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_priority_country_is_exact_after_trim() {
        let calc = calculator();
        assert_eq!(calc.country_bonus(&org("Research", " Canada ")), 4.0);
        assert_eq!(calc.country_bonus(&org("Research", "United States")), 0.0);
    }

    #[test]
    fn test_non_finite_exposure_degrades_to_zero() {
        let mut org = org("Insurance", "USA");
        org.risk_overlay = overlay(f64::NAN);
        let calc = calculator();
        assert!(matches!(
            calc.breakdown(&org),
            Err(ScoringError::NonFinite { term: "exposure score", .. })
        ));
        assert_eq!(calc.propensity_score(&org), 0.0);
    }

    #[test]
    fn test_configured_sector_table_is_used() {
        let mut config = ScoringConfig::default();
        config.sector_base_scores.insert("Forestry".to_string(), 55.0);
        config.priority_countries.clear();
        let calc = ScoreCalculator::new(config);
        assert_eq!(calc.propensity_score(&org("Forestry", "USA")), 55.0);
    }
}
