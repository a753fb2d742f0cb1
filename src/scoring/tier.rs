// src/scoring/tier.rs - Tier thresholds and score rationale
use crate::models::Tier;
use crate::scoring::calculator::ScoreBreakdown;
use crate::utils::pipeline_config::ScoringConfig;

/// Lower bounds are inclusive: a score equal to a threshold lands in the higher tier.
pub fn tier(score: f64, tier_a_threshold: f64, tier_b_threshold: f64) -> Tier {
    if score >= tier_a_threshold {
        Tier::A
    } else if score >= tier_b_threshold {
        Tier::B
    } else {
        Tier::C
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierClassifier {
    tier_a_threshold: f64,
    tier_b_threshold: f64,
}

impl TierClassifier {
    pub fn new(tier_a_threshold: f64, tier_b_threshold: f64) -> Self {
        Self {
            tier_a_threshold,
            tier_b_threshold,
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(config.tier_a_threshold, config.tier_b_threshold)
    }

    pub fn classify(&self, score: f64) -> Tier {
        tier(score, self.tier_a_threshold, self.tier_b_threshold)
    }
}

/// Human-readable explanation listing each non-zero term in the order
/// base, exposure, program, contact, country.
pub fn rationale(sector: &str, breakdown: &ScoreBreakdown) -> String {
    let mut parts = Vec::with_capacity(5);
    if breakdown.base != 0.0 {
        parts.push(format!("Base sector score: {:.1} ({})", breakdown.base, sector));
    }
    if breakdown.exposure != 0.0 {
        parts.push(format!("Exposure bonus: {:.1}", breakdown.exposure));
    }
    if breakdown.program != 0.0 {
        parts.push(format!("Wildfire program bonus: {:.1}", breakdown.program));
    }
    if breakdown.contact != 0.0 {
        parts.push(format!("Verified contact bonus: {:.1}", breakdown.contact));
    }
    if breakdown.country != 0.0 {
        parts.push(format!("Priority country bonus: {:.1}", breakdown.country));
    }

    if parts.is_empty() {
        "No contributing factors".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_are_inclusive() {
        let classifier = TierClassifier::new(70.0, 50.0);
        assert_eq!(classifier.classify(70.0), Tier::A);
        assert_eq!(classifier.classify(69.99), Tier::B);
        assert_eq!(classifier.classify(50.0), Tier::B);
        assert_eq!(classifier.classify(49.99), Tier::C);
        assert_eq!(classifier.classify(100.0), Tier::A);
        assert_eq!(classifier.classify(0.0), Tier::C);
    }

    #[test]
    fn test_tier_is_monotonic() {
        // Tier::A < Tier::B < Tier::C, so a better tier never follows a worse one.
        let mut previous = tier(0.0, 70.0, 50.0);
        for step in 1..=1000 {
            let current = tier(step as f64 / 10.0, 70.0, 50.0);
            assert!(current <= previous, "tier dropped at {}", step);
            previous = current;
        }
    }

    #[test]
    fn test_classifier_uses_configured_thresholds() {
        let mut config = ScoringConfig::default();
        config.tier_a_threshold = 90.0;
        config.tier_b_threshold = 20.0;
        let classifier = TierClassifier::from_config(&config);
        assert_eq!(classifier.classify(80.0), Tier::B);
        assert_eq!(classifier.classify(20.0), Tier::B);
        assert_eq!(classifier.classify(19.0), Tier::C);
    }

    #[test]
    fn test_rationale_lists_non_zero_terms_in_order() {
        let breakdown = ScoreBreakdown {
            base: 80.0,
            exposure: 20.0,
            program: 0.0,
            contact: 3.0,
            country: 4.0,
            total: 100.0,
        };
        assert_eq!(
            rationale("Insurance", &breakdown),
            "Base sector score: 80.0 (Insurance); Exposure bonus: 20.0; \
             Verified contact bonus: 3.0; Priority country bonus: 4.0"
        );
    }

    #[test]
    fn test_rationale_without_terms() {
        assert_eq!(rationale("Other", &ScoreBreakdown::default()), "No contributing factors");
    }
}
