// src/models/core.rs
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, globally unique organization identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrganizationId {
    fn from(value: &str) -> Self {
        OrganizationId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Phone,
    Url,
    Linkedin,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Phone => "phone",
            ChannelType::Url => "url",
            ChannelType::Linkedin => "linkedin",
        }
    }
}

impl FromStr for ChannelType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(ChannelType::Email),
            "phone" => Ok(ChannelType::Phone),
            "url" => Ok(ChannelType::Url),
            "linkedin" => Ok(ChannelType::Linkedin),
            other => Err(anyhow!("Unknown contact channel type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub channel_type: ChannelType,
    pub value: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// Wildfire risk signals attached by the geospatial collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskOverlay {
    #[serde(default)]
    pub susceptibility: Option<f64>,
    #[serde(default)]
    pub ignition: Option<f64>,
    /// Already scaled to 0-100 when present.
    #[serde(default)]
    pub exposure_score: Option<f64>,
}

impl RiskOverlay {
    /// The precomputed exposure score, or one derived from susceptibility and
    /// ignition (both expected in 0-1) when the collaborator did not supply it.
    pub fn effective_exposure(&self, susceptibility_weight: f64, ignition_weight: f64) -> Option<f64> {
        if let Some(score) = self.exposure_score {
            return Some(score);
        }
        match (self.susceptibility, self.ignition) {
            (Some(s), Some(i)) => {
                let exposure = (susceptibility_weight * s + ignition_weight * i) * 100.0;
                Some(exposure.clamp(0.0, 100.0))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "A" | "a" => Ok(Tier::A),
            "B" | "b" => Ok(Tier::B),
            "C" | "c" => Ok(Tier::C),
            other => Err(anyhow!("Unknown tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewerStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReviewerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewerStatus::Pending => "pending",
            ReviewerStatus::Approved => "approved",
            ReviewerStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ReviewerStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ReviewerStatus::Pending),
            "approved" => Ok(ReviewerStatus::Approved),
            "rejected" => Ok(ReviewerStatus::Rejected),
            other => Err(anyhow!("Unknown reviewer status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScoring {
    pub org_id: OrganizationId,
    pub propensity_score: f64,
    pub tier: Tier,
    pub rationale: String,
    #[serde(default)]
    pub reviewer_status: ReviewerStatus,
    #[serde(default)]
    pub reviewer_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub id: OrganizationId,
    pub name: String,
    /// Free-form sector label; unknown labels fall back to the default base score.
    #[serde(default = "default_sector")]
    pub sector: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region_state: Option<String>,
    #[serde(default)]
    pub size_band: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default)]
    pub risk_overlay: Option<RiskOverlay>,
    #[serde(default)]
    pub lead_scoring: Option<LeadScoring>,
}

fn default_sector() -> String {
    "Other".to_string()
}

impl OrganizationRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, country: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: OrganizationId(id.into()),
            name: name.into(),
            sector: default_sector(),
            role: None,
            website: None,
            country: country.into(),
            region_state: None,
            size_band: None,
            latitude: None,
            longitude: None,
            notes: None,
            created_at,
            contacts: Vec::new(),
            programs: Vec::new(),
            risk_overlay: None,
            lead_scoring: None,
        }
    }

    /// Website with surrounding whitespace removed, `None` when absent or blank.
    pub fn website_value(&self) -> Option<&str> {
        self.website.as_deref().map(str::trim).filter(|w| !w.is_empty())
    }

    pub fn has_verified_contact(&self) -> bool {
        self.contacts.iter().any(|c| c.verified)
    }
}

/// A singleton text field counts as missing when it is `None` or blank.
pub fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_exposure_prefers_precomputed_score() {
        let overlay = RiskOverlay {
            susceptibility: Some(0.9),
            ignition: Some(0.9),
            exposure_score: Some(42.0),
        };
        assert_eq!(overlay.effective_exposure(0.6, 0.4), Some(42.0));
    }

    #[test]
    fn test_effective_exposure_derived_from_signals() {
        let overlay = RiskOverlay {
            susceptibility: Some(0.5),
            ignition: Some(0.25),
            exposure_score: None,
        };
        let exposure = overlay.effective_exposure(0.6, 0.4).unwrap();
        assert!((exposure - 40.0).abs() < 1e-9);

        let partial = RiskOverlay {
            susceptibility: Some(0.5),
            ignition: None,
            exposure_score: None,
        };
        assert_eq!(partial.effective_exposure(0.6, 0.4), None);
    }

    #[test]
    fn test_derived_exposure_is_clamped() {
        let overlay = RiskOverlay {
            susceptibility: Some(3.0),
            ignition: Some(3.0),
            exposure_score: None,
        };
        assert_eq!(overlay.effective_exposure(0.6, 0.4), Some(100.0));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("LinkedIn".parse::<ChannelType>().unwrap(), ChannelType::Linkedin);
        assert_eq!("b".parse::<Tier>().unwrap(), Tier::B);
        assert_eq!("Approved".parse::<ReviewerStatus>().unwrap(), ReviewerStatus::Approved);
        assert!("fax".parse::<ChannelType>().is_err());
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let json = r#"{
            "id": "org-1",
            "name": "Cal Fire",
            "country": "USA",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let org: OrganizationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(org.sector, "Other");
        assert!(org.contacts.is_empty());
        assert!(org.lead_scoring.is_none());
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&None));
        assert!(is_blank(&Some("   ".to_string())));
        assert!(!is_blank(&Some("x".to_string())));
    }
}
