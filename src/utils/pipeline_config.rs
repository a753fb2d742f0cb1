// src/utils/pipeline_config.rs
//! Externally supplied configuration for the dedup and scoring engines.
//! Engines receive these structs in their constructors and never read the
//! environment themselves.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub name_similarity_threshold: f64,
    pub website_similarity_threshold: f64,
    /// Blocks resolved concurrently; records inside a block are always walked in order.
    pub max_concurrent_blocks: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: 0.92,
            website_similarity_threshold: 0.95,
            max_concurrent_blocks: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub sector_base_scores: HashMap<String, f64>,
    pub priority_countries: BTreeSet<String>,
    pub wildfire_program_bonus: f64,
    pub verified_contact_bonus: f64,
    pub priority_country_bonus: f64,
    pub tier_a_threshold: f64,
    pub tier_b_threshold: f64,
    pub susceptibility_weight: f64,
    pub ignition_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let sector_base_scores = [
            ("Government", 70.0),
            ("Insurance", 80.0),
            ("Research", 60.0),
            ("Utilities", 75.0),
            ("Environmental", 65.0),
        ]
        .into_iter()
        .map(|(sector, score)| (sector.to_string(), score))
        .collect();

        Self {
            sector_base_scores,
            priority_countries: ["USA", "Canada", "Australia"]
                .into_iter()
                .map(String::from)
                .collect(),
            wildfire_program_bonus: 5.0,
            verified_contact_bonus: 3.0,
            priority_country_bonus: 4.0,
            tier_a_threshold: 70.0,
            tier_b_threshold: 50.0,
            susceptibility_weight: 0.6,
            ignition_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityBackend {
    Lexical,
    LocalEmbedding,
    Remote,
}

impl FromStr for SimilarityBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lexical" | "jaro_winkler" => Ok(SimilarityBackend::Lexical),
            "local" | "local_embedding" => Ok(SimilarityBackend::LocalEmbedding),
            "remote" | "openai" => Ok(SimilarityBackend::Remote),
            other => bail!("Unknown similarity backend '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub backend: SimilarityBackend,
    pub api_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub embedding_dimensions: usize,
    pub cache_size: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            backend: SimilarityBackend::LocalEmbedding,
            api_url: "https://api.openai.com/v1/embeddings".to_string(),
            model: "text-embedding-3-large".to_string(),
            api_key: None,
            timeout_ms: 5_000,
            embedding_dimensions: 512,
            cache_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dedup: DedupConfig,
    pub scoring: ScoringConfig,
    pub similarity: SimilarityConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Could not parse {}='{}', using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parses `Name=score,Name=score` pairs. Malformed pairs are reported as errors
/// because a silently dropped sector would change every score it touches.
pub fn parse_sector_scores(raw: &str) -> Result<HashMap<String, f64>> {
    let mut scores = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (sector, score) = pair
            .split_once('=')
            .with_context(|| format!("Sector score entry '{}' is missing '='", pair))?;
        let score: f64 = score
            .trim()
            .parse()
            .with_context(|| format!("Sector score for '{}' is not a number", sector.trim()))?;
        scores.insert(sector.trim().to_string(), score);
    }
    Ok(scores)
}

pub fn parse_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl PipelineConfig {
    /// Create configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = PipelineConfig::default();

        let dedup = DedupConfig {
            name_similarity_threshold: env_or(
                "NAME_SIMILARITY_THRESHOLD",
                defaults.dedup.name_similarity_threshold,
            ),
            website_similarity_threshold: env_or(
                "WEBSITE_SIMILARITY_THRESHOLD",
                defaults.dedup.website_similarity_threshold,
            ),
            max_concurrent_blocks: env_or("MAX_CONCURRENT_BLOCKS", defaults.dedup.max_concurrent_blocks),
        };

        let sector_base_scores = match env::var("SECTOR_BASE_SCORES") {
            Ok(raw) => parse_sector_scores(&raw).context("Invalid SECTOR_BASE_SCORES")?,
            Err(_) => defaults.scoring.sector_base_scores.clone(),
        };
        let priority_countries = env::var("PRIORITY_COUNTRIES")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|_| defaults.scoring.priority_countries.clone());

        let scoring = ScoringConfig {
            sector_base_scores,
            priority_countries,
            wildfire_program_bonus: env_or("WILDFIRE_PROGRAM_BONUS", defaults.scoring.wildfire_program_bonus),
            verified_contact_bonus: env_or("VERIFIED_CONTACT_BONUS", defaults.scoring.verified_contact_bonus),
            priority_country_bonus: env_or("PRIORITY_COUNTRY_BONUS", defaults.scoring.priority_country_bonus),
            tier_a_threshold: env_or("TIER_A_THRESHOLD", defaults.scoring.tier_a_threshold),
            tier_b_threshold: env_or("TIER_B_THRESHOLD", defaults.scoring.tier_b_threshold),
            susceptibility_weight: env_or("SUSCEPTIBILITY_WEIGHT", defaults.scoring.susceptibility_weight),
            ignition_weight: env_or("IGNITION_WEIGHT", defaults.scoring.ignition_weight),
        };

        let backend = match env::var("SIMILARITY_BACKEND") {
            Ok(raw) => raw.parse().context("Invalid SIMILARITY_BACKEND")?,
            Err(_) => defaults.similarity.backend,
        };
        let similarity = SimilarityConfig {
            backend,
            api_url: env::var("EMBEDDINGS_API_URL").unwrap_or(defaults.similarity.api_url),
            model: env::var("EMBEDDINGS_MODEL").unwrap_or(defaults.similarity.model),
            api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            timeout_ms: env_or("EMBEDDINGS_TIMEOUT_MS", defaults.similarity.timeout_ms),
            embedding_dimensions: env_or("EMBEDDING_DIMENSIONS", defaults.similarity.embedding_dimensions),
            cache_size: env_or("EMBEDDING_CACHE_SIZE", defaults.similarity.cache_size),
        };

        let config = Self { dedup, scoring, similarity };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file. Missing sections take defaults;
    /// the API key is still read from the environment.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: PipelineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        if config.similarity.api_key.is_none() {
            config.similarity.api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        }
        config.validate()?;
        Ok(config)
    }

    /// Malformed thresholds and bonuses are fatal before any batch work starts.
    pub fn validate(&self) -> Result<()> {
        let d = &self.dedup;
        for (name, value) in [
            ("name_similarity_threshold", d.name_similarity_threshold),
            ("website_similarity_threshold", d.website_similarity_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if d.max_concurrent_blocks == 0 {
            bail!("max_concurrent_blocks must be at least 1");
        }

        let s = &self.scoring;
        for (name, value) in [
            ("tier_a_threshold", s.tier_a_threshold),
            ("tier_b_threshold", s.tier_b_threshold),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                bail!("{} must be within [0, 100], got {}", name, value);
            }
        }
        if s.tier_b_threshold > s.tier_a_threshold {
            bail!(
                "tier_b_threshold ({}) must not exceed tier_a_threshold ({})",
                s.tier_b_threshold,
                s.tier_a_threshold
            );
        }
        for (name, value) in [
            ("wildfire_program_bonus", s.wildfire_program_bonus),
            ("verified_contact_bonus", s.verified_contact_bonus),
            ("priority_country_bonus", s.priority_country_bonus),
            ("susceptibility_weight", s.susceptibility_weight),
            ("ignition_weight", s.ignition_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a non-negative number, got {}", name, value);
            }
        }
        for (sector, score) in &s.sector_base_scores {
            if !score.is_finite() || *score < 0.0 {
                bail!("Base score for sector '{}' must be a non-negative number, got {}", sector, score);
            }
        }

        let sim = &self.similarity;
        if sim.timeout_ms == 0 {
            bail!("similarity timeout_ms must be positive");
        }
        if sim.backend == SimilarityBackend::LocalEmbedding && sim.embedding_dimensions == 0 {
            bail!("embedding_dimensions must be positive for the local embedding backend");
        }
        Ok(())
    }

    pub fn log_config(&self) {
        info!("⚙️  Dedup: name threshold {}, website threshold {}, {} concurrent blocks",
            self.dedup.name_similarity_threshold,
            self.dedup.website_similarity_threshold,
            self.dedup.max_concurrent_blocks);
        info!("⚙️  Scoring: {} sectors, priority countries {:?}, tiers A>={} B>={}",
            self.scoring.sector_base_scores.len(),
            self.scoring.priority_countries,
            self.scoring.tier_a_threshold,
            self.scoring.tier_b_threshold);
        info!("⚙️  Similarity backend: {:?} (timeout {} ms)",
            self.similarity.backend, self.similarity.timeout_ms);
    }
}
