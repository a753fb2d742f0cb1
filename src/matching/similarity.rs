// src/matching/similarity.rs - Pluggable [0,1] text similarity
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strsim::jaro_winkler;

use crate::matching::embedding::{LocalEmbeddingSimilarity, RemoteEmbeddingSimilarity};
use crate::utils::pipeline_config::{SimilarityBackend, SimilarityConfig};

/// Symmetric similarity bounded to [0, 1]. Implementations return 0.0 for
/// blank input and for any backend failure; they never error.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    fn backend_name(&self) -> &str;

    async fn similarity(&self, text_a: &str, text_b: &str) -> f64;
}

pub fn clamp_similarity(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn either_blank(text_a: &str, text_b: &str) -> bool {
    text_a.trim().is_empty() || text_b.trim().is_empty()
}

/// Jaro-Winkler over trimmed, lower-cased text. No I/O.
#[derive(Debug, Default, Clone)]
pub struct LexicalSimilarity;

#[async_trait]
impl SimilarityScorer for LexicalSimilarity {
    fn backend_name(&self) -> &str {
        "lexical"
    }

    async fn similarity(&self, text_a: &str, text_b: &str) -> f64 {
        if either_blank(text_a, text_b) {
            return 0.0;
        }
        let a = text_a.trim().to_lowercase();
        let b = text_b.trim().to_lowercase();
        clamp_similarity(jaro_winkler(&a, &b))
    }
}

/// Stand-in used when the configured backend cannot be constructed.
#[derive(Debug)]
pub struct UnavailableSimilarity {
    reason: String,
    warned: AtomicBool,
}

impl UnavailableSimilarity {
    pub fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("⚠️ Similarity backend unavailable, all similarities degrade to 0.0: {}", reason);
        Self {
            reason,
            warned: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SimilarityScorer for UnavailableSimilarity {
    fn backend_name(&self) -> &str {
        "unavailable"
    }

    async fn similarity(&self, _text_a: &str, _text_b: &str) -> f64 {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!("Similarity requested but backend is unavailable ({}); returning 0.0", self.reason);
        } else {
            debug!("Similarity backend unavailable; returning 0.0");
        }
        0.0
    }
}

/// Build the configured backend. Construction failures degrade to
/// [`UnavailableSimilarity`] instead of aborting the pipeline.
pub fn build_similarity_scorer(config: &SimilarityConfig) -> Arc<dyn SimilarityScorer> {
    match config.backend {
        SimilarityBackend::Lexical => {
            info!("Using lexical (Jaro-Winkler) similarity backend");
            Arc::new(LexicalSimilarity)
        }
        SimilarityBackend::LocalEmbedding => {
            info!(
                "Using local trigram-embedding similarity backend ({} dimensions)",
                config.embedding_dimensions
            );
            Arc::new(LocalEmbeddingSimilarity::new(config.embedding_dimensions, config.cache_size))
        }
        SimilarityBackend::Remote => match RemoteEmbeddingSimilarity::new(config) {
            Ok(remote) => {
                info!("Using remote embedding backend {} ({})", config.api_url, config.model);
                Arc::new(remote)
            }
            Err(e) => Arc::new(UnavailableSimilarity::new(format!("remote embeddings: {}", e))),
        },
    }
}
