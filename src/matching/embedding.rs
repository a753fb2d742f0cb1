// src/matching/embedding.rs - Embedding-backed similarity (local trigram model and remote API)
use async_trait::async_trait;
use log::{debug, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::matching::similarity::{clamp_similarity, either_blank, SimilarityScorer};
use crate::utils::candle::cosine_similarity_candle;
use crate::utils::pipeline_config::SimilarityConfig;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("No API key configured for the remote embedding backend")]
    NoApiKey,
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Embedding API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Embedding response is missing the vector for input {0}")]
    MissingVector(usize),
    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),
}

/// Text -> vector cache shared by both embedding backends. A poisoned lock
/// only disables caching; it never fails a comparison.
pub struct EmbeddingCache {
    inner: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, text: &str) -> Option<Arc<Vec<f32>>> {
        self.inner.lock().ok()?.get(text).cloned()
    }

    pub fn put(&self, text: &str, vector: Arc<Vec<f32>>) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(text.to_string(), vector);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine_or_zero(v1: &[f32], v2: &[f32], backend: &str) -> f64 {
    match cosine_similarity_candle(v1, v2) {
        Ok(sim) => clamp_similarity(sim),
        Err(e) => {
            warn!("[{}] Cosine similarity failed, treating as 0.0: {}", backend, e);
            0.0
        }
    }
}

/// Deterministic hashed character-trigram embedding. Each trigram of the
/// space-padded, lower-cased text increments the bucket chosen by its SHA-256
/// prefix, so the same text always maps to the same vector.
pub struct LocalEmbeddingSimilarity {
    dimensions: usize,
    cache: EmbeddingCache,
}

impl LocalEmbeddingSimilarity {
    pub fn new(dimensions: usize, cache_size: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            cache: EmbeddingCache::new(cache_size),
        }
    }

    pub fn embed(&self, text: &str) -> Arc<Vec<f32>> {
        let key = text.trim().to_lowercase();
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        let padded: Vec<char> = format!(" {} ", key).chars().collect();
        let mut vector = vec![0.0_f32; self.dimensions];
        for window in padded.windows(3) {
            let trigram: String = window.iter().collect();
            let digest = Sha256::digest(trigram.as_bytes());
            let mut prefix = [0_u8; 8];
            prefix.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(prefix) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let vector = Arc::new(vector);
        self.cache.put(&key, vector.clone());
        vector
    }
}

#[async_trait]
impl SimilarityScorer for LocalEmbeddingSimilarity {
    fn backend_name(&self) -> &str {
        "local_embedding"
    }

    async fn similarity(&self, text_a: &str, text_b: &str) -> f64 {
        if either_blank(text_a, text_b) {
            return 0.0;
        }
        let a = self.embed(text_a);
        let b = self.embed(text_b);
        cosine_or_zero(&a, &b, self.backend_name())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client. Every request is bounded by the
/// configured timeout; failures are logged and scored as 0.0.
pub struct RemoteEmbeddingSimilarity {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    cache: EmbeddingCache,
}

impl RemoteEmbeddingSimilarity {
    pub fn new(config: &SimilarityConfig) -> Result<Self, EmbeddingError> {
        let api_key = config.api_key.clone().ok_or(EmbeddingError::NoApiKey)?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
            timeout,
            cache: EmbeddingCache::new(config.cache_size),
        })
    }

    async fn request_embeddings(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs.to_vec(),
        };
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|d| d.index);
        (0..inputs.len())
            .map(|i| {
                parsed
                    .data
                    .iter()
                    .find(|d| d.index == i)
                    .map(|d| d.embedding.clone())
                    .ok_or(EmbeddingError::MissingVector(i))
            })
            .collect()
    }

    /// Vectors for both texts, fetching only cache misses in a single request.
    async fn embed_pair(&self, text_a: &str, text_b: &str) -> Result<(Arc<Vec<f32>>, Arc<Vec<f32>>), EmbeddingError> {
        let mut cached_a = self.cache.get(text_a);
        let mut cached_b = self.cache.get(text_b);

        let mut missing: Vec<&str> = Vec::new();
        if cached_a.is_none() {
            missing.push(text_a);
        }
        if cached_b.is_none() && text_b != text_a {
            missing.push(text_b);
        }

        if !missing.is_empty() {
            let fetched = tokio::time::timeout(self.timeout, self.request_embeddings(&missing))
                .await
                .map_err(|_| EmbeddingError::Timeout(self.timeout))??;
            for (text, vector) in missing.iter().zip(fetched) {
                let vector = Arc::new(vector);
                self.cache.put(text, vector.clone());
                if *text == text_a {
                    cached_a = Some(vector.clone());
                }
                if *text == text_b {
                    cached_b = Some(vector);
                }
            }
        }
        if cached_b.is_none() && text_b == text_a {
            cached_b = cached_a.clone();
        }

        match (cached_a, cached_b) {
            (Some(a), Some(b)) => Ok((a, b)),
            (None, _) => Err(EmbeddingError::MissingVector(0)),
            (_, None) => Err(EmbeddingError::MissingVector(1)),
        }
    }
}

#[async_trait]
impl SimilarityScorer for RemoteEmbeddingSimilarity {
    fn backend_name(&self) -> &str {
        "remote_embedding"
    }

    async fn similarity(&self, text_a: &str, text_b: &str) -> f64 {
        if either_blank(text_a, text_b) {
            return 0.0;
        }
        let (a, b) = (text_a.trim(), text_b.trim());
        match self.embed_pair(a, b).await {
            Ok((va, vb)) => cosine_or_zero(&va, &vb, self.backend_name()),
            Err(e) => {
                warn!("⚠️ Remote embedding backend degraded to 0.0 similarity: {}", e);
                debug!("Failed pair: '{}' vs '{}'", a, b);
                0.0
            }
        }
    }
}
