//! Text embedding backends.

use std::hash::Hasher;
use std::time::Duration;

use lazy_static::lazy_static;
use ndarray::Array1;
use regex::Regex;
use reqwest::Client;
use rustc_hash::{FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};
use crate::llm::ollama_http_client;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Ollama `/api/embeddings`
    Ollama,
    /// Offline feature-hashing embedder
    Hashing,
}

/// Maps text to a fixed-length vector. Same model, same text, same vector.
pub trait Embedder {
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

pub struct OllamaEmbedder {
    model: String,
    endpoint: String,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(model: String, endpoint: String, timeout: Duration) -> Result<Self> {
        let client = ollama_http_client(&endpoint, timeout)?;
        Ok(Self {
            model,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.endpoint);
        debug!("Calling Ollama embeddings API: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Embedding(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse response: {e}")))?;

        if result.embedding.is_empty() {
            return Err(RagError::Embedding(format!(
                "model {} returned an empty embedding",
                self.model
            )));
        }
        Ok(result.embedding)
    }
}

lazy_static! {
    static ref STOP_WORDS: FxHashSet<&'static str> = {
        let words = vec![
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from",
            "has", "he", "in", "is", "it", "its", "of", "on", "that", "the",
            "to", "was", "were", "will", "with",
            "al", "con", "de", "del", "el", "en", "es", "la", "las", "lo",
            "los", "para", "por", "que", "se", "su", "un", "una", "y",
        ];
        words.into_iter().collect()
    };
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").unwrap();
}

/// Bag-of-words embedder: tokens are hashed into `dimension` buckets and the
/// result is L2-normalised. Needs no model server.
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_id: format!("hashing-{}", dimension.max(1)),
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        let text = text.nfc().collect::<String>().to_lowercase();
        let text = NON_WORD.replace_all(&text, " ");

        text.split_whitespace()
            .filter(|&token| !STOP_WORDS.contains(token))
            .map(|token| token.to_string())
            .collect()
    }

    fn vectorize(&self, text: &str) -> Array1<f32> {
        let mut vector = Array1::<f32>::zeros(self.dimension);
        for token in Self::tokenize(text) {
            let mut hasher = FxHasher::default();
            hasher.write(token.as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            // High bit picks the sign so colliding tokens tend to cancel out.
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.dot(&vector).sqrt();
        if norm > 0.0 {
            vector /= norm;
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text).to_vec())
    }
}

/// The embedder selected by configuration.
pub enum EmbeddingBackend {
    Ollama(OllamaEmbedder),
    Hashing(HashingEmbedder),
}

impl EmbeddingBackend {
    pub fn from_config(config: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        Ok(match config.provider {
            EmbeddingProvider::Ollama => EmbeddingBackend::Ollama(OllamaEmbedder::new(
                config.model.clone(),
                config.endpoint.clone(),
                timeout,
            )?),
            EmbeddingProvider::Hashing => {
                EmbeddingBackend::Hashing(HashingEmbedder::new(config.dimension))
            }
        })
    }
}

impl Embedder for EmbeddingBackend {
    fn model_id(&self) -> &str {
        match self {
            EmbeddingBackend::Ollama(e) => e.model_id(),
            EmbeddingBackend::Hashing(e) => e.model_id(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            EmbeddingBackend::Ollama(e) => e.embed(text).await,
            EmbeddingBackend::Hashing(e) => e.embed(text).await,
        }
    }
}
