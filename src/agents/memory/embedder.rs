//! Embedding backends for similarity memory

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::sync::Arc;

use super::Embedder;
use crate::agents::config::EmbedderConfig;
use crate::agents::error::{MemoryError, MemoryResult};

/// Build the embedder described by configuration
pub fn create_embedder(config: &EmbedderConfig) -> MemoryResult<Arc<dyn Embedder>> {
    match config {
        EmbedderConfig::Hashing { dimensions } => Ok(Arc::new(HashingEmbedder::new(*dimensions))),
        EmbedderConfig::OpenAI {
            model,
            api_key_env,
            base_url,
        } => Ok(Arc::new(OpenAiEmbedder::new(
            model,
            api_key_env.as_deref(),
            base_url.as_deref(),
        )?)),
    }
}

/// Local bag-of-words embedder using signed feature hashing.
///
/// Deterministic across runs and platforms. Output vectors are L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Synchronous embedding
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let slot = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

/// OpenAI `/embeddings` client
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(model: &str, api_key_env: Option<&str>, base_url: Option<&str>) -> MemoryResult<Self> {
        let var = api_key_env.unwrap_or("OPENAI_API_KEY");
        let api_key = env::var(var)
            .map_err(|_| MemoryError::Embedding(format!("Environment variable {} not set", var)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or("https://api.openai.com/v1").to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::Embedding(format!("{} - {}", status.as_u16(), body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::Embedding(format!("Failed to parse response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::Embedding("empty embedding response".to_string()))
    }
}
