//! Vector similarity memory

use async_trait::async_trait;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Memory;
use crate::agents::domain::Message;
use crate::agents::error::{MemoryError, MemoryResult};

/// Turns text into a fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;
}

/// Storage and nearest-neighbour lookup for embeddings
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector stored under `id`
    async fn upsert(&self, id: &str, embedding: Vec<f32>, metadata: Value) -> MemoryResult<()>;

    /// Ids of the `limit` nearest vectors with their scores, best first.
    /// Equal scores keep insertion order.
    async fn query(&self, embedding: &[f32], limit: usize) -> MemoryResult<Vec<(String, f32)>>;

    async fn clear(&self) -> MemoryResult<()>;
}

/// Cosine similarity; 0 when either vector has zero magnitude or the
/// dimensions differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Debug, Clone)]
struct IndexRecord {
    id: String,
    embedding: Vec<f32>,
    #[allow(dead_code)]
    metadata: Value,
}

/// Brute-force index held in memory
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<Vec<IndexRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, id: &str, embedding: Vec<f32>, metadata: Value) -> MemoryResult<()> {
        let mut records = self.records.write().await;
        if let Some(other) = records.iter().find(|r| r.id != id) {
            if other.embedding.len() != embedding.len() {
                return Err(MemoryError::Index(format!(
                    "dimension mismatch: index holds {}, got {}",
                    other.embedding.len(),
                    embedding.len()
                )));
            }
        }
        let record = IndexRecord {
            id: id.to_string(),
            embedding,
            metadata,
        };
        match records.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], limit: usize) -> MemoryResult<Vec<(String, f32)>> {
        let records = self.records.read().await;
        let mut scored: Vec<(String, f32)> = records
            .iter()
            .map(|r| (r.id.clone(), cosine_similarity(embedding, &r.embedding)))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn clear(&self) -> MemoryResult<()> {
        self.records.write().await.clear();
        Ok(())
    }
}

/// A stored message and the metadata indexed alongside its embedding
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub id: String,
    pub message: Message,
    pub metadata: Value,
}

/// Memory searched by embedding similarity
pub struct SimilarityMemory {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    entries: RwLock<Vec<MemoryEntry>>,
}

impl SimilarityMemory {
    /// Similarity memory over an in-memory index
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_index(embedder, Arc::new(InMemoryVectorIndex::new()))
    }

    pub fn with_index(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Stored entries in insertion order
    pub async fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl Memory for SimilarityMemory {
    async fn add(&self, message: Message) -> MemoryResult<()> {
        let embedding = self.embedder.embed(&message.content).await?;
        let id = uuid::Uuid::new_v4().to_string();
        let metadata = json!({
            "role": message.role.to_string(),
            "stored_at": chrono::Utc::now().to_rfc3339(),
        });

        self.index.upsert(&id, embedding, metadata.clone()).await?;
        self.entries.write().await.push(MemoryEntry {
            id,
            message,
            metadata,
        });
        Ok(())
    }

    async fn get(&self, limit: Option<usize>) -> MemoryResult<Vec<Message>> {
        let entries = self.entries.read().await;
        let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
        Ok(entries.iter().skip(skip).map(|e| e.message.clone()).collect())
    }

    async fn search(&self, query: &str, limit: usize) -> MemoryResult<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.query(&embedding, limit).await?;

        let entries = self.entries.read().await;
        Ok(hits
            .iter()
            .filter_map(|(id, _)| entries.iter().find(|e| &e.id == id))
            .map(|e| e.message.clone())
            .collect())
    }

    async fn clear(&self) -> MemoryResult<()> {
        self.index.clear().await?;
        self.entries.write().await.clear();
        Ok(())
    }
}
