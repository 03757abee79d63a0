//! Memory backends for agent conversations
//!
//! - Buffer: bounded recency window, substring search
//! - Similarity: embeddings plus a vector index, nearest-neighbour search
//! - Hybrid: buffer for recency, similarity store for recall
//!
//! Nothing here is persisted; memory lives as long as its orchestrator.

mod buffer;
mod embedder;
mod hybrid;
mod similarity;

pub use buffer::BufferMemory;
pub use embedder::{create_embedder, HashingEmbedder, OpenAiEmbedder};
pub use hybrid::HybridMemory;
pub use similarity::{
    cosine_similarity, Embedder, InMemoryVectorIndex, MemoryEntry, SimilarityMemory, VectorIndex,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::agents::config::{MemoryBackend, MemoryConfig};
use crate::agents::domain::Message;
use crate::agents::error::MemoryResult;

/// Trait for conversation memory backends
#[async_trait]
pub trait Memory: Send + Sync {
    /// Store a message
    async fn add(&self, message: Message) -> MemoryResult<()>;

    /// Stored messages in chronological order; `Some(n)` keeps the most recent `n`
    async fn get(&self, limit: Option<usize>) -> MemoryResult<Vec<Message>>;

    /// Up to `limit` messages relevant to `query`, most relevant first
    async fn search(&self, query: &str, limit: usize) -> MemoryResult<Vec<Message>>;

    /// Remove everything
    async fn clear(&self) -> MemoryResult<()>;
}

/// Create a memory backend from configuration; `None` when memory is disabled
pub fn create_memory(config: &MemoryConfig) -> MemoryResult<Option<Arc<dyn Memory>>> {
    let memory: Arc<dyn Memory> = match config.backend {
        MemoryBackend::None => return Ok(None),
        MemoryBackend::Buffer => Arc::new(BufferMemory::new(config.max_messages)),
        MemoryBackend::Similarity => Arc::new(SimilarityMemory::new(create_embedder(&config.embedder)?)),
        MemoryBackend::Hybrid => Arc::new(HybridMemory::new(
            BufferMemory::new(config.max_messages),
            SimilarityMemory::new(create_embedder(&config.embedder)?),
        )),
    };
    Ok(Some(memory))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_per_backend() {
        let mut config = MemoryConfig::default();
        assert!(create_memory(&config).unwrap().is_none());

        for backend in [MemoryBackend::Buffer, MemoryBackend::Similarity, MemoryBackend::Hybrid] {
            config.backend = backend;
            let memory = create_memory(&config).unwrap().unwrap();
            memory.add(Message::user("remember the tulips")).await.unwrap();
            let found = memory.search("tulips", 1).await.unwrap();
            assert_eq!(found[0].content, "remember the tulips");
        }
    }
}
