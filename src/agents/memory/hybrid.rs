//! Buffer for recency, similarity store for recall

use async_trait::async_trait;

use super::{BufferMemory, Memory, SimilarityMemory};
use crate::agents::domain::Message;
use crate::agents::error::MemoryResult;

pub struct HybridMemory {
    buffer: BufferMemory,
    similarity: SimilarityMemory,
}

impl HybridMemory {
    pub fn new(buffer: BufferMemory, similarity: SimilarityMemory) -> Self {
        Self { buffer, similarity }
    }
}

#[async_trait]
impl Memory for HybridMemory {
    /// Writes to both stores; the similarity store goes first so an
    /// embedding failure leaves the buffer untouched
    async fn add(&self, message: Message) -> MemoryResult<()> {
        self.similarity.add(message.clone()).await?;
        self.buffer.add(message).await
    }

    async fn get(&self, limit: Option<usize>) -> MemoryResult<Vec<Message>> {
        self.buffer.get(limit).await
    }

    async fn search(&self, query: &str, limit: usize) -> MemoryResult<Vec<Message>> {
        self.similarity.search(query, limit).await
    }

    async fn clear(&self) -> MemoryResult<()> {
        self.buffer.clear().await?;
        self.similarity.clear().await
    }
}
