//! Bounded recency buffer

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;

use super::Memory;
use crate::agents::domain::Message;
use crate::agents::error::MemoryResult;

/// Keeps the most recent `max_messages` messages, evicting the oldest first
pub struct BufferMemory {
    messages: RwLock<VecDeque<Message>>,
    max_messages: usize,
}

impl BufferMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: RwLock::new(VecDeque::with_capacity(max_messages.min(1024))),
            max_messages,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_messages
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl Memory for BufferMemory {
    async fn add(&self, message: Message) -> MemoryResult<()> {
        if self.max_messages == 0 {
            return Ok(());
        }

        let mut messages = self.messages.write().await;
        while messages.len() >= self.max_messages {
            messages.pop_front();
        }
        messages.push_back(message);
        Ok(())
    }

    async fn get(&self, limit: Option<usize>) -> MemoryResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let skip = limit.map_or(0, |n| messages.len().saturating_sub(n));
        Ok(messages.iter().skip(skip).cloned().collect())
    }

    /// Case-insensitive substring match.
    ///
    /// Matches rank above non-matches; within each group newer messages come first.
    async fn search(&self, query: &str, limit: usize) -> MemoryResult<Vec<Message>> {
        let query = query.to_lowercase();
        let messages = self.messages.read().await;

        let (matching, rest): (Vec<&Message>, Vec<&Message>) = messages
            .iter()
            .rev()
            .partition(|m| m.content.to_lowercase().contains(&query));

        Ok(matching
            .into_iter()
            .chain(rest)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn clear(&self) -> MemoryResult<()> {
        self.messages.write().await.clear();
        Ok(())
    }
}
