//! Provider cache keyed by backend and model

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{create_provider, LlmProvider};
use crate::agents::config::{ModelConfig, ProviderKind};
use crate::agents::error::LlmResult;

type ProviderKey = (ProviderKind, String);

/// Cache of constructed providers.
///
/// Entries are created on first request and live as long as the registry.
/// Owned by whoever builds orchestrators; there is no process-wide instance.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<ProviderKey, Arc<dyn LlmProvider>>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached provider for this config, creating it on first use
    pub async fn get_or_create(&self, config: &ModelConfig) -> LlmResult<Arc<dyn LlmProvider>> {
        let key = (config.provider, config.model.clone());

        if let Some(provider) = self.providers.read().await.get(&key) {
            return Ok(provider.clone());
        }

        let mut providers = self.providers.write().await;
        // Another caller may have won the race while we waited for the lock.
        if let Some(provider) = providers.get(&key) {
            return Ok(provider.clone());
        }

        let provider = create_provider(config)?;
        tracing::debug!(provider = %config.provider, model = %config.model, "Created LLM provider");
        providers.insert(key, provider.clone());

        Ok(provider)
    }

    /// Install a provider instance for `(kind, model)`, replacing any cached one
    pub async fn register(
        &self,
        kind: ProviderKind,
        model: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
    ) {
        self.providers.write().await.insert((kind, model.into()), provider);
    }

    /// Number of cached providers
    pub async fn len(&self) -> usize {
        self.providers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.providers.read().await.is_empty()
    }
}
