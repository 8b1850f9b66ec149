use std::fmt;
use std::sync::Arc;

use moka::future::Cache;

use super::LlmProviderFactory;
use crate::domain::{LlmError, LlmProvider, ProviderConfig};

const DEFAULT_CAPACITY: u64 = 100;

type Builder = dyn Fn(&ProviderConfig) -> Result<Arc<dyn LlmProvider>, LlmError> + Send + Sync;

#[derive(Clone)]
struct Entry {
    revision: u64,
    provider: Arc<dyn LlmProvider>,
}

/// Caller-owned cache of provider instances keyed by configuration id
///
/// An entry is reused while the configuration's `revision` is unchanged and
/// rebuilt as soon as it differs.
pub struct ProviderRegistry {
    cache: Cache<String, Entry>,
    builder: Arc<Builder>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self::with_builder(capacity, Arc::new(LlmProviderFactory::create))
    }

    fn with_builder(capacity: u64, builder: Arc<Builder>) -> Self {
        Self {
            cache: Cache::builder().max_capacity(capacity).build(),
            builder,
        }
    }

    /// Cached provider for `config`, built on a miss or a revision change
    pub async fn get_or_create(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn LlmProvider>, LlmError> {
        if let Some(entry) = self.cache.get(&config.id).await {
            if entry.revision == config.revision {
                tracing::debug!(provider_id = %config.id, "Cache hit for provider");
                return Ok(entry.provider);
            }

            tracing::debug!(
                provider_id = %config.id,
                cached_revision = entry.revision,
                revision = config.revision,
                "Provider configuration changed, rebuilding"
            );
        }

        let provider = (self.builder)(config)?;
        self.cache
            .insert(
                config.id.clone(),
                Entry {
                    revision: config.revision,
                    provider: Arc::clone(&provider),
                },
            )
            .await;

        Ok(provider)
    }

    /// Drop the cached provider for one configuration
    pub async fn invalidate(&self, id: &str) {
        self.cache.invalidate(id).await;
    }

    /// Drop every cached provider
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Number of cached providers
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
