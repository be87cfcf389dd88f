use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use tracing::{debug, info};

use crate::{
    config::CompiledRateLimitConfig,
    error::{RateLimitError, Result},
    metrics::Metrics,
    store::KeyspaceStore,
    utils::KeyScheme,
};

/// Read-only view of the configuration and of the access logs currently held
/// by the shared store, plus the global flush used for maintenance.
pub struct Registry {
    config: Arc<CompiledRateLimitConfig>,
    store: Arc<dyn KeyspaceStore>,
    keys: KeyScheme,
    metrics: Option<Arc<Metrics>>,
}

impl Registry {
    pub fn new(config: Arc<CompiledRateLimitConfig>, store: Arc<dyn KeyspaceStore>) -> Self {
        Self {
            config,
            store,
            keys: KeyScheme::default(),
            metrics: None,
        }
    }

    pub fn with_key_scheme(mut self, keys: KeyScheme) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Configured services in lexicographic order
    pub fn list_services(&self) -> Vec<String> {
        self.config.services().map(|(name, _)| name.to_string()).collect()
    }

    /// `(window_seconds, max_count)` pairs of a service, ascending by window
    pub fn tiers_for(&self, service: &str) -> Result<Vec<(u64, u64)>> {
        let limits = self
            .config
            .find_service(service)
            .ok_or_else(|| RateLimitError::UnknownService(service.to_string()))?;
        Ok(limits
            .tiers()
            .iter()
            .map(|tier| (tier.window_seconds, tier.max_count))
            .collect())
    }

    /// Consumers with a live access log, grouped by service
    pub async fn all_consumers(&self) -> Result<BTreeMap<String, HashSet<String>>> {
        let keys = self.store.scan_keys(&self.keys.pattern()).await?;

        let mut consumers: BTreeMap<String, HashSet<String>> = BTreeMap::new();
        for key in &keys {
            match self.keys.parse_key(key) {
                Some((service, consumer)) => {
                    consumers
                        .entry(service.to_string())
                        .or_default()
                        .insert(consumer.to_string());
                }
                None => debug!(key = %key, "Skipping key outside the access log naming scheme"),
            }
        }
        Ok(consumers)
    }

    /// Delete every access log of every service, returning how many were removed
    pub async fn flush_all(&self) -> Result<u64> {
        let keys = self.store.scan_keys(&self.keys.pattern()).await?;
        let removed = self.store.delete_keys(&keys).await?;

        info!(removed, "Flushed access logs");
        if let Some(metrics) = &self.metrics {
            metrics.record_flushed_keys(removed);
        }
        Ok(removed)
    }
}
