use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    config::{CompiledRateLimitConfig, Tier},
    error::{RateLimitError, Result},
    metrics::Metrics,
    store::AccessLogStore,
    utils::{Clock, KeyScheme},
};

/// Sliding-window limiter enforcing every tier of a service at once.
///
/// Each (service, consumer) pair owns one list in the shared store holding
/// the most recent access timestamps, newest first, capped at the largest
/// tier's count plus one. A tier allowing `n` accesses per `w` seconds is
/// exceeded exactly when the entry at index `n` is younger than `w` seconds.
pub struct RateLimiter {
    config: Arc<CompiledRateLimitConfig>,
    store: Arc<dyn AccessLogStore>,
    clock: Arc<dyn Clock>,
    keys: KeyScheme,
    metrics: Option<Arc<Metrics>>,
}

impl RateLimiter {
    pub fn new(
        config: Arc<CompiledRateLimitConfig>,
        store: Arc<dyn AccessLogStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
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

    pub fn config(&self) -> &CompiledRateLimitConfig {
        &self.config
    }

    pub fn key_scheme(&self) -> &KeyScheme {
        &self.keys
    }

    /// Record an access by `consumer` to `service` and report whether it is
    /// within every configured tier.
    ///
    /// The access is recorded even when the answer is `false`.
    pub async fn check_and_record(&self, service: &str, consumer: &str) -> Result<bool> {
        if service.is_empty() {
            return Err(RateLimitError::InvalidArgument(
                "service must not be empty".to_string(),
            ));
        }
        if consumer.is_empty() {
            return Err(RateLimitError::InvalidArgument(
                "consumer must not be empty".to_string(),
            ));
        }
        self.keys.validate_consumer(consumer)?;

        let limits = self
            .config
            .find_service(service)
            .ok_or_else(|| RateLimitError::UnknownService(service.to_string()))?;

        let key = self.keys.access_log_key(service, consumer);
        let now = self.clock.unix_now();
        let _timer = self.metrics.as_ref().map(|m| m.start_check_timer());
        let probed = match self
            .store
            .record_and_probe(
                &key,
                now,
                limits.log_capacity(),
                limits.max_window_seconds(),
                limits.probe_positions(),
            )
            .await
        {
            Ok(probed) => probed,
            Err(e) => {
                warn!(service, consumer, "Failed to record access: {}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_store_error("record_and_probe");
                }
                return Err(e);
            }
        };

        let within_limits = match first_exceeded_tier(limits.tiers(), &probed, now) {
            Some(tier) => {
                debug!(
                    service,
                    consumer,
                    window_seconds = tier.window_seconds,
                    max_count = tier.max_count,
                    "Rate limit exceeded"
                );
                false
            }
            None => true,
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(service, within_limits);
        }
        Ok(within_limits)
    }

    /// Health check for the underlying store
    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }
}

/// First tier (ascending window) whose `max_count`-th older entry still lies
/// inside the tier's window. `probed[i]` is the log entry at `tiers[i].max_count`.
fn first_exceeded_tier(tiers: &[Tier], probed: &[Option<i64>], now: i64) -> Option<Tier> {
    tiers
        .iter()
        .zip(probed)
        .find(|(tier, entry)| match entry {
            Some(timestamp) => {
                let window = i64::try_from(tier.window_seconds).unwrap_or(i64::MAX);
                *timestamp > now.saturating_sub(window)
            }
            None => false,
        })
        .map(|(tier, _)| *tier)
}
