use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::Mutex;

use crate::{
    config::MAX_WINDOW_SECONDS,
    error::{RateLimitError, Result},
    utils::{glob_match, Clock},
};

/// Store capability used on the hot path.
///
/// Implementations must apply the whole batch in order for a single key so
/// that the probed positions reflect the entry just pushed.
#[async_trait]
pub trait AccessLogStore: Send + Sync {
    /// Push `timestamp` to the front of the list at `key`, keep only the first
    /// `keep` entries, (re)set its time-to-live to `ttl_secs`, then return the
    /// entry at each of `positions` (zero-based, `None` when the list is shorter).
    async fn record_and_probe(
        &self,
        key: &str,
        timestamp: i64,
        keep: usize,
        ttl_secs: u64,
        positions: &[usize],
    ) -> Result<Vec<Option<i64>>>;

    /// Health check for the store
    async fn health_check(&self) -> Result<()>;
}

/// Store capability used by maintenance and introspection
#[async_trait]
pub trait KeyspaceStore: Send + Sync {
    /// Every live key matching a glob pattern (`*`, `?`, `\` escapes)
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete keys, returning how many actually existed
    async fn delete_keys(&self, keys: &[String]) -> Result<u64>;
}

#[derive(Debug)]
struct StoredLog {
    entries: VecDeque<i64>,
    expires_at: i64,
}

/// In-process store with the same list and expiry semantics as Redis.
///
/// Expiry is evaluated against the supplied clock, so tests can drive it
/// with a `ManualClock`.
#[derive(Debug)]
pub struct MemoryStore {
    logs: Mutex<HashMap<String, StoredLog>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Current length of the log at `key`, 0 when absent or expired
    pub async fn log_len(&self, key: &str) -> usize {
        let now = self.clock.unix_now();
        let logs = self.logs.lock().await;
        match logs.get(key) {
            Some(log) if log.expires_at > now => log.entries.len(),
            _ => 0,
        }
    }

    fn purge_expired(logs: &mut HashMap<String, StoredLog>, now: i64) {
        logs.retain(|_, log| log.expires_at > now);
    }
}

#[async_trait]
impl AccessLogStore for MemoryStore {
    async fn record_and_probe(
        &self,
        key: &str,
        timestamp: i64,
        keep: usize,
        ttl_secs: u64,
        positions: &[usize],
    ) -> Result<Vec<Option<i64>>> {
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .filter(|_| keep > 0 && ttl_secs <= MAX_WINDOW_SECONDS)
            .ok_or_else(|| {
                RateLimitError::InvalidArgument(format!(
                    "log capacity {} or ttl {} is out of range",
                    keep, ttl_secs
                ))
            })?;

        let now = self.clock.unix_now();
        let mut logs = self.logs.lock().await;

        let log = logs.entry(key.to_string()).or_insert_with(|| StoredLog {
            entries: VecDeque::new(),
            expires_at: now,
        });
        if log.expires_at <= now {
            log.entries.clear();
        }

        log.entries.push_front(timestamp);
        log.entries.truncate(keep);
        log.expires_at = now.saturating_add(ttl);

        Ok(positions
            .iter()
            .map(|&position| log.entries.get(position).copied())
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl KeyspaceStore for MemoryStore {
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let now = self.clock.unix_now();
        let mut logs = self.logs.lock().await;
        Self::purge_expired(&mut logs, now);

        Ok(logs
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64> {
        let now = self.clock.unix_now();
        let mut logs = self.logs.lock().await;
        Self::purge_expired(&mut logs, now);

        let mut removed = 0;
        for key in keys {
            if logs.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(1_000);
        (MemoryStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_record_and_probe_pushes_to_front() {
        let (store, _clock) = store();

        let probed = store.record_and_probe("k", 1, 3, 60, &[0, 1]).await.unwrap();
        assert_eq!(probed, vec![Some(1), None]);

        let probed = store.record_and_probe("k", 2, 3, 60, &[0, 1, 2]).await.unwrap();
        assert_eq!(probed, vec![Some(2), Some(1), None]);
    }

    #[tokio::test]
    async fn test_log_is_truncated() {
        let (store, _clock) = store();
        for t in 0..10 {
            store.record_and_probe("k", t, 3, 60, &[]).await.unwrap();
        }
        assert_eq!(store.log_len("k").await, 3);

        let probed = store.record_and_probe("k", 10, 3, 60, &[0, 2, 3]).await.unwrap();
        assert_eq!(probed, vec![Some(10), Some(8), None]);
    }

    #[tokio::test]
    async fn test_log_expires_after_ttl() {
        let (store, clock) = store();
        store.record_and_probe("k", 1, 5, 60, &[]).await.unwrap();
        store.record_and_probe("k", 2, 5, 60, &[]).await.unwrap();

        clock.advance(59);
        assert_eq!(store.log_len("k").await, 2);

        // every access refreshes the expiry
        store.record_and_probe("k", 3, 5, 60, &[]).await.unwrap();
        clock.advance(59);
        assert_eq!(store.log_len("k").await, 3);

        clock.advance(1);
        assert_eq!(store.log_len("k").await, 0);
        assert!(store.scan_keys("*").await.unwrap().is_empty());

        let probed = store.record_and_probe("k", 4, 5, 60, &[0, 1]).await.unwrap();
        assert_eq!(probed, vec![Some(4), None]);
    }

    #[tokio::test]
    async fn test_out_of_range_batch_rejected() {
        let (store, _clock) = store();

        let result = store.record_and_probe("k", 1, 2, u64::MAX, &[0]).await;
        assert!(matches!(result, Err(RateLimitError::InvalidArgument(_))));
        assert!(store.record_and_probe("k", 1, 0, 60, &[0]).await.is_err());
        assert_eq!(store.log_len("k").await, 0);
    }

    #[tokio::test]
    async fn test_scan_and_delete() {
        let (store, _clock) = store();
        for key in ["ratelimit:a:x", "ratelimit:a:y", "other:b:z"] {
            store.record_and_probe(key, 1, 2, 60, &[]).await.unwrap();
        }

        let mut keys = store.scan_keys("ratelimit:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ratelimit:a:x", "ratelimit:a:y"]);

        let removed = store
            .delete_keys(&["ratelimit:a:x".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.scan_keys("ratelimit:*").await.unwrap(), vec!["ratelimit:a:y"]);
    }
}
