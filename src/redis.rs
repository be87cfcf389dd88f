use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, AsyncIter, RedisResult};
use std::{future::Future, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    config::MAX_WINDOW_SECONDS,
    error::{RateLimitError, Result},
    store::{AccessLogStore, KeyspaceStore},
};

/// Redis client configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout: Option<Duration>,
    pub command_timeout: Option<Duration>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Some(Duration::from_secs(5)),
            command_timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// Access log store backed by Redis lists
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisConfig,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with PING
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        info!("Creating Redis client for URL: {}", config.url);

        let client = redis::Client::open(config.url.clone()).map_err(|e| {
            warn!("Failed to create Redis client: {}", e);
            RateLimitError::from(e)
        })?;

        let connect_timeout = config.connection_timeout.unwrap_or(Duration::from_secs(10));
        let connection = match tokio::time::timeout(connect_timeout, client.get_connection_manager()).await {
            Ok(Ok(conn)) => {
                info!("Connection manager established successfully");
                conn
            }
            Ok(Err(e)) => {
                warn!("Failed to create connection manager: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    "Timeout while creating connection manager ({}s)",
                    connect_timeout.as_secs()
                );
                return Err(RateLimitError::StoreUnavailable(
                    "Timeout while creating Redis connection manager".to_string(),
                ));
            }
        };

        let store = Self { connection, config };
        store.ping().await?;

        info!("Redis store initialized successfully");
        Ok(store)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        self.run("PING", async move {
            redis::cmd("PING").query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    /// Run a Redis future under the configured command timeout
    async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        within(self.config.command_timeout, operation, fut)
            .await?
            .map_err(|e| {
                warn!(operation, "Redis command failed: {}", e);
                RateLimitError::from(e)
            })
    }
}

/// Await `fut`, failing with `StoreUnavailable` once `limit` elapses
async fn within<T, F>(limit: Option<Duration>, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            warn!(operation, "Redis command timed out after {:?}", limit);
            RateLimitError::StoreUnavailable(format!("{} timed out after {:?}", operation, limit))
        }),
        None => Ok(fut.await),
    }
}

/// Arguments of the record-and-probe pipeline in the integer types Redis takes:
/// the LTRIM stop index, the EXPIRE seconds and the LINDEX positions.
fn pipeline_arguments(
    keep: usize,
    ttl_secs: u64,
    positions: &[usize],
) -> Result<(isize, i64, Vec<isize>)> {
    let out_of_range = |what: &str, value: String| {
        RateLimitError::InvalidArgument(format!("{} {} is out of range for Redis", what, value))
    };

    if keep == 0 {
        return Err(out_of_range("log capacity", keep.to_string()));
    }
    let stop = isize::try_from(keep - 1)
        .map_err(|_| out_of_range("log capacity", keep.to_string()))?;
    let ttl = i64::try_from(ttl_secs)
        .ok()
        .filter(|_| ttl_secs <= MAX_WINDOW_SECONDS)
        .ok_or_else(|| out_of_range("ttl", ttl_secs.to_string()))?;
    let indexes = positions
        .iter()
        .map(|&position| {
            isize::try_from(position).map_err(|_| out_of_range("position", position.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((stop, ttl, indexes))
}

#[async_trait]
impl AccessLogStore for RedisStore {
    async fn record_and_probe(
        &self,
        key: &str,
        timestamp: i64,
        keep: usize,
        ttl_secs: u64,
        positions: &[usize],
    ) -> Result<Vec<Option<i64>>> {
        let (stop, ttl, indexes) = pipeline_arguments(keep, ttl_secs, positions)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .lpush(key, timestamp)
            .ignore()
            .ltrim(key, 0, stop)
            .ignore()
            .expire(key, ttl)
            .ignore();
        for index in indexes {
            pipe.lindex(key, index);
        }

        let mut conn = self.connection.clone();
        let probed: Vec<Option<i64>> = self
            .run("record_and_probe", async move { pipe.query_async(&mut conn).await })
            .await?;

        if probed.len() != positions.len() {
            return Err(RateLimitError::StoreUnavailable(format!(
                "Expected {} LINDEX replies, got {}",
                positions.len(),
                probed.len()
            )));
        }
        Ok(probed)
    }

    async fn health_check(&self) -> Result<()> {
        self.ping().await
    }
}

#[async_trait]
impl KeyspaceStore for RedisStore {
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let mut iter: AsyncIter<String> = self.run("scan", conn.scan_match(pattern)).await?;

        // the timeout covers one cursor step, not the whole keyspace
        let mut keys = Vec::new();
        while let Some(key) = within(self.config.command_timeout, "scan", iter.next_item()).await? {
            keys.push(key);
        }

        debug!(pattern, count = keys.len(), "Scanned Redis keys");
        Ok(keys)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();
        self.run("del", async move { conn.del(keys.to_vec()).await }).await
    }
}
