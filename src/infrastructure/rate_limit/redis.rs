//! Redis counter store

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Client;

use crate::domain::api_key::ApiKeyId;
use crate::domain::rate_limit::{CounterStore, WindowKind};
use crate::domain::DomainError;

/// Seconds a window's counter outlives the window itself
const EXPIRY_GRACE_SECS: i64 = 60;

/// Configuration for the Redis counter store
#[derive(Debug, Clone)]
pub struct RedisCounterConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Leading key segment
    pub namespace: String,
}

impl Default for RedisCounterConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            namespace: "ratelimit".to_string(),
        }
    }
}

impl RedisCounterConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Counter store shared by every instance through Redis
///
/// Each increment is a `MULTI INCR EXPIRE EXEC` transaction on
/// `ratelimit:{keyId}:{hour|day}:{windowStartEpoch}`, so concurrent callers
/// across processes observe each other's increments.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    config: RedisCounterConfig,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCounterStore {
    pub async fn new(config: RedisCounterConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| DomainError::storage(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection, config })
    }

    pub async fn with_url(url: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(RedisCounterConfig::new(url)).await
    }
}

fn counter_key(
    namespace: &str,
    key_id: &ApiKeyId,
    kind: WindowKind,
    window_start: DateTime<Utc>,
) -> String {
    format!(
        "{}:{}:{}:{}",
        namespace,
        key_id,
        kind,
        window_start.timestamp()
    )
}

fn counter_ttl(kind: WindowKind) -> i64 {
    kind.length().num_seconds() + EXPIRY_GRACE_SECS
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_get(
        &self,
        key_id: &ApiKeyId,
        kind: WindowKind,
        window_start: DateTime<Utc>,
    ) -> Result<i64, DomainError> {
        let key = counter_key(&self.config.namespace, key_id, kind, window_start);
        let mut conn = self.connection.clone();

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(&key, 1i64)
            .expire(&key, counter_ttl(kind))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to increment counter '{}': {}", key, e))
            })?;

        Ok(count)
    }
}
