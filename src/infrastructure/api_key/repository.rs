//! In-memory key store implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKeyId, ApiKeyRecord, KeyStore, KeyUsageStats, StatsWindow};
use crate::domain::{Clock, DomainError, SystemClock};
use crate::infrastructure::audit::InMemoryAuditSink;

/// In-memory implementation of [`KeyStore`]
///
/// Several records may share a lookup prefix. Usage statistics are computed
/// from an attached [`InMemoryAuditSink`]; without one they are all zero.
#[derive(Debug)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<ApiKeyId, ApiKeyRecord>>,
    prefix_index: RwLock<HashMap<String, Vec<ApiKeyId>>>,
    audit: Option<Arc<InMemoryAuditSink>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            prefix_index: RwLock::new(HashMap::new()),
            audit: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Compute statistics from the given sink
    pub fn with_audit_source(mut self, audit: Arc<InMemoryAuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Clock used to resolve statistics windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKeyRecord>, DomainError> {
        let prefix_index = self.prefix_index.read().await;

        let Some(ids) = prefix_index.get(prefix) else {
            return Ok(Vec::new());
        };

        let keys = self.keys.read().await;
        Ok(ids.iter().filter_map(|id| keys.get(id).cloned()).collect())
    }

    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKeyRecord>, DomainError> {
        let keys = self.keys.read().await;
        Ok(keys.get(id).cloned())
    }

    async fn create(&self, record: ApiKeyRecord) -> Result<ApiKeyId, DomainError> {
        let mut prefix_index = self.prefix_index.write().await;
        let mut keys = self.keys.write().await;
        let id = *record.id();

        if keys.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "API key with ID '{}' already exists",
                id
            )));
        }

        prefix_index
            .entry(record.key_prefix().to_string())
            .or_default()
            .push(id);
        keys.insert(id, record);

        Ok(id)
    }

    async fn touch_usage(
        &self,
        id: &ApiKeyId,
        source_ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut keys = self.keys.write().await;

        let record = keys
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        let last_used_ip = source_ip.or_else(|| record.last_used_ip().map(str::to_string));
        *record = record
            .clone()
            .with_usage(record.usage_count() + 1, Some(at), last_used_ip);

        Ok(())
    }

    async fn set_active(&self, id: &ApiKeyId, active: bool) -> Result<(), DomainError> {
        let mut keys = self.keys.write().await;

        let record = keys
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        *record = record.clone().with_active(active);

        Ok(())
    }

    async fn fetch_stats(
        &self,
        id: &ApiKeyId,
        window: StatsWindow,
    ) -> Result<KeyUsageStats, DomainError> {
        if !self.keys.read().await.contains_key(id) {
            return Err(DomainError::not_found(format!("API key '{}' not found", id)));
        }

        match &self.audit {
            Some(audit) => Ok(audit.stats_for(id, window.since(self.clock.now())).await),
            None => Ok(KeyUsageStats::default()),
        }
    }
}
