//! In-memory audit sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKeyId, KeyUsageStats};
use crate::domain::audit::{summarize, AuditEntry, AuditId, AuditSink};
use crate::domain::DomainError;

/// Audit sink that keeps entries in insertion order
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
    index: RwLock<HashMap<AuditId, usize>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, oldest first
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, id: AuditId) -> Option<AuditEntry> {
        let index = self.index.read().await;
        let position = *index.get(&id)?;
        self.entries.read().await.get(position).cloned()
    }

    /// Usage statistics for a key over entries at or after `since`
    pub async fn stats_for(
        &self,
        key_id: &ApiKeyId,
        since: Option<DateTime<Utc>>,
    ) -> KeyUsageStats {
        let entries = self.entries.read().await;

        summarize(entries.iter().filter(|entry| {
            entry.key_id() == Some(key_id) && since.is_none_or(|since| entry.timestamp() >= since)
        }))
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<AuditId, DomainError> {
        let mut index = self.index.write().await;
        let mut entries = self.entries.write().await;
        let id = entry.id();

        if index.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "Audit entry '{}' already exists",
                id
            )));
        }

        index.insert(id, entries.len());
        entries.push(entry);

        Ok(id)
    }

    async fn update(
        &self,
        id: AuditId,
        status_code: u16,
        response_time_ms: u64,
    ) -> Result<(), DomainError> {
        let index = self.index.read().await;
        let position = *index
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("Audit entry '{}' not found", id)))?;

        let mut entries = self.entries.write().await;
        let slot = entries
            .get_mut(position)
            .ok_or_else(|| DomainError::internal(format!("Audit index out of sync for '{}'", id)))?;

        *slot = slot.with_response(status_code, response_time_ms)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::ApiKeyRecord;
    use crate::domain::auth::{AuthError, Identity, RequestContext, ValidationResult};
    use chrono::Duration;

    fn entry_for(key: &ApiKeyRecord, at: DateTime<Utc>) -> AuditEntry {
        let context = RequestContext::new("GET", "/v1/quizzes")
            .with_source_ip(Some("10.0.0.1".to_string()));
        AuditEntry::for_decision(at, &context, &ValidationResult::valid(Identity::from_key(key)))
    }

    fn key() -> ApiKeyRecord {
        ApiKeyRecord::new(ApiKeyId::generate(), "k", "h", "qk_aaaaaaaa", Utc::now())
    }

    #[tokio::test]
    async fn test_append_and_get() {
        let sink = InMemoryAuditSink::new();
        let entry = entry_for(&key(), Utc::now());
        let id = sink.append(entry.clone()).await.unwrap();

        assert_eq!(id, entry.id());
        assert_eq!(sink.get(id).await, Some(entry));
        assert_eq!(sink.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_append_rejected() {
        let sink = InMemoryAuditSink::new();
        let entry = entry_for(&key(), Utc::now());

        sink.append(entry.clone()).await.unwrap();
        let result = sink.append(entry).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_backfills_once() {
        let sink = InMemoryAuditSink::new();
        let id = sink.append(entry_for(&key(), Utc::now())).await.unwrap();

        sink.update(id, 204, 7).await.unwrap();
        let stored = sink.get(id).await.unwrap();
        assert_eq!(stored.status_code(), Some(204));
        assert_eq!(stored.response_time_ms(), Some(7));

        assert!(sink.update(id, 500, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_entry() {
        let sink = InMemoryAuditSink::new();
        let result = sink.update(AuditId::generate(), 200, 1).await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_stats_for_filters_key_and_window() {
        let sink = InMemoryAuditSink::new();
        let now = Utc::now();
        let mine = key();
        let other = key();

        let recent = sink.append(entry_for(&mine, now)).await.unwrap();
        sink.update(recent, 200, 10).await.unwrap();
        sink.append(entry_for(&mine, now - Duration::days(3)))
            .await
            .unwrap();
        sink.append(entry_for(&other, now)).await.unwrap();
        sink.append(AuditEntry::for_decision(
            now,
            &RequestContext::new("GET", "/"),
            &ValidationResult::invalid(AuthError::UnknownKey),
        ))
        .await
        .unwrap();

        let day = sink.stats_for(mine.id(), Some(now - Duration::days(1))).await;
        assert_eq!(day.total, 1);
        assert_eq!(day.success, 1);
        assert_eq!(day.avg_response_ms, Some(10.0));

        let all = sink.stats_for(mine.id(), None).await;
        assert_eq!(all.total, 2);
    }
}
