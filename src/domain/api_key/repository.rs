//! Key store contract
//!
//! The persistence collaborator owns API key records. This trait is the only
//! way the core reads or writes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(test)]
use mockall::automock;

use super::entity::{ApiKeyId, ApiKeyRecord, KeyUsageStats, StatsWindow};
use crate::domain::DomainError;

/// Read/write access to persisted API key records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// All records whose stored prefix equals `prefix`
    ///
    /// More than one record may share a prefix; callers verify the secret
    /// against each candidate.
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKeyRecord>, DomainError>;

    /// Get a record by ID
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKeyRecord>, DomainError>;

    /// Persist a new record
    async fn create(&self, record: ApiKeyRecord) -> Result<ApiKeyId, DomainError>;

    /// Atomically bump the usage counter and last-used timestamp/IP
    async fn touch_usage(
        &self,
        id: &ApiKeyId,
        ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Activate or revoke a key
    async fn set_active(&self, id: &ApiKeyId, active: bool) -> Result<(), DomainError>;

    /// Request statistics for a key over a reporting window
    async fn fetch_stats(
        &self,
        id: &ApiKeyId,
        window: StatsWindow,
    ) -> Result<KeyUsageStats, DomainError>;
}
