//! API key administration
//!
//! Creation, revocation and usage statistics for API keys.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::api_key::{
    validate_expiry_days, validate_key_name, validate_scopes, ApiKeyId, ApiKeyRecord, KeyStore,
    KeyUsageStats, Metadata, StatsWindow,
};
use crate::domain::{Clock, DomainError};
use crate::infrastructure::secret::SecretHasher;

use super::generator::ApiKeyGenerator;

/// Quotas applied when a creation request leaves them out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDefaults {
    pub hourly: i64,
    pub daily: i64,
}

impl Default for QuotaDefaults {
    fn default() -> Self {
        Self {
            hourly: 1000,
            daily: 10000,
        }
    }
}

/// Request to create an API key
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub admin: bool,
    pub hourly_quota: Option<i64>,
    pub daily_quota: Option<i64>,
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CreateApiKeyRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_quotas(mut self, hourly: Option<i64>, daily: Option<i64>) -> Self {
        self.hourly_quota = hourly;
        self.daily_quota = daily;
        self
    }

    pub fn with_expires_in_days(mut self, days: Option<i64>) -> Self {
        self.expires_in_days = days;
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        validate_key_name(&self.name).map_err(|e| DomainError::validation(e.to_string()))?;
        validate_scopes(&self.scopes).map_err(|e| DomainError::validation(e.to_string()))?;

        if let Some(days) = self.expires_in_days {
            validate_expiry_days(days).map_err(|e| DomainError::validation(e.to_string()))?;
        }

        Ok(())
    }
}

/// A newly created key, carrying the only copy of its plaintext
#[derive(Clone, Serialize)]
pub struct CreatedApiKey {
    pub plaintext_key: String,
    pub key_id: ApiKeyId,
    pub prefix: String,
    pub name: String,
    pub scopes: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for CreatedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedApiKey")
            .field("plaintext_key", &"[redacted]")
            .field("key_id", &self.key_id)
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// API key service for managing API keys
pub struct ApiKeyService {
    store: Arc<dyn KeyStore>,
    hasher: Arc<dyn SecretHasher>,
    generator: ApiKeyGenerator,
    defaults: QuotaDefaults,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ApiKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyService")
            .field("generator", &self.generator)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl ApiKeyService {
    pub fn new(
        store: Arc<dyn KeyStore>,
        hasher: Arc<dyn SecretHasher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            generator: ApiKeyGenerator::default(),
            defaults: QuotaDefaults::default(),
            clock,
        }
    }

    pub fn with_generator(mut self, generator: ApiKeyGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_defaults(mut self, defaults: QuotaDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Create a new API key
    ///
    /// The plaintext key is generated, hashed for storage and returned once.
    pub async fn create_api_key(
        &self,
        request: CreateApiKeyRequest,
        created_by: Option<String>,
    ) -> Result<CreatedApiKey, DomainError> {
        request.validate()?;

        let generated = self.generator.generate();
        let secret_hash = self.hash_off_thread(generated.key.clone()).await?;

        let now = self.clock.now();
        let expires_at = request.expires_in_days.map(|days| now + Duration::days(days));
        let name = request.name.trim().to_string();

        let record = ApiKeyRecord::new(
            ApiKeyId::generate(),
            &name,
            secret_hash,
            &generated.prefix,
            now,
        )
        .with_scopes(request.scopes.iter().cloned())
        .with_admin(request.admin)
        .with_quotas(
            request.hourly_quota.unwrap_or(self.defaults.hourly),
            request.daily_quota.unwrap_or(self.defaults.daily),
        )
        .with_expiration(expires_at)
        .with_created_by(created_by)
        .with_metadata(request.metadata);

        let key_id = self.store.create(record).await?;

        info!(
            key_id = %key_id,
            prefix = %generated.prefix,
            name = %name,
            admin = request.admin,
            "API key created"
        );

        Ok(CreatedApiKey {
            plaintext_key: generated.key,
            key_id,
            prefix: generated.prefix,
            name,
            scopes: request.scopes,
            created_at: now,
            expires_at,
        })
    }

    /// Get an API key by ID
    pub async fn get(&self, id: &ApiKeyId) -> Result<ApiKeyRecord, DomainError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))
    }

    /// Deactivate an API key; later requests with it resolve as revoked
    pub async fn revoke(&self, id: &ApiKeyId) -> Result<ApiKeyRecord, DomainError> {
        self.store.set_active(id, false).await?;

        info!(key_id = %id, "API key revoked");

        self.get(id).await
    }

    /// Usage statistics for a key
    pub async fn stats(
        &self,
        id: &ApiKeyId,
        window: StatsWindow,
    ) -> Result<KeyUsageStats, DomainError> {
        self.store.fetch_stats(id, window).await
    }

    async fn hash_off_thread(&self, secret: String) -> Result<String, DomainError> {
        let hasher = self.hasher.clone();

        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| DomainError::internal(format!("Hashing task failed: {}", e)))?
    }
}
