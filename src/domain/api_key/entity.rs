//! API key record and related value types

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::ApiKeyValidationError;

/// Opaque API key identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyId(Uuid);

impl ApiKeyId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its string form
    pub fn parse(id: &str) -> Result<Self, ApiKeyValidationError> {
        Uuid::parse_str(id)
            .map(Self)
            .map_err(|_| ApiKeyValidationError::InvalidId(id.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ApiKeyId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for ApiKeyId {
    type Err = ApiKeyValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, uninterpreted metadata attached to records and audit entries
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A persisted API key
///
/// Records are immutable values: the store hands out fresh copies on every
/// read and applies usage updates server-side. The secret hash is excluded
/// from serialization and from `Debug` output.
#[derive(Clone, Serialize)]
pub struct ApiKeyRecord {
    id: ApiKeyId,
    #[serde(skip_serializing)]
    secret_hash: String,
    key_prefix: String,
    name: String,
    scopes: BTreeSet<String>,
    admin: bool,
    hourly_quota: i64,
    daily_quota: i64,
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_ip: Option<String>,
    usage_count: u64,
    metadata: Metadata,
}

impl ApiKeyRecord {
    /// Start a new active record with no scopes and zero quotas
    pub fn new(
        id: ApiKeyId,
        name: impl Into<String>,
        secret_hash: impl Into<String>,
        key_prefix: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            secret_hash: secret_hash.into(),
            key_prefix: key_prefix.into(),
            name: name.into(),
            scopes: BTreeSet::new(),
            admin: false,
            hourly_quota: 0,
            daily_quota: 0,
            active: true,
            expires_at: None,
            created_at,
            created_by: None,
            last_used_at: None,
            last_used_ip: None,
            usage_count: 0,
            metadata: Metadata::new(),
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

    pub fn with_quotas(mut self, hourly: i64, daily: i64) -> Self {
        self.hourly_quota = hourly;
        self.daily_quota = daily;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_expiration(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_created_by(mut self, created_by: Option<String>) -> Self {
        self.created_by = created_by;
        self
    }

    /// Restore usage bookkeeping as read from the store
    pub fn with_usage(
        mut self,
        usage_count: u64,
        last_used_at: Option<DateTime<Utc>>,
        last_used_ip: Option<String>,
    ) -> Self {
        self.usage_count = usage_count;
        self.last_used_at = last_used_at;
        self.last_used_ip = last_used_ip;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.id
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn hourly_quota(&self) -> i64 {
        self.hourly_quota
    }

    pub fn daily_quota(&self) -> i64 {
        self.daily_quota
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn last_used_ip(&self) -> Option<&str> {
        self.last_used_ip.as_deref()
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Whether the key's expiry has passed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl std::fmt::Debug for ApiKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyRecord")
            .field("id", &self.id)
            .field("secret_hash", &"[hidden]")
            .field("key_prefix", &self.key_prefix)
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("admin", &self.admin)
            .field("hourly_quota", &self.hourly_quota)
            .field("daily_quota", &self.daily_quota)
            .field("active", &self.active)
            .field("expires_at", &self.expires_at)
            .field("usage_count", &self.usage_count)
            .finish_non_exhaustive()
    }
}

/// Reporting window for key usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsWindow {
    LastHour,
    #[default]
    LastDay,
    LastWeek,
    AllTime,
}

impl StatsWindow {
    /// Lower bound (inclusive) of the window ending at `now`
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::LastHour => Some(now - Duration::hours(1)),
            Self::LastDay => Some(now - Duration::days(1)),
            Self::LastWeek => Some(now - Duration::weeks(1)),
            Self::AllTime => None,
        }
    }
}

impl FromStr for StatsWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last_hour" | "hour" => Ok(Self::LastHour),
            "last_day" | "day" => Ok(Self::LastDay),
            "last_week" | "week" => Ok(Self::LastWeek),
            "all_time" | "all" => Ok(Self::AllTime),
            other => Err(format!("Unknown stats window: {}", other)),
        }
    }
}

/// Aggregated request statistics for a single key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyUsageStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub unauthorized: u64,
    pub rate_limited: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_response_ms: Option<f64>,
    pub unique_ips: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ApiKeyRecord {
        ApiKeyRecord::new(
            ApiKeyId::generate(),
            "Grader",
            "$argon2id$v=19$...",
            "qk_abcdefgh",
            Utc::now(),
        )
    }

    #[test]
    fn test_api_key_id_round_trip_through_string() {
        let id = ApiKeyId::generate();
        let parsed: ApiKeyId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_api_key_id_rejects_garbage() {
        assert_eq!(
            ApiKeyId::parse("not-a-key"),
            Err(ApiKeyValidationError::InvalidId("not-a-key".to_string()))
        );
    }

    #[test]
    fn test_new_record_defaults() {
        let key = record();

        assert!(key.is_active());
        assert!(!key.is_admin());
        assert!(key.scopes().is_empty());
        assert_eq!(key.usage_count(), 0);
        assert!(key.last_used_at().is_none());
        assert!(!key.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_builder_methods() {
        let key = record()
            .with_scopes(["quiz:read", "quiz:write"])
            .with_admin(true)
            .with_quotas(10, 100)
            .with_created_by(Some("ops".to_string()));

        assert!(key.scopes().contains("quiz:read"));
        assert!(key.is_admin());
        assert_eq!(key.hourly_quota(), 10);
        assert_eq!(key.daily_quota(), 100);
        assert_eq!(key.created_by(), Some("ops"));
    }

    #[test]
    fn test_expiry_boundary() {
        let expires = Utc::now();
        let key = record().with_expiration(Some(expires));

        assert!(!key.is_expired_at(expires - Duration::seconds(1)));
        assert!(key.is_expired_at(expires));
        assert!(key.is_expired_at(expires + Duration::seconds(1)));
    }

    #[test]
    fn test_secret_hash_never_serialized_or_debugged() {
        let key = record();

        let json = serde_json::to_string(&key).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("secret_hash"));

        let debug = format!("{:?}", key);
        assert!(!debug.contains("argon2"));
        assert!(debug.contains("[hidden]"));
    }

    #[test]
    fn test_stats_window_parse_and_bounds() {
        let now = Utc::now();

        assert_eq!("last_hour".parse::<StatsWindow>(), Ok(StatsWindow::LastHour));
        assert_eq!("week".parse::<StatsWindow>(), Ok(StatsWindow::LastWeek));
        assert!("fortnight".parse::<StatsWindow>().is_err());

        assert_eq!(StatsWindow::LastDay.since(now), Some(now - Duration::days(1)));
        assert_eq!(StatsWindow::AllTime.since(now), None);
    }
}
