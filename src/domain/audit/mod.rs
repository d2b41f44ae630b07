//! Audit trail domain
//!
//! One [`AuditEntry`] is written per authorization decision. Entries are
//! append-only; only the two response fields may be back-filled, once.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::domain::api_key::{ApiKeyId, KeyUsageStats, Metadata};
use crate::domain::auth::{RequestContext, ValidationResult};
use crate::domain::DomainError;

/// Identifier of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(Uuid);

impl AuditId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for AuditId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable record of one authorization decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    id: AuditId,
    timestamp: DateTime<Utc>,
    key_id: Option<ApiKeyId>,
    method: String,
    path: String,
    source_ip: Option<String>,
    user_agent: Option<String>,
    request_id: Option<String>,
    status_code: Option<u16>,
    response_time_ms: Option<u64>,
    required_scope: Option<String>,
    authorized: bool,
    rate_limited: bool,
    error_message: Option<String>,
    metadata: Metadata,
}

impl AuditEntry {
    /// Build the entry describing `result` for the request in `context`
    pub fn for_decision(
        timestamp: DateTime<Utc>,
        context: &RequestContext,
        result: &ValidationResult,
    ) -> Self {
        Self {
            id: AuditId::generate(),
            timestamp,
            key_id: result.identity().and_then(|i| i.key_id().copied()),
            method: context.method.clone(),
            path: context.path.clone(),
            source_ip: context.source_ip.clone(),
            user_agent: context.user_agent.clone(),
            request_id: context.request_id.clone(),
            status_code: None,
            response_time_ms: None,
            required_scope: context.required_scope.clone(),
            authorized: result.is_valid(),
            rate_limited: matches!(result, ValidationResult::RateLimited { .. }),
            error_message: result.error().map(|e| e.code().to_string()),
            metadata: context.metadata.clone(),
        }
    }

    /// A copy with the response fields filled
    ///
    /// Fails if they were already filled.
    pub fn with_response(
        &self,
        status_code: u16,
        response_time_ms: u64,
    ) -> Result<Self, DomainError> {
        if self.status_code.is_some() {
            return Err(DomainError::conflict(format!(
                "Audit entry '{}' already has a response recorded",
                self.id
            )));
        }

        Ok(Self {
            status_code: Some(status_code),
            response_time_ms: Some(response_time_ms),
            ..self.clone()
        })
    }

    pub fn id(&self) -> AuditId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn key_id(&self) -> Option<&ApiKeyId> {
        self.key_id.as_ref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source_ip(&self) -> Option<&str> {
        self.source_ip.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn response_time_ms(&self) -> Option<u64> {
        self.response_time_ms
    }

    pub fn required_scope(&self) -> Option<&str> {
        self.required_scope.as_deref()
    }

    pub fn authorized(&self) -> bool {
        self.authorized
    }

    pub fn rate_limited(&self) -> bool {
        self.rate_limited
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Aggregate a key's audit entries into usage statistics
pub fn summarize<'a>(entries: impl IntoIterator<Item = &'a AuditEntry>) -> KeyUsageStats {
    let mut stats = KeyUsageStats::default();
    let mut ips = HashSet::new();
    let mut timed = 0u64;
    let mut total_ms = 0u64;

    for entry in entries {
        stats.total += 1;

        if !entry.authorized() {
            stats.unauthorized += 1;
        }

        if entry.rate_limited() {
            stats.rate_limited += 1;
        }

        match entry.status_code() {
            Some(code) if (200..300).contains(&code) && entry.authorized() => stats.success += 1,
            Some(code) if code >= 400 => stats.failed += 1,
            None if !entry.authorized() => stats.failed += 1,
            _ => {}
        }

        if let Some(ms) = entry.response_time_ms() {
            timed += 1;
            total_ms = total_ms.saturating_add(ms);
        }

        if let Some(ip) = entry.source_ip() {
            ips.insert(ip.to_string());
        }
    }

    stats.avg_response_ms = (timed > 0).then(|| total_ms as f64 / timed as f64);
    stats.unique_ips = ips.len() as u64;
    stats
}

/// Append-only audit persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a new entry
    async fn append(&self, entry: AuditEntry) -> Result<AuditId, DomainError>;

    /// Back-fill the response fields of an existing entry
    async fn update(
        &self,
        id: AuditId,
        status_code: u16,
        response_time_ms: u64,
    ) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::{AuthError, Identity};
    use crate::domain::api_key::ApiKeyRecord;

    fn context() -> RequestContext {
        RequestContext::new("GET", "/v1/quizzes")
            .with_source_ip(Some("10.0.0.1".to_string()))
            .with_request_id(Some("req-1".to_string()))
            .with_required_scope("quiz:read")
    }

    fn valid_result() -> ValidationResult {
        let record =
            ApiKeyRecord::new(ApiKeyId::generate(), "k", "h", "qk_aaaaaaaa", Utc::now());
        ValidationResult::valid(Identity::from_key(&record))
    }

    #[test]
    fn test_entry_for_valid_decision() {
        let result = valid_result();
        let entry = AuditEntry::for_decision(Utc::now(), &context(), &result);

        assert!(entry.authorized());
        assert!(!entry.rate_limited());
        assert!(entry.key_id().is_some());
        assert_eq!(entry.required_scope(), Some("quiz:read"));
        assert_eq!(entry.request_id(), Some("req-1"));
        assert!(entry.error_message().is_none());
        assert!(entry.status_code().is_none());
    }

    #[test]
    fn test_entry_for_unresolved_key() {
        let result = ValidationResult::invalid(AuthError::UnknownKey);
        let entry = AuditEntry::for_decision(Utc::now(), &context(), &result);

        assert!(!entry.authorized());
        assert!(entry.key_id().is_none());
        assert_eq!(entry.error_message(), Some("unknown_key"));
    }

    #[test]
    fn test_entry_for_rate_limited() {
        let identity = valid_result().identity().cloned().unwrap();
        let result = ValidationResult::RateLimited { identity };
        let entry = AuditEntry::for_decision(Utc::now(), &context(), &result);

        assert!(entry.rate_limited());
        assert!(!entry.authorized());
        assert_eq!(entry.error_message(), Some("rate_limited"));
    }

    #[test]
    fn test_response_backfill_is_write_once() {
        let entry = AuditEntry::for_decision(Utc::now(), &context(), &valid_result());

        let filled = entry.with_response(200, 12).unwrap();
        assert_eq!(filled.status_code(), Some(200));
        assert_eq!(filled.response_time_ms(), Some(12));
        assert_eq!(filled.id(), entry.id());
        assert_eq!(filled.path(), entry.path());

        assert!(filled.with_response(500, 1).is_err());
    }

    #[test]
    fn test_summarize() {
        let ok = AuditEntry::for_decision(Utc::now(), &context(), &valid_result())
            .with_response(200, 10)
            .unwrap();
        let ok_slow = AuditEntry::for_decision(
            Utc::now(),
            &context().with_source_ip(Some("10.0.0.2".to_string())),
            &valid_result(),
        )
        .with_response(200, 30)
        .unwrap();
        let limited = AuditEntry::for_decision(
            Utc::now(),
            &context(),
            &ValidationResult::RateLimited {
                identity: valid_result().identity().cloned().unwrap(),
            },
        );
        let server_error = AuditEntry::for_decision(Utc::now(), &context(), &valid_result())
            .with_response(503, 20)
            .unwrap();

        let stats = summarize([&ok, &ok_slow, &limited, &server_error]);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.unauthorized, 1);
        assert_eq!(stats.rate_limited, 1);
        assert_eq!(stats.unique_ips, 2);
        assert_eq!(stats.avg_response_ms, Some(20.0));
    }

    #[test]
    fn test_summarize_saturates_response_time() {
        let unmeasured = AuditEntry::for_decision(Utc::now(), &context(), &valid_result())
            .with_response(200, u64::MAX)
            .unwrap();
        let measured = AuditEntry::for_decision(Utc::now(), &context(), &valid_result())
            .with_response(200, 5)
            .unwrap();

        let stats = summarize([&unmeasured, &measured]);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.avg_response_ms, Some(u64::MAX as f64 / 2.0));
    }

    #[test]
    fn test_summarize_empty() {
        let stats = summarize(std::iter::empty());
        assert_eq!(stats, KeyUsageStats::default());
    }
}
