//! PostgreSQL audit sink

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::audit::{AuditEntry, AuditId, AuditSink};
use crate::domain::DomainError;

/// Appends audit entries to the `audit_log` table
#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<AuditId, DomainError> {
        let response_time_ms = entry
            .response_time_ms()
            .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX));

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, occurred_at, key_id, method, path, source_ip,
                                   user_agent, request_id, status_code, response_time_ms,
                                   required_scope, authorized, rate_limited,
                                   error_message, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(entry.id().as_uuid())
        .bind(entry.timestamp())
        .bind(entry.key_id().map(|id| *id.as_uuid()))
        .bind(entry.method())
        .bind(entry.path())
        .bind(entry.source_ip())
        .bind(entry.user_agent())
        .bind(entry.request_id())
        .bind(entry.status_code().map(i32::from))
        .bind(response_time_ms)
        .bind(entry.required_scope())
        .bind(entry.authorized())
        .bind(entry.rate_limited())
        .bind(entry.error_message())
        .bind(Json(entry.metadata()))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to append audit entry: {}", e)))?;

        Ok(entry.id())
    }

    async fn update(
        &self,
        id: AuditId,
        status_code: u16,
        response_time_ms: u64,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE audit_log
            SET status_code = $2, response_time_ms = $3
            WHERE id = $1 AND status_code IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(i32::from(status_code))
        .bind(i64::try_from(response_time_ms).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to back-fill audit entry: {}", e)))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM audit_log WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to look up audit entry: {}", e)))?;

        if exists {
            Err(DomainError::conflict(format!(
                "Audit entry '{}' already has a response recorded",
                id
            )))
        } else {
            Err(DomainError::not_found(format!("Audit entry '{}' not found", id)))
        }
    }
}
