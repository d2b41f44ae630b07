//! PostgreSQL key store implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::api_key::{
    ApiKeyId, ApiKeyRecord, KeyStore, KeyUsageStats, Metadata, StatsWindow,
};
use crate::domain::{Clock, DomainError};

const SELECT_COLUMNS: &str = r#"
    SELECT id, secret_hash, key_prefix, name, scopes, admin, hourly_quota,
           daily_quota, active, expires_at, created_at, created_by,
           last_used_at, last_used_ip, usage_count, metadata
    FROM api_keys
"#;

/// PostgreSQL implementation of [`KeyStore`]
///
/// Statistics are aggregated from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct PostgresKeyStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresKeyStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl KeyStore for PostgresKeyStore {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKeyRecord>, DomainError> {
        let rows = sqlx::query(&format!("{} WHERE key_prefix = $1", SELECT_COLUMNS))
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to look up API key: {}", e)))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKeyRecord>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get API key: {}", e)))?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn create(&self, record: ApiKeyRecord) -> Result<ApiKeyId, DomainError> {
        let scopes: Vec<String> = record.scopes().iter().cloned().collect();
        let usage_count = i64::try_from(record.usage_count()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, secret_hash, key_prefix, name, scopes, admin,
                                  hourly_quota, daily_quota, active, expires_at,
                                  created_at, created_by, last_used_at, last_used_ip,
                                  usage_count, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(record.id().as_uuid())
        .bind(record.secret_hash())
        .bind(record.key_prefix())
        .bind(record.name())
        .bind(&scopes)
        .bind(record.is_admin())
        .bind(record.hourly_quota())
        .bind(record.daily_quota())
        .bind(record.is_active())
        .bind(record.expires_at())
        .bind(record.created_at())
        .bind(record.created_by())
        .bind(record.last_used_at())
        .bind(record.last_used_ip())
        .bind(usage_count)
        .bind(Json(record.metadata()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();

            if msg.contains("duplicate key") || msg.contains("unique constraint") {
                DomainError::conflict(format!("API key with ID '{}' already exists", record.id()))
            } else {
                DomainError::storage(format!("Failed to create API key: {}", e))
            }
        })?;

        Ok(*record.id())
    }

    async fn touch_usage(
        &self,
        id: &ApiKeyId,
        source_ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        // Single statement so concurrent touches never lose an increment
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET usage_count = usage_count + 1,
                last_used_at = $2,
                last_used_ip = COALESCE($3, last_used_ip)
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(at)
        .bind(source_ip)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to record key usage: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("API key '{}' not found", id)));
        }

        Ok(())
    }

    async fn set_active(&self, id: &ApiKeyId, active: bool) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE api_keys SET active = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to update API key: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("API key '{}' not found", id)));
        }

        Ok(())
    }

    async fn fetch_stats(
        &self,
        id: &ApiKeyId,
        window: StatsWindow,
    ) -> Result<KeyUsageStats, DomainError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM api_keys WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get API key: {}", e)))?;

        if !exists {
            return Err(DomainError::not_found(format!("API key '{}' not found", id)));
        }

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE authorized AND status_code BETWEEN 200 AND 299) AS success,
                COUNT(*) FILTER (
                    WHERE status_code >= 400 OR (status_code IS NULL AND NOT authorized)
                ) AS failed,
                COUNT(*) FILTER (WHERE NOT authorized) AS unauthorized,
                COUNT(*) FILTER (WHERE rate_limited) AS rate_limited,
                AVG(response_time_ms)::FLOAT8 AS avg_response_ms,
                COUNT(DISTINCT source_ip) AS unique_ips
            FROM audit_log
            WHERE key_id = $1 AND ($2::TIMESTAMPTZ IS NULL OR occurred_at >= $2)
            "#,
        )
        .bind(id.as_uuid())
        .bind(window.since(self.clock.now()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to compute key statistics: {}", e)))?;

        let count = |column: &str| -> u64 { row.get::<i64, _>(column).max(0) as u64 };

        Ok(KeyUsageStats {
            total: count("total"),
            success: count("success"),
            failed: count("failed"),
            unauthorized: count("unauthorized"),
            rate_limited: count("rate_limited"),
            avg_response_ms: row.get("avg_response_ms"),
            unique_ips: count("unique_ips"),
        })
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<ApiKeyRecord, DomainError> {
    let id: Uuid = row.get("id");
    let scopes: Vec<String> = row.get("scopes");
    let usage_count: i64 = row.get("usage_count");
    let Json(metadata): Json<Metadata> = row
        .try_get("metadata")
        .map_err(|e| DomainError::storage(format!("Invalid key metadata in database: {}", e)))?;

    let record = ApiKeyRecord::new(
        ApiKeyId::from(id),
        row.get::<String, _>("name"),
        row.get::<String, _>("secret_hash"),
        row.get::<String, _>("key_prefix"),
        row.get("created_at"),
    )
    .with_scopes(scopes)
    .with_admin(row.get("admin"))
    .with_quotas(row.get("hourly_quota"), row.get("daily_quota"))
    .with_active(row.get("active"))
    .with_expiration(row.get("expires_at"))
    .with_created_by(row.get("created_by"))
    .with_usage(
        usage_count.max(0) as u64,
        row.get("last_used_at"),
        row.get("last_used_ip"),
    )
    .with_metadata(metadata);

    Ok(record)
}
