//! API key management admin endpoints

use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::RequireAdmin;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::api_key::{ApiKeyId, ApiKeyRecord, KeyUsageStats, StatsWindow};
use crate::infrastructure::api_key::{CreateApiKeyRequest, CreatedApiKey};

/// API key response for admin API; never carries secret material
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: ApiKeyId,
    pub name: String,
    pub key_prefix: String,
    pub scopes: BTreeSet<String>,
    pub admin: bool,
    pub hourly_quota: i64,
    pub daily_quota: i64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
}

impl From<&ApiKeyRecord> for ApiKeyResponse {
    fn from(key: &ApiKeyRecord) -> Self {
        Self {
            id: *key.id(),
            name: key.name().to_string(),
            key_prefix: key.key_prefix().to_string(),
            scopes: key.scopes().clone(),
            admin: key.is_admin(),
            hourly_quota: key.hourly_quota(),
            daily_quota: key.daily_quota(),
            active: key.is_active(),
            expires_at: key.expires_at(),
            created_at: key.created_at(),
            created_by: key.created_by().map(String::from),
            last_used_at: key.last_used_at(),
            usage_count: key.usage_count(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub window: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyStatsResponse {
    pub key_id: ApiKeyId,
    pub window: StatsWindow,
    #[serde(flatten)]
    pub stats: KeyUsageStats,
}

/// POST /admin/api-keys
pub async fn create_api_key(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreatedApiKey>), ApiError> {
    let admin = admin.into_identity();
    debug!(name = %request.name, created_by = %admin.subject_id(), "Admin creating API key");

    let created = state
        .api_key_service
        .create_api_key(request, Some(admin.subject_id().to_string()))
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /admin/api-keys/{key_id}
pub async fn get_api_key(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(key_id): Path<String>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let key_id = parse_key_id(&key_id)?;
    let key = state.api_key_service.get(&key_id).await?;

    Ok(Json(ApiKeyResponse::from(&key)))
}

/// GET /admin/api-keys/{key_id}/stats?window=
pub async fn get_api_key_stats(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(key_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<KeyStatsResponse>, ApiError> {
    let key_id = parse_key_id(&key_id)?;
    let window = match query.window.as_deref() {
        Some(raw) => raw
            .parse::<StatsWindow>()
            .map_err(|e| ApiError::bad_request(e).with_param("window"))?,
        None => StatsWindow::default(),
    };

    debug!(key_id = %key_id, window = ?window, "Admin reading API key stats");

    let stats = state.api_key_service.stats(&key_id, window).await?;

    Ok(Json(KeyStatsResponse {
        key_id,
        window,
        stats,
    }))
}

/// POST /admin/api-keys/{key_id}/revoke
pub async fn revoke_api_key(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(key_id): Path<String>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let key_id = parse_key_id(&key_id)?;
    let key = state.api_key_service.revoke(&key_id).await?;

    Ok(Json(ApiKeyResponse::from(&key)))
}

fn parse_key_id(raw: &str) -> Result<ApiKeyId, ApiError> {
    ApiKeyId::parse(raw).map_err(|e| ApiError::bad_request(e.to_string()).with_param("key_id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_omits_secret_hash() {
        let record = ApiKeyRecord::new(
            ApiKeyId::generate(),
            "Grader",
            "$argon2id$v=19$secret",
            "qk_abcdefgh",
            Utc::now(),
        )
        .with_scopes(["quiz:read"]);

        let json = serde_json::to_string(&ApiKeyResponse::from(&record)).unwrap();

        assert!(json.contains("qk_abcdefgh"));
        assert!(json.contains("quiz:read"));
        assert!(!json.contains("argon2id"));
    }

    #[test]
    fn test_stats_response_flattens_counts() {
        let response = KeyStatsResponse {
            key_id: ApiKeyId::generate(),
            window: StatsWindow::LastHour,
            stats: KeyUsageStats {
                total: 3,
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["window"], "last_hour");
        assert_eq!(json["total"], 3);
    }

    #[test]
    fn test_parse_key_id_rejects_garbage() {
        let err = parse_key_id("not-a-uuid").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.response.error.param.as_deref(), Some("key_id"));
    }
}
