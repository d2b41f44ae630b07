//! Admin API endpoints for managing API keys

pub mod api_keys;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create admin API router
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/api-keys", post(api_keys::create_api_key))
        .route("/api-keys/{key_id}", get(api_keys::get_api_key))
        .route("/api-keys/{key_id}/stats", get(api_keys::get_api_key_stats))
        .route("/api-keys/{key_id}/revoke", post(api_keys::revoke_api_key))
}
