//! Versioned endpoints for credential holders

pub mod whoami;

use axum::{routing::get, Router};

use super::state::AppState;

pub fn create_v1_router() -> Router<AppState> {
    Router::new().route("/whoami", get(whoami::whoami))
}
