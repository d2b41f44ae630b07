//! Identity echo

use serde::Serialize;

use crate::api::middleware::RequireCredential;
use crate::api::types::Json;
use crate::domain::auth::Identity;

#[derive(Debug, Clone, Serialize)]
pub struct WhoAmIResponse {
    pub identity: Identity,
}

/// GET /v1/whoami
pub async fn whoami(RequireCredential(identity): RequireCredential) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse { identity })
}
