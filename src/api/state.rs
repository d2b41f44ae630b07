//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::api_key::ApiKeyService;
use crate::infrastructure::auth::KeyValidator;

/// Services shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub validator: Arc<KeyValidator>,
    pub api_key_service: Arc<ApiKeyService>,
}

impl AppState {
    pub fn new(validator: Arc<KeyValidator>, api_key_service: Arc<ApiKeyService>) -> Self {
        Self {
            validator,
            api_key_service,
        }
    }
}
