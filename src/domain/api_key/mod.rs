//! API key domain
//!
//! Record types, the key store contract and input validation.

mod entity;
mod repository;
mod validation;

pub use entity::{ApiKeyId, ApiKeyRecord, KeyUsageStats, Metadata, StatsWindow};
#[cfg(test)]
pub use repository::MockKeyStore;
pub use repository::KeyStore;
pub use validation::{
    validate_expiry_days, validate_key_name, validate_scope, validate_scopes,
    ApiKeyValidationError,
};
