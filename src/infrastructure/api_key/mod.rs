//! API key infrastructure
//!
//! Key generation, the key store adapters and key administration.

mod generator;
mod postgres_repository;
mod repository;
mod service;

pub use generator::{ApiKeyGenerator, GeneratedApiKey, DEFAULT_TYPE_PREFIX};
pub use postgres_repository::PostgresKeyStore;
pub use repository::InMemoryKeyStore;
pub use service::{ApiKeyService, CreateApiKeyRequest, CreatedApiKey, QuotaDefaults};
