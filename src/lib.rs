//! Keygate
//!
//! Credential validation for HTTP services:
//! - API keys with argon2 hashed secrets, scopes and expiry
//! - Signed bearer tokens
//! - Hourly and daily per-key quotas
//! - An audit entry for every authorization decision

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use config::StorageBackend;
use domain::{AuditSink, Clock, CounterStore, KeyStore, SystemClock};
use infrastructure::{
    api_key::{ApiKeyGenerator, ApiKeyService, InMemoryKeyStore, PostgresKeyStore},
    audit::{AuditRecorder, InMemoryAuditSink, PostgresAuditSink},
    auth::{KeyValidator, TokenService},
    rate_limit::{InMemoryCounterStore, RateLimiter, RedisCounterStore},
    secret::{Argon2SecretHasher, SecretHasher},
    storage::{run_migrations, PostgresConfig},
};
use tracing::{info, warn};

/// Key and audit persistence for the configured backend
pub struct Backends {
    pub keys: Arc<dyn KeyStore>,
    pub audit: Arc<dyn AuditSink>,
}

/// Connect the configured storage backend; PostgreSQL is migrated on connect
pub async fn create_backends(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Backends> {
    info!("Storage backend: {:?}", config.storage.backend);

    match config.storage.backend {
        StorageBackend::Memory => {
            let audit = Arc::new(InMemoryAuditSink::new());
            let keys = InMemoryKeyStore::new()
                .with_audit_source(audit.clone())
                .with_clock(clock);

            Ok(Backends {
                keys: Arc::new(keys),
                audit,
            })
        }
        StorageBackend::Postgres => {
            let url = config.storage.postgres_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("storage.postgres_url is required for the postgres backend")
            })?;

            info!("Connecting to PostgreSQL...");
            let pool = PostgresConfig::new(url)
                .with_max_connections(config.storage.max_connections)
                .connect()
                .await?;
            run_migrations(&pool).await?;
            info!("PostgreSQL connection established");

            Ok(Backends {
                keys: Arc::new(PostgresKeyStore::new(pool.clone(), clock)),
                audit: Arc::new(PostgresAuditSink::new(pool)),
            })
        }
    }
}

async fn create_counter_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CounterStore>> {
    match config.storage.redis_url.as_deref() {
        Some(url) => {
            info!("Using Redis for quota counters");
            Ok(Arc::new(RedisCounterStore::with_url(url).await?))
        }
        None => {
            warn!("No redis_url configured; quota counters are local to this process");
            Ok(Arc::new(InMemoryCounterStore::new()))
        }
    }
}

fn create_hasher(config: &AppConfig) -> anyhow::Result<Arc<dyn SecretHasher>> {
    Ok(Arc::new(Argon2SecretHasher::new(config.auth.hash_cost)?))
}

/// Key administration service over already connected backends
pub fn create_api_key_service(
    config: &AppConfig,
    keys: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<ApiKeyService> {
    Ok(ApiKeyService::new(keys, create_hasher(config)?, clock)
        .with_generator(ApiKeyGenerator::new(&config.auth.key_prefix))
        .with_defaults(config.auth.quota_defaults()))
}

/// Create the application state with all services initialized
///
/// The configuration must already be validated.
pub async fn create_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backends = create_backends(config, clock.clone()).await?;
    let counters = create_counter_store(config).await?;

    let tokens = Arc::new(TokenService::new(config.auth.token_config(), clock.clone())?);
    let limiter = Arc::new(RateLimiter::new(counters, clock.clone()));
    let (recorder, _worker) = AuditRecorder::spawn(backends.audit, config.audit.queue_capacity);

    let validator = KeyValidator::new(
        backends.keys.clone(),
        create_hasher(config)?,
        limiter,
        tokens,
        recorder,
        clock.clone(),
    )
    .with_generator(ApiKeyGenerator::new(&config.auth.key_prefix));

    let api_key_service = create_api_key_service(config, backends.keys, clock)?;

    Ok(AppState::new(Arc::new(validator), Arc::new(api_key_service)))
}
