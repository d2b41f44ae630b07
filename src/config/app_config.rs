use serde::Deserialize;

use crate::domain::DomainError;
use crate::infrastructure::api_key::{QuotaDefaults, DEFAULT_TYPE_PREFIX};
use crate::infrastructure::audit::DEFAULT_QUEUE_CAPACITY;
use crate::infrastructure::auth::TokenConfig;
use crate::infrastructure::secret::HashCost;

/// Application configuration
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Credential and quota settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub signing_secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl_minutes: i64,
    pub default_hourly_quota: i64,
    pub default_daily_quota: i64,
    pub hash_cost: HashCost,
    pub key_prefix: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub postgres_url: Option<String>,
    /// Shared counter store; in-process counters are used when unset
    pub redis_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let quotas = QuotaDefaults::default();

        Self {
            signing_secret: String::new(),
            issuer: "keygate".to_string(),
            audience: "keygate-api".to_string(),
            token_ttl_minutes: 60,
            default_hourly_quota: quotas.hourly,
            default_daily_quota: quotas.daily,
            hash_cost: HashCost::default(),
            key_prefix: DEFAULT_TYPE_PREFIX.to_string(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_secret", &"[hidden]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("default_hourly_quota", &self.default_hourly_quota)
            .field("default_daily_quota", &self.default_daily_quota)
            .field("hash_cost", &self.hash_cost)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl AuthConfig {
    /// Reject settings the process must not start with
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.signing_secret.trim().is_empty() {
            return Err(DomainError::configuration(
                "auth.signing_secret must be set (KEYGATE__AUTH__SIGNING_SECRET)",
            ));
        }

        if self.token_ttl_minutes <= 0 {
            return Err(DomainError::configuration(
                "auth.token_ttl_minutes must be positive",
            ));
        }

        if self.key_prefix.is_empty() {
            return Err(DomainError::configuration("auth.key_prefix must not be empty"));
        }

        Ok(())
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig::new(&self.signing_secret, &self.issuer, &self.audience)
            .with_ttl(chrono::Duration::minutes(self.token_ttl_minutes))
    }

    pub fn quota_defaults(&self) -> QuotaDefaults {
        QuotaDefaults {
            hourly: self.default_hourly_quota,
            daily: self.default_daily_quota,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            postgres_url: None,
            redis_url: None,
            max_connections: 10,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("KEYGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate every section that has startup requirements
    pub fn validate(&self) -> Result<(), DomainError> {
        self.auth.validate()?;

        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres_url.is_none()
        {
            return Err(DomainError::configuration(
                "storage.postgres_url is required for the postgres backend",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.signing_secret = "s3cret".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.token_ttl_minutes, 60);
        assert_eq!(config.auth.default_hourly_quota, 1000);
        assert_eq!(config.auth.default_daily_quota, 10000);
        assert_eq!(config.auth.key_prefix, "qk_");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_missing_signing_secret_fails_fast() {
        let result = AppConfig::default().validate();
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
        assert!(with_secret().validate().is_ok());
    }

    #[test]
    fn test_postgres_backend_requires_url() {
        let mut config = with_secret();
        config.storage.backend = StorageBackend::Postgres;
        assert!(config.validate().is_err());

        config.storage.postgres_url = Some("postgres://localhost/keygate".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_sections() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [auth]
                signing_secret = "abc"
                token_ttl_minutes = 15

                [auth.hash_cost]
                memory_kib = 8
                iterations = 1
                parallelism = 1

                [storage]
                backend = "postgres"
                postgres_url = "postgres://db/keys"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.auth.token_ttl_minutes, 15);
        assert_eq!(config.auth.issuer, "keygate");
        assert_eq!(config.auth.hash_cost.memory_kib, 8);
        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_debug_hides_signing_secret() {
        let debug = format!("{:?}", with_secret());
        assert!(!debug.contains("s3cret"));
    }
}
