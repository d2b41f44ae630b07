//! Process-wide configuration

mod app_config;

pub use app_config::{
    AppConfig, AuditConfig, AuthConfig, LogFormat, LoggingConfig, ServerConfig, StorageBackend,
    StorageConfig,
};
