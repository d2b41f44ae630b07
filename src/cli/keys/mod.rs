//! create-key command

use std::sync::Arc;

use clap::Args;
use tracing::warn;

use crate::config::StorageBackend;
use crate::domain::{Clock, SystemClock};
use crate::infrastructure::api_key::CreateApiKeyRequest;

#[derive(Args, Debug, Clone)]
pub struct CreateKeyArgs {
    /// Human-readable key name
    #[arg(long)]
    pub name: String,

    /// Granted scope; repeat for several
    #[arg(long = "scope")]
    pub scopes: Vec<String>,

    /// Grant every scope, including key management
    #[arg(long)]
    pub admin: bool,

    #[arg(long)]
    pub hourly_quota: Option<i64>,

    #[arg(long)]
    pub daily_quota: Option<i64>,

    #[arg(long)]
    pub expires_in_days: Option<i64>,
}

impl From<CreateKeyArgs> for CreateApiKeyRequest {
    fn from(args: CreateKeyArgs) -> Self {
        CreateApiKeyRequest::new(args.name)
            .with_scopes(args.scopes)
            .with_admin(args.admin)
            .with_quotas(args.hourly_quota, args.daily_quota)
            .with_expires_in_days(args.expires_in_days)
    }
}

/// Create a key and print the plaintext, which is not recoverable later
pub async fn run(args: CreateKeyArgs) -> anyhow::Result<()> {
    let config = super::load_config()?;

    if config.storage.backend == StorageBackend::Memory {
        warn!("Memory backend selected: the key is discarded when this command exits");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backends = crate::create_backends(&config, clock.clone()).await?;
    let service = crate::create_api_key_service(&config, backends.keys, clock)?;

    let created = service
        .create_api_key(args.into(), Some("cli".to_string()))
        .await?;

    println!("{}", serde_json::to_string_pretty(&created)?);
    eprintln!("Store this key now; it cannot be shown again.");

    Ok(())
}
