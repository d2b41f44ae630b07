//! CLI module for keygate
//!
//! - `serve`: run the HTTP server
//! - `create-key`: mint an API key and print it once
//! - `issue-token`: sign a bearer token

pub mod keys;
pub mod serve;
pub mod token;

use clap::{Parser, Subcommand};
use tracing::error;

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Keygate - API key and bearer token validation service
#[derive(Parser)]
#[command(name = "keygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Create an API key
    CreateKey(keys::CreateKeyArgs),

    /// Issue a signed bearer token
    IssueToken(token::IssueTokenArgs),
}

/// Read `.env`, load and validate configuration, then start logging
///
/// Invalid configuration stops the process before anything else starts.
pub(crate) fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging)?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    Ok(config)
}
