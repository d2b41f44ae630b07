//! issue-token command

use std::sync::Arc;

use clap::Args;

use crate::domain::SystemClock;
use crate::infrastructure::auth::TokenService;

#[derive(Args, Debug, Clone)]
pub struct IssueTokenArgs {
    #[arg(long)]
    pub subject: String,

    #[arg(long)]
    pub username: String,

    /// `admin` grants every scope
    #[arg(long, default_value = "member")]
    pub role: String,
}

pub async fn run(args: IssueTokenArgs) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let tokens = TokenService::new(config.auth.token_config(), Arc::new(SystemClock))?;

    let issued = tokens.issue(&args.subject, &args.username, &args.role)?;

    println!("{}", serde_json::to_string_pretty(&issued)?);

    Ok(())
}
