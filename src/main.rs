use clap::Parser;
use keygate::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cli::serve::run().await,
        Command::CreateKey(args) => cli::keys::run(args).await,
        Command::IssueToken(args) => cli::token::run(args).await,
    }
}
