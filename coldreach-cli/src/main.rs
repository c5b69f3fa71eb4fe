//! # Coldreach Admin CLI
//!
//! ## Usage
//!
//! ```bash
//! coldreach invites create --email user@example.com --label "Beta" --max-uses 1
//! coldreach invites list --active-only
//! coldreach invites revoke --email user@example.com
//! coldreach verify-email --token <token>
//! coldreach --db-path /tmp/coldreach.db db migrate
//! ```

use std::io;

use clap::Parser;
use coldreach_cli::cli::Cli;
use coldreach_cli::commands::execute;
use coldreach_cli::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coldreach_cli=info,coldreach_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut config = Config::from_env()?;
    if let Some(path) = &cli.db_path {
        config = config.with_db_path(path);
    }

    tracing::debug!(
        "Coldreach CLI v{} using {}",
        env!("CARGO_PKG_VERSION"),
        config.database.url
    );

    execute(cli.command, &config, &mut io::stdout().lock()).await
}
