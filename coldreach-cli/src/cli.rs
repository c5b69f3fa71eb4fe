/// Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "coldreach", version, about = "Administer the Coldreach auth database")]
pub struct Cli {
    /// Override the database file (default: DATABASE_URL, DB_PATH or data/coldreach.db)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage per-user invite codes
    #[command(subcommand)]
    Invites(InvitesCommand),

    /// Consume an email verification token
    VerifyEmail {
        #[arg(long)]
        token: String,
    },

    /// Database maintenance
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
pub enum InvitesCommand {
    /// Create an invite bound to an email; prints the code once
    Create(CreateInviteArgs),

    /// List invites (codes are never shown)
    List {
        /// Only invites for this email
        #[arg(long)]
        email: Option<String>,

        /// Hide revoked invites
        #[arg(long)]
        active_only: bool,
    },

    /// Revoke one invite or every invite for an email
    Revoke {
        #[arg(long, conflicts_with = "email", required_unless_present = "email")]
        id: Option<Uuid>,

        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CreateInviteArgs {
    /// Email allowed to redeem the invite
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub label: Option<String>,

    /// Unlimited when omitted
    #[arg(long)]
    pub max_uses: Option<i64>,

    #[arg(long, conflicts_with = "expires_hours")]
    pub expires_days: Option<i64>,

    #[arg(long)]
    pub expires_hours: Option<i64>,
}

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Apply pending schema migrations
    Migrate,
}
