/// Command execution
///
/// Every command opens the configured database, applies pending migrations
/// and writes human-readable output to the given writer.

use std::io::Write;

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use coldreach_shared::auth::service::{CreatedInvite, InviteSummary, NewInvite};
use coldreach_shared::auth::AuthService;
use coldreach_shared::db::migrations::{get_migration_status, run_migrations};
use coldreach_shared::db::pool::{close_pool, create_pool};
use sqlx::SqlitePool;
use tracing::info;

use crate::cli::{Command, CreateInviteArgs, DbCommand, InvitesCommand};
use crate::config::Config;

/// Runs one command against the configured database
///
/// # Errors
///
/// Returns an error if the database cannot be opened, auth settings are
/// missing for a command that needs them, or the operation is rejected.
pub async fn execute<W: Write>(command: Command, config: &Config, out: &mut W) -> anyhow::Result<()> {
    let pool = open_database(config).await?;

    let result = match command {
        Command::Db(DbCommand::Migrate) => migrate_status(&pool, out).await,
        Command::VerifyEmail { token } => {
            let service = auth_service(&pool, config)?;
            verify_email(&service, &token, out).await
        }
        Command::Invites(command) => {
            let service = auth_service(&pool, config)?;
            invites(&service, command, out).await
        }
    };

    close_pool(pool).await;
    result
}

async fn open_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let pool = create_pool(config.database.clone())
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.url))?;

    run_migrations(&pool)
        .await
        .context("Failed to apply database migrations")?;

    Ok(pool)
}

fn auth_service(pool: &SqlitePool, config: &Config) -> anyhow::Result<AuthService> {
    let auth = config.auth().context("Invalid auth configuration")?;
    Ok(AuthService::new(pool.clone(), auth))
}

async fn migrate_status<W: Write>(pool: &SqlitePool, out: &mut W) -> anyhow::Result<()> {
    let status = get_migration_status(pool).await?;

    writeln!(
        out,
        "Applied {} migration(s); latest version: {}",
        status.applied_migrations,
        status
            .latest_version
            .map_or_else(|| "none".to_string(), |v| v.to_string())
    )?;
    Ok(())
}

async fn verify_email<W: Write>(service: &AuthService, token: &str, out: &mut W) -> anyhow::Result<()> {
    match service.verify_email_token(token).await? {
        Some(user_id) => {
            info!(user_id = %user_id, "Email verified from CLI");
            writeln!(out, "Email verified for user {}.", user_id)?;
            Ok(())
        }
        None => bail!("Token is invalid, expired or already used"),
    }
}

async fn invites<W: Write>(
    service: &AuthService,
    command: InvitesCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        InvitesCommand::Create(args) => {
            let created = service.create_invite(new_invite(args)?).await?;
            print_created(&created, out)?;
        }
        InvitesCommand::List { email, active_only } => {
            let invites = service.list_invites(email.as_deref(), !active_only).await?;
            print_invites(&invites, out)?;
        }
        InvitesCommand::Revoke { id: Some(id), .. } => {
            if service.revoke_invite_by_id(id).await? {
                writeln!(out, "Revoked.")?;
            } else {
                writeln!(out, "No active invite found for that id.")?;
            }
        }
        InvitesCommand::Revoke { email: Some(email), .. } => {
            let count = service.revoke_invites_for_email(&email).await?;
            writeln!(out, "Revoked {} invite(s) for {}.", count, email)?;
        }
        InvitesCommand::Revoke { id: None, email: None } => {
            bail!("Pass --id or --email");
        }
    }

    Ok(())
}

fn new_invite(args: CreateInviteArgs) -> anyhow::Result<NewInvite> {
    let lifetime = match (args.expires_days, args.expires_hours) {
        (Some(days), _) => Some(Duration::try_days(days).context("--expires-days is out of range")?),
        (None, Some(hours)) => {
            Some(Duration::try_hours(hours).context("--expires-hours is out of range")?)
        }
        (None, None) => None,
    };

    if lifetime.map_or(false, |lifetime| lifetime <= Duration::zero()) {
        bail!("Expiry must be in the future");
    }

    Ok(NewInvite {
        allowed_email: args.email,
        label: args.label,
        expires_at: lifetime.map(|lifetime| Utc::now() + lifetime),
        max_uses: args.max_uses,
    })
}

fn print_created<W: Write>(created: &CreatedInvite, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "Invite created:")?;
    writeln!(
        out,
        "- email: {}",
        created.invite.allowed_email.as_deref().unwrap_or_default()
    )?;
    writeln!(out, "- code:  {}", created.code)?;
    writeln!(out, "- id:    {}", created.invite.id)?;
    if let Some(expires_at) = created.invite.expires_at {
        writeln!(out, "- expires: {}", expires_at.to_rfc3339())?;
    }
    Ok(())
}

fn print_invites<W: Write>(invites: &[InviteSummary], out: &mut W) -> std::io::Result<()> {
    if invites.is_empty() {
        return writeln!(out, "No invites found.");
    }

    for invite in invites {
        writeln!(
            out,
            "- {:7} id={} email={} uses={} max={} label={}",
            invite.status.as_str(),
            invite.id,
            invite.allowed_email.as_deref().unwrap_or_default(),
            invite.used_count,
            invite
                .max_uses
                .map_or_else(|| "unlimited".to_string(), |max| max.to_string()),
            invite.label.as_deref().unwrap_or_default(),
        )?;
    }
    Ok(())
}
