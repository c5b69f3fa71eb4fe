//! Shared setup for auth integration tests

#![allow(dead_code)]

use coldreach_shared::auth::config::AuthConfig;
use coldreach_shared::auth::service::{AuthService, PasswordSignup};
use coldreach_shared::db::migrations::run_migrations;
use coldreach_shared::db::pool::{create_pool, DatabaseConfig};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "integration-test-secret-key";
pub const PASSWORD: &str = "correct horse battery";

pub struct TestContext {
    pub service: AuthService,
    pub pool: SqlitePool,
    _dir: TempDir,
}

/// Fresh migrated database in a temporary directory
pub async fn setup(config: AuthConfig) -> TestContext {
    let dir = TempDir::new().expect("temp dir");
    let pool = create_pool(DatabaseConfig::for_path(dir.path().join("auth.db")))
        .await
        .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");

    TestContext {
        service: AuthService::new(pool.clone(), config),
        pool,
        _dir: dir,
    }
}

/// No invite gating at all
pub fn open_config() -> AuthConfig {
    AuthConfig {
        invite_only: false,
        ..AuthConfig::new(TEST_SECRET)
    }
}

/// Signup gated by the given static codes
pub fn gated_config(codes: &[&str]) -> AuthConfig {
    AuthConfig {
        invite_only: true,
        invite_codes: codes.iter().map(|c| c.to_string()).collect(),
        ..AuthConfig::new(TEST_SECRET)
    }
}

pub fn signup(email: &str, invite_code: Option<&str>) -> PasswordSignup {
    PasswordSignup {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        display_name: Some("Test User".to_string()),
        invite_code: invite_code.map(str::to_string),
    }
}
