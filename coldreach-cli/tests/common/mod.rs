//! Shared setup for CLI integration tests

#![allow(dead_code)]

use coldreach_cli::cli::Command;
use coldreach_cli::commands::execute;
use coldreach_cli::config::Config;
use std::path::PathBuf;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "cli-integration-test-secret";

/// Configuration pointing at a file in a temporary directory
pub struct TestEnv {
    pub config: Config,
    pub db_path: PathBuf,
    _dir: TempDir,
}

pub fn env_with(pairs: &[(&str, &str)]) -> TestEnv {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("data").join("coldreach.db");

    let settings = pairs
        .iter()
        .fold(config::Config::builder(), |builder, (key, value)| {
            builder.set_override(*key, *value).expect("override")
        })
        .build()
        .expect("settings");

    let config = Config::from_settings(settings)
        .expect("config")
        .with_db_path(&db_path);

    TestEnv {
        config,
        db_path,
        _dir: dir,
    }
}

/// Secret set, signups not gated
pub fn test_env() -> TestEnv {
    env_with(&[("auth_secret_key", TEST_SECRET), ("invite_only", "false")])
}

/// Runs a command and returns what it printed
pub async fn run(env: &TestEnv, command: Command) -> anyhow::Result<String> {
    let mut out = Vec::new();
    execute(command, &env.config, &mut out).await?;
    Ok(String::from_utf8(out).expect("utf-8 output"))
}
