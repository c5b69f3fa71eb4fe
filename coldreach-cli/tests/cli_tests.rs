/// Integration tests for the admin commands against a temporary database

mod common;

use clap::Parser;
use coldreach_cli::cli::{Cli, Command};
use coldreach_shared::auth::service::{AuthService, PasswordSignup, RequestMeta};
use coldreach_shared::db::pool::{create_pool, DatabaseConfig};
use common::{env_with, run, test_env, TestEnv, TEST_SECRET};

fn parse(args: &[&str]) -> Command {
    let argv = std::iter::once("coldreach").chain(args.iter().copied());
    Cli::try_parse_from(argv).expect("valid arguments").command
}

fn code_from(output: &str) -> String {
    output
        .lines()
        .find_map(|line| line.strip_prefix("- code:"))
        .map(|code| code.trim().to_string())
        .expect("output contains a code")
}

#[tokio::test]
async fn test_db_migrate_creates_database() {
    let env = test_env();
    assert!(!env.db_path.exists());

    let output = run(&env, parse(&["db", "migrate"])).await.unwrap();

    assert!(env.db_path.exists());
    assert!(output.starts_with("Applied "));
    assert!(!output.contains("Applied 0 "));

    // Running again is a no-op
    let again = run(&env, parse(&["db", "migrate"])).await.unwrap();
    assert_eq!(output, again);
}

#[tokio::test]
async fn test_db_migrate_needs_no_secret() {
    let env = env_with(&[]);
    assert!(run(&env, parse(&["db", "migrate"])).await.is_ok());
}

#[tokio::test]
async fn test_invite_commands_need_secret() {
    let env = env_with(&[]);
    let result = run(&env, parse(&["invites", "list"])).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_invite_lifecycle() {
    let env = test_env();

    let output = run(
        &env,
        parse(&[
            "invites", "create", "--email", "Ana@Example.com", "--label", "beta", "--max-uses", "2",
            "--expires-days", "7",
        ]),
    )
    .await
    .unwrap();

    assert!(output.contains("- email: ana@example.com"));
    assert!(output.contains("- expires: "));
    let code = code_from(&output);
    assert!(code.starts_with("INV-"));

    let listing = run(&env, parse(&["invites", "list"])).await.unwrap();
    assert!(listing.contains("active"));
    assert!(listing.contains("email=ana@example.com"));
    assert!(listing.contains("uses=0 max=2 label=beta"));
    assert!(!listing.contains(&code));

    let revoked = run(&env, parse(&["invites", "revoke", "--email", "ana@example.com"]))
        .await
        .unwrap();
    assert_eq!(revoked.trim(), "Revoked 1 invite(s) for ana@example.com.");

    let active = run(&env, parse(&["invites", "list", "--active-only"])).await.unwrap();
    assert_eq!(active.trim(), "No invites found.");

    let all = run(&env, parse(&["invites", "list"])).await.unwrap();
    assert!(all.contains("revoked"));
}

#[tokio::test]
async fn test_list_filters_by_email() {
    let env = test_env();

    run(&env, parse(&["invites", "create", "--email", "ana@example.com"])).await.unwrap();
    run(&env, parse(&["invites", "create", "--email", "bo@example.com"])).await.unwrap();

    let listing = run(&env, parse(&["invites", "list", "--email", "bo@example.com"]))
        .await
        .unwrap();

    assert_eq!(listing.lines().count(), 1);
    assert!(listing.contains("email=bo@example.com"));
    assert!(listing.contains("max=unlimited"));
}

#[tokio::test]
async fn test_revoke_by_id() {
    let env = test_env();

    let output = run(&env, parse(&["invites", "create", "--email", "ana@example.com"]))
        .await
        .unwrap();
    let id = output
        .lines()
        .find_map(|line| line.strip_prefix("- id:"))
        .map(str::trim)
        .expect("output contains an id")
        .to_string();

    let first = run(&env, parse(&["invites", "revoke", "--id", &id])).await.unwrap();
    assert_eq!(first.trim(), "Revoked.");

    let second = run(&env, parse(&["invites", "revoke", "--id", &id])).await.unwrap();
    assert_eq!(second.trim(), "No active invite found for that id.");
}

#[tokio::test]
async fn test_create_rejects_bad_email() {
    let env = test_env();
    let result = run(&env, parse(&["invites", "create", "--email", "not-an-email"])).await;
    assert!(result.is_err());
}

async fn pending_token(env: &TestEnv) -> (String, uuid::Uuid) {
    run(env, parse(&["db", "migrate"])).await.unwrap();

    let pool = create_pool(DatabaseConfig::for_path(&env.db_path)).await.unwrap();
    let service = AuthService::new(pool.clone(), env.config.auth().unwrap());

    let pending = service
        .create_password_user(
            PasswordSignup {
                email: "ana@example.com".to_string(),
                password: "correct horse battery".to_string(),
                display_name: None,
                invite_code: None,
            },
            &RequestMeta::default(),
        )
        .await
        .unwrap();

    pool.close().await;
    (pending.token, pending.user_id)
}

#[tokio::test]
async fn test_verify_email_once() {
    let env = test_env();
    let (token, user_id) = pending_token(&env).await;

    let output = run(&env, parse(&["verify-email", "--token", &token])).await.unwrap();
    assert_eq!(output.trim(), format!("Email verified for user {}.", user_id));

    let again = run(&env, parse(&["verify-email", "--token", &token])).await;
    assert!(again.is_err());
}

#[tokio::test]
async fn test_verify_email_unknown_token() {
    let env = env_with(&[("auth_secret_key", TEST_SECRET)]);
    let result = run(&env, parse(&["verify-email", "--token", "no-such-token"])).await;
    assert!(result.is_err());
}
