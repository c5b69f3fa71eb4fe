/// Integration tests for the embedded migrations

use coldreach_shared::db::migrations::{embedded_migration_count, get_migration_status, run_migrations};
use coldreach_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use tempfile::TempDir;

async fn fresh_pool(dir: &TempDir) -> sqlx::SqlitePool {
    create_pool(DatabaseConfig::for_path(dir.path().join("migrations.db")))
        .await
        .expect("Failed to create pool")
}

#[tokio::test]
async fn test_status_before_migrations() {
    let dir = TempDir::new().expect("temp dir");
    let pool = fresh_pool(&dir).await;

    let status = get_migration_status(&pool).await.expect("status");
    assert_eq!(status.applied_migrations, 0);
    assert_eq!(status.latest_version, None);
    assert!(!status.is_up_to_date);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_run_migrations() {
    let dir = TempDir::new().expect("temp dir");
    let pool = fresh_pool(&dir).await;

    let result = run_migrations(&pool).await;
    assert!(result.is_ok(), "Migrations failed: {:?}", result.err());

    let status = get_migration_status(&pool).await.expect("status");
    assert_eq!(status.applied_migrations, embedded_migration_count());
    assert!(status.is_up_to_date);
    assert!(status.latest_version.is_some());

    close_pool(pool).await;
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    let pool = fresh_pool(&dir).await;

    run_migrations(&pool).await.expect("first run");
    let first = get_migration_status(&pool).await.expect("status");

    run_migrations(&pool).await.expect("second run");
    let second = get_migration_status(&pool).await.expect("status");

    assert_eq!(first.applied_migrations, second.applied_migrations);
    assert_eq!(first.latest_version, second.latest_version);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_tables_exist_after_migrations() {
    let dir = TempDir::new().expect("temp dir");
    let pool = fresh_pool(&dir).await;
    run_migrations(&pool).await.expect("migrations");

    for table in [
        "users",
        "auth_identities",
        "user_profiles",
        "email_verifications",
        "login_events",
        "invites",
        "invite_usages",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .expect("sqlite_master query");
        assert!(exists, "table {} should exist", table);
    }

    close_pool(pool).await;
}

#[tokio::test]
async fn test_invite_use_count_constraint() {
    let dir = TempDir::new().expect("temp dir");
    let pool = fresh_pool(&dir).await;
    run_migrations(&pool).await.expect("migrations");

    let result = sqlx::query(
        "INSERT INTO invites (id, code_hash, created_at, max_uses, used_count)
         VALUES (?, 'h', '2025-01-01T00:00:00Z', 1, 2)",
    )
    .bind(uuid::Uuid::new_v4())
    .execute(&pool)
    .await;

    assert!(result.is_err(), "used_count above max_uses must be rejected");

    close_pool(pool).await;
}
