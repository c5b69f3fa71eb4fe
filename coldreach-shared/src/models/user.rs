/// User model and database operations
///
/// A user is the account that one or more auth identities (password, google)
/// log into. Rows are never deleted by the service; `is_active` is kept for
/// manual soft-disabling.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id BLOB PRIMARY KEY NOT NULL,
///     primary_email TEXT,
///     display_name TEXT,
///     avatar_url TEXT,
///     created_at TEXT NOT NULL,
///     last_login_at TEXT,
///     is_active INTEGER NOT NULL DEFAULT 1
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use coldreach_shared::models::user::{User, CreateUser};
/// use coldreach_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(
///     &pool,
///     CreateUser {
///         primary_email: Some("user@example.com".to_string()),
///         display_name: Some("Jane Doe".to_string()),
///         ..Default::default()
///     },
/// )
/// .await?;
///
/// let found = User::find_by_id(&pool, user.id).await?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, primary_email, display_name, avatar_url, created_at, last_login_at, is_active";

/// User account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Normalized (trimmed, lowercased) email, if any identity supplied one
    pub primary_email: Option<String>,

    pub display_name: Option<String>,

    pub avatar_url: Option<String>,

    pub created_at: DateTime<Utc>,

    /// When the user last logged in (None if never logged in)
    pub last_login_at: Option<DateTime<Utc>>,

    pub is_active: bool,
}

/// Input for creating a new user
#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    pub primary_email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Set when the account is created as part of a login
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Fields refreshed on a successful external-provider login
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct LoginRefresh {
    /// Written only when the user has no primary email yet
    pub fill_primary_email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, primary_email, display_name, avatar_url, created_at, last_login_at, is_active)
            VALUES (?, ?, ?, ?, ?, ?, 1)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(data.primary_email)
        .bind(data.display_name)
        .bind(data.avatar_url)
        .bind(Utc::now())
        .bind(data.last_login_at)
        .fetch_one(executor)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }

    /// Finds a user whose primary email matches exactly
    ///
    /// Callers pass a normalized email.
    pub async fn find_by_primary_email<'e, E>(
        executor: E,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE primary_email = ? ORDER BY created_at LIMIT 1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }

    /// Finds the owner of any identity carrying this email
    pub async fn find_by_identity_email<'e, E>(
        executor: E,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.primary_email, u.display_name, u.avatar_url,
                   u.created_at, u.last_login_at, u.is_active
            FROM auth_identities ai
            JOIN users u ON u.id = ai.user_id
            WHERE ai.email = ?
            ORDER BY ai.created_at
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }

    /// Stamps `last_login_at` and applies a login refresh in one statement
    ///
    /// Returns the updated user, or None if the ID is unknown.
    pub async fn record_login<'e, E>(
        executor: E,
        id: Uuid,
        refresh: LoginRefresh,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET primary_email = COALESCE(primary_email, ?),
                display_name = COALESCE(?, display_name),
                avatar_url = COALESCE(?, avatar_url),
                last_login_at = ?
            WHERE id = ?
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(refresh.fill_primary_email)
        .bind(refresh.display_name)
        .bind(refresh.avatar_url)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }
}
