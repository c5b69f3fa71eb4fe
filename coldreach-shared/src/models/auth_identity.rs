/// Auth identity model
///
/// An identity is one way of logging into a user account. Password identities
/// use the normalized email as `provider_sub`; google identities use the OAuth
/// subject. `(provider, provider_sub)` is unique across the table, which is
/// what stops two concurrent signups from creating the same login.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE auth_identities (
///     id BLOB PRIMARY KEY NOT NULL,
///     user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     provider TEXT NOT NULL CHECK (provider IN ('password', 'google')),
///     provider_sub TEXT NOT NULL,
///     email TEXT,
///     password_hash TEXT,
///     email_verified INTEGER NOT NULL DEFAULT 0,
///     created_at TEXT NOT NULL,
///     last_used_at TEXT,
///     UNIQUE (provider, provider_sub)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

/// Login provider backing an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    Password,
    Google,
}

impl IdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProvider::Password => "password",
            IdentityProvider::Google => "google",
        }
    }
}

impl std::fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A login method attached to a user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthIdentity {
    pub id: Uuid,

    pub user_id: Uuid,

    pub provider: IdentityProvider,

    /// Normalized email (password) or OAuth subject (google)
    pub provider_sub: String,

    pub email: Option<String>,

    /// Argon2id hash; password identities only
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    pub email_verified: bool,

    pub created_at: DateTime<Utc>,

    pub last_used_at: Option<DateTime<Utc>>,
}

/// Input for creating an identity
#[derive(Debug, Clone)]
pub struct CreateAuthIdentity {
    pub user_id: Uuid,
    pub provider: IdentityProvider,
    pub provider_sub: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    /// Set when the identity is created as part of a login
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AuthIdentity {
    /// Inserts a new identity
    ///
    /// # Errors
    ///
    /// Fails with a unique violation if `(provider, provider_sub)` is taken.
    pub async fn create<'e, E>(executor: E, data: CreateAuthIdentity) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let identity = sqlx::query_as::<_, AuthIdentity>(
            r#"
            INSERT INTO auth_identities (
                id, user_id, provider, provider_sub, email, password_hash,
                email_verified, created_at, last_used_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, user_id, provider, provider_sub, email, password_hash,
                      email_verified, created_at, last_used_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(data.provider)
        .bind(data.provider_sub)
        .bind(data.email)
        .bind(data.password_hash)
        .bind(data.email_verified)
        .bind(Utc::now())
        .bind(data.last_used_at)
        .fetch_one(executor)
        .await?;

        Ok(identity)
    }

    /// Finds the identity for a provider and subject
    pub async fn find_by_provider_sub<'e, E>(
        executor: E,
        provider: IdentityProvider,
        provider_sub: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let identity = sqlx::query_as::<_, AuthIdentity>(
            r#"
            SELECT id, user_id, provider, provider_sub, email, password_hash,
                   email_verified, created_at, last_used_at
            FROM auth_identities
            WHERE provider = ? AND provider_sub = ?
            "#,
        )
        .bind(provider)
        .bind(provider_sub)
        .fetch_optional(executor)
        .await?;

        Ok(identity)
    }

    /// Whether any identity, of any provider, carries this email
    pub async fn email_in_use<'e, E>(executor: E, email: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM auth_identities WHERE email = ?)",
        )
        .bind(email)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    /// Stamps `last_used_at` on the identity for a provider and subject
    ///
    /// Returns the owning user ID, or None if no such identity exists. Being an
    /// update, it takes the write lock even when nothing matches.
    pub async fn touch<'e, E>(
        executor: E,
        provider: IdentityProvider,
        provider_sub: &str,
    ) -> Result<Option<Uuid>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE auth_identities
            SET last_used_at = ?
            WHERE provider = ? AND provider_sub = ?
            RETURNING user_id
            "#,
        )
        .bind(Utc::now())
        .bind(provider)
        .bind(provider_sub)
        .fetch_optional(executor)
        .await?;

        Ok(user_id)
    }

    /// Marks the identity's email as verified and stamps `last_used_at`
    ///
    /// Returns the owning user ID, or None if the identity is gone.
    pub async fn mark_verified<'e, E>(executor: E, id: Uuid) -> Result<Option<Uuid>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE auth_identities
            SET email_verified = 1, last_used_at = ?
            WHERE id = ?
            RETURNING user_id
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_strings() {
        assert_eq!(IdentityProvider::Password.as_str(), "password");
        assert_eq!(IdentityProvider::Google.to_string(), "google");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let identity = AuthIdentity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider: IdentityProvider::Password,
            provider_sub: "user@example.com".to_string(),
            email: Some("user@example.com".to_string()),
            password_hash: Some("$argon2id$secret".to_string()),
            email_verified: false,
            created_at: Utc::now(),
            last_used_at: None,
        };

        let json = serde_json::to_string(&identity).expect("serialize");
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"provider\":\"password\""));
    }
}
