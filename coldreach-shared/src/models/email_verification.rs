/// Email verification tokens
///
/// Only the keyed hash of a token is stored. A token is usable once: consuming
/// it is a conditional update on `used_at IS NULL`, so two concurrent
/// presentations cannot both succeed. The update is the first statement of the
/// verifying transaction, which makes SQLite take the write lock up front.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailVerification {
    pub id: Uuid,

    pub identity_id: Uuid,

    #[serde(skip_serializing)]
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,

    pub used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl EmailVerification {
    /// Stores a new token hash for an identity
    pub async fn create<'e, E>(
        executor: E,
        identity_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let verification = sqlx::query_as::<_, EmailVerification>(
            r#"
            INSERT INTO email_verifications (id, identity_id, token_hash, expires_at, used_at, created_at)
            VALUES (?, ?, ?, ?, NULL, ?)
            RETURNING id, identity_id, token_hash, expires_at, used_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(identity_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(executor)
        .await?;

        Ok(verification)
    }

    /// Marks the token with this hash used, if nobody has yet
    ///
    /// Returns the consumed row, or None when the hash is unknown or the token
    /// was already used. Expiry is left to the caller, who rolls back if the
    /// returned row turns out to be stale.
    pub async fn consume<'e, E>(executor: E, token_hash: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let verification = sqlx::query_as::<_, EmailVerification>(
            r#"
            UPDATE email_verifications
            SET used_at = ?
            WHERE token_hash = ? AND used_at IS NULL
            RETURNING id, identity_id, token_hash, expires_at, used_at, created_at
            "#,
        )
        .bind(Utc::now())
        .bind(token_hash)
        .fetch_optional(executor)
        .await?;

        Ok(verification)
    }

    /// Whether the token had expired at `now`, regardless of `used_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
