/// Invite model and database operations
///
/// Invites gate signup (and optionally login). Only a keyed hash of the code is
/// stored; the plaintext is shown once when the invite is created.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE invites (
///     id BLOB PRIMARY KEY NOT NULL,
///     code_hash TEXT NOT NULL UNIQUE,
///     label TEXT,
///     allowed_email TEXT,
///     created_at TEXT NOT NULL,
///     expires_at TEXT,
///     revoked_at TEXT,
///     max_uses INTEGER CHECK (max_uses IS NULL OR max_uses >= 0),
///     used_count INTEGER NOT NULL DEFAULT 0,
///     CHECK (max_uses IS NULL OR used_count <= max_uses)
/// );
///
/// CREATE TABLE invite_usages (
///     id BLOB PRIMARY KEY NOT NULL,
///     invite_id BLOB NOT NULL REFERENCES invites(id) ON DELETE CASCADE,
///     user_id BLOB REFERENCES users(id) ON DELETE SET NULL,
///     email TEXT,
///     provider TEXT,
///     ip TEXT,
///     user_agent TEXT,
///     created_at TEXT NOT NULL
/// );
/// ```
///
/// # Limited-use invites
///
/// `used_count` only moves through [`Invite::try_increment`], a single
/// `UPDATE ... WHERE used_count < max_uses` whose affected-row count tells the
/// caller whether the slot was won. Concurrent redemptions of an invite with
/// `max_uses = N` therefore succeed exactly N times.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::auth::error::InviteRejection;
use crate::models::auth_identity::IdentityProvider;

/// Derived lifecycle state shown to administrators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Active,
    Expired,
    Revoked,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Active => "active",
            InviteStatus::Expired => "expired",
            InviteStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invite row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invite {
    pub id: Uuid,

    /// HMAC of the plaintext code
    #[serde(skip_serializing)]
    pub code_hash: String,

    pub label: Option<String>,

    /// When set, the invite is only valid for this normalized email
    pub allowed_email: Option<String>,

    pub created_at: DateTime<Utc>,

    pub expires_at: Option<DateTime<Utc>>,

    pub revoked_at: Option<DateTime<Utc>>,

    /// None means unlimited
    pub max_uses: Option<i64>,

    pub used_count: i64,
}

/// Input for creating an invite
#[derive(Debug, Clone)]
pub struct CreateInvite {
    pub code_hash: String,
    pub label: Option<String>,
    pub allowed_email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
}

impl Invite {
    pub async fn create<'e, E>(executor: E, data: CreateInvite) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let invite = sqlx::query_as::<_, Invite>(
            r#"
            INSERT INTO invites (
                id, code_hash, label, allowed_email, created_at,
                expires_at, revoked_at, max_uses, used_count
            )
            VALUES (?, ?, ?, ?, ?, ?, NULL, ?, 0)
            RETURNING id, code_hash, label, allowed_email, created_at,
                      expires_at, revoked_at, max_uses, used_count
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.code_hash)
        .bind(data.label)
        .bind(data.allowed_email)
        .bind(Utc::now())
        .bind(data.expires_at)
        .bind(data.max_uses)
        .fetch_one(executor)
        .await?;

        Ok(invite)
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let invite = sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, code_hash, label, allowed_email, created_at,
                   expires_at, revoked_at, max_uses, used_count
            FROM invites
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(invite)
    }

    pub async fn find_by_code_hash<'e, E>(
        executor: E,
        code_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let invite = sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, code_hash, label, allowed_email, created_at,
                   expires_at, revoked_at, max_uses, used_count
            FROM invites
            WHERE code_hash = ?
            "#,
        )
        .bind(code_hash)
        .fetch_optional(executor)
        .await?;

        Ok(invite)
    }

    /// Whether the table holds any invite at all, revoked ones included
    pub async fn any_exist<'e, E>(executor: E) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM invites)")
            .fetch_one(executor)
            .await?;

        Ok(exists)
    }

    /// Claims one use of the invite if it is usable at `now`
    ///
    /// Returns false when the invite is unknown, revoked, expired or has no
    /// uses left.
    pub async fn try_increment<'e, E>(
        executor: E,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE invites
            SET used_count = used_count + 1
            WHERE id = ?
              AND revoked_at IS NULL
              AND (expires_at IS NULL OR expires_at > ?)
              AND (max_uses IS NULL OR used_count < max_uses)
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Revokes one invite; false if unknown or already revoked
    pub async fn revoke_by_id<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result =
            sqlx::query("UPDATE invites SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
                .bind(Utc::now())
                .bind(id)
                .execute(executor)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revokes every unrevoked invite bound to an email, returning the count
    pub async fn revoke_for_email<'e, E>(executor: E, email: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE invites SET revoked_at = ? WHERE allowed_email = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(email)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Lists invites, newest first
    pub async fn list<'e, E>(
        executor: E,
        email: Option<&str>,
        include_revoked: bool,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let invites = sqlx::query_as::<_, Invite>(
            r#"
            SELECT id, code_hash, label, allowed_email, created_at,
                   expires_at, revoked_at, max_uses, used_count
            FROM invites
            WHERE (? IS NULL OR allowed_email = ?)
              AND (? OR revoked_at IS NULL)
            ORDER BY created_at DESC
            "#,
        )
        .bind(email)
        .bind(email)
        .bind(include_revoked)
        .fetch_all(executor)
        .await?;

        Ok(invites)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| expires_at <= now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.map_or(false, |max| self.used_count >= max)
    }

    pub fn status(&self, now: DateTime<Utc>) -> InviteStatus {
        if self.revoked_at.is_some() {
            InviteStatus::Revoked
        } else if self.is_expired(now) {
            InviteStatus::Expired
        } else {
            InviteStatus::Active
        }
    }

    /// First reason this invite cannot be used by `email`, if any
    ///
    /// Checks run in a fixed order: revoked, expired, bound email, remaining
    /// uses. A bound invite presented without an email is rejected.
    pub fn rejection_for(&self, email: Option<&str>, now: DateTime<Utc>) -> Option<InviteRejection> {
        if self.revoked_at.is_some() {
            return Some(InviteRejection::Revoked);
        }
        if self.is_expired(now) {
            return Some(InviteRejection::Expired);
        }
        if let Some(allowed) = self.allowed_email.as_deref() {
            if email != Some(allowed) {
                return Some(InviteRejection::EmailMismatch);
            }
        }
        if self.is_exhausted() {
            return Some(InviteRejection::Exhausted);
        }
        None
    }
}

/// Append-only redemption record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InviteUsage {
    pub id: Uuid,
    pub invite_id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub provider: Option<IdentityProvider>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateInviteUsage {
    pub invite_id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub provider: Option<IdentityProvider>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl InviteUsage {
    pub async fn create<'e, E>(executor: E, data: CreateInviteUsage) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let usage = sqlx::query_as::<_, InviteUsage>(
            r#"
            INSERT INTO invite_usages (id, invite_id, user_id, email, provider, ip, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, invite_id, user_id, email, provider, ip, user_agent, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.invite_id)
        .bind(data.user_id)
        .bind(data.email)
        .bind(data.provider)
        .bind(data.ip)
        .bind(data.user_agent)
        .bind(Utc::now())
        .fetch_one(executor)
        .await?;

        Ok(usage)
    }

    pub async fn list_for_invite<'e, E>(
        executor: E,
        invite_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let usages = sqlx::query_as::<_, InviteUsage>(
            r#"
            SELECT id, invite_id, user_id, email, provider, ip, user_agent, created_at
            FROM invite_usages
            WHERE invite_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(invite_id)
        .fetch_all(executor)
        .await?;

        Ok(usages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn invite() -> Invite {
        Invite {
            id: Uuid::new_v4(),
            code_hash: "hash".to_string(),
            label: None,
            allowed_email: None,
            created_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
            max_uses: None,
            used_count: 0,
        }
    }

    #[test]
    fn test_status() {
        let now = Utc::now();
        let mut inv = invite();
        assert_eq!(inv.status(now), InviteStatus::Active);

        inv.expires_at = Some(now - Duration::minutes(1));
        assert_eq!(inv.status(now), InviteStatus::Expired);

        inv.revoked_at = Some(now);
        assert_eq!(inv.status(now), InviteStatus::Revoked);
    }

    #[test]
    fn test_rejection_order() {
        let now = Utc::now();
        let mut inv = invite();
        inv.allowed_email = Some("a@example.com".to_string());
        inv.max_uses = Some(1);
        inv.used_count = 1;
        inv.expires_at = Some(now - Duration::minutes(1));
        inv.revoked_at = Some(now);

        assert_eq!(inv.rejection_for(None, now), Some(InviteRejection::Revoked));
        inv.revoked_at = None;
        assert_eq!(inv.rejection_for(None, now), Some(InviteRejection::Expired));
        inv.expires_at = None;
        assert_eq!(inv.rejection_for(None, now), Some(InviteRejection::EmailMismatch));
        assert_eq!(
            inv.rejection_for(Some("b@example.com"), now),
            Some(InviteRejection::EmailMismatch)
        );
        assert_eq!(
            inv.rejection_for(Some("a@example.com"), now),
            Some(InviteRejection::Exhausted)
        );
        inv.used_count = 0;
        assert_eq!(inv.rejection_for(Some("a@example.com"), now), None);
    }

    #[test]
    fn test_unbound_unlimited_invite_accepts_anyone() {
        let inv = invite();
        assert_eq!(inv.rejection_for(None, Utc::now()), None);
        assert!(!inv.is_exhausted());
    }

    #[test]
    fn test_zero_max_uses_is_exhausted() {
        let mut inv = invite();
        inv.max_uses = Some(0);
        assert!(inv.is_exhausted());
    }

    #[test]
    fn test_code_hash_not_serialized() {
        let json = serde_json::to_string(&invite()).expect("serialize");
        assert!(!json.contains("code_hash"));
    }
}
