/// Login audit trail
///
/// One row per authentication attempt or account event. Rows are never updated;
/// deleting a user keeps its events with `user_id` set to NULL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::models::auth_identity::IdentityProvider;

/// What the event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoginReason {
    /// Password account created
    Signup,
    /// Successful login to an existing identity
    Login,
    /// Unknown account or wrong password
    InvalidCredentials,
    /// Correct password, email not yet verified
    EmailNotVerified,
    /// A new verification token was issued
    ResendVerification,
    /// A google identity was attached to an existing user
    LinkAndLogin,
    /// A new user was created through google
    SignupAndLogin,
}

impl LoginReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginReason::Signup => "signup",
            LoginReason::Login => "login",
            LoginReason::InvalidCredentials => "invalid_credentials",
            LoginReason::EmailNotVerified => "email_not_verified",
            LoginReason::ResendVerification => "resend_verification",
            LoginReason::LinkAndLogin => "link_and_login",
            LoginReason::SignupAndLogin => "signup_and_login",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoginEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub provider: Option<IdentityProvider>,
    pub email: Option<String>,
    pub success: bool,
    pub reason: LoginReason,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateLoginEvent {
    pub user_id: Option<Uuid>,
    pub provider: Option<IdentityProvider>,
    pub email: Option<String>,
    pub success: bool,
    pub reason: LoginReason,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl LoginEvent {
    pub async fn create<'e, E>(executor: E, data: CreateLoginEvent) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let event = sqlx::query_as::<_, LoginEvent>(
            r#"
            INSERT INTO login_events (id, user_id, provider, email, success, reason, ip, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, user_id, provider, email, success, reason, ip, user_agent, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(data.provider)
        .bind(data.email)
        .bind(data.success)
        .bind(data.reason)
        .bind(data.ip)
        .bind(data.user_agent)
        .bind(Utc::now())
        .fetch_one(executor)
        .await?;

        Ok(event)
    }

    /// Events for a user, oldest first
    pub async fn list_for_user<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let events = sqlx::query_as::<_, LoginEvent>(
            r#"
            SELECT id, user_id, provider, email, success, reason, ip, user_agent, created_at
            FROM login_events
            WHERE user_id = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;

        Ok(events)
    }

    /// Events recorded against an email, including failures with no user
    pub async fn list_for_email<'e, E>(executor: E, email: &str) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let events = sqlx::query_as::<_, LoginEvent>(
            r#"
            SELECT id, user_id, provider, email, success, reason, ip, user_agent, created_at
            FROM login_events
            WHERE email = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(email)
        .fetch_all(executor)
        .await?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_match_serde() {
        let reasons = [
            LoginReason::Signup,
            LoginReason::Login,
            LoginReason::InvalidCredentials,
            LoginReason::EmailNotVerified,
            LoginReason::ResendVerification,
            LoginReason::LinkAndLogin,
            LoginReason::SignupAndLogin,
        ];

        for reason in reasons {
            let json = serde_json::to_string(&reason).expect("serialize");
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }
}
