/// Per-user profile documents
///
/// Each user has at most one profile row holding two independently updated
/// JSON documents: the sender profile extracted from their resume, and a
/// free-form preferences map. The row is created lazily the first time either
/// is read or written.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

/// Resume-derived description of the person sending emails
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub name: String,

    #[serde(default)]
    pub education: Vec<String>,

    #[serde(default)]
    pub experiences: Vec<String>,

    #[serde(default)]
    pub skills: Vec<String>,

    #[serde(default)]
    pub projects: Vec<String>,
}

/// Free-form user settings keyed by name
pub type Preferences = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub sender_profile: Option<SenderProfile>,
    pub preferences: Preferences,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct UserProfileRow {
    user_id: Uuid,
    sender_profile: Option<Json<SenderProfile>>,
    preferences: Json<Preferences>,
    updated_at: DateTime<Utc>,
}

impl From<UserProfileRow> for UserProfile {
    fn from(row: UserProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            sender_profile: row.sender_profile.map(|Json(profile)| profile),
            preferences: row.preferences.0,
            updated_at: row.updated_at,
        }
    }
}

impl UserProfile {
    /// Creates the empty profile row if it does not exist yet
    ///
    /// # Errors
    ///
    /// Fails with a foreign key violation if the user does not exist.
    pub async fn ensure<'e, E>(executor: E, user_id: Uuid) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, sender_profile, preferences, updated_at)
            VALUES (?, NULL, '{}', ?)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn find<'e, E>(executor: E, user_id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, UserProfileRow>(
            r#"
            SELECT user_id, sender_profile, preferences, updated_at
            FROM user_profiles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    pub async fn set_sender_profile<'e, E>(
        executor: E,
        user_id: Uuid,
        profile: &SenderProfile,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE user_profiles SET sender_profile = ?, updated_at = ? WHERE user_id = ?")
            .bind(Json(profile))
            .bind(Utc::now())
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn set_preferences<'e, E>(
        executor: E,
        user_id: Uuid,
        preferences: &Preferences,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE user_profiles SET preferences = ?, updated_at = ? WHERE user_id = ?")
            .bind(Json(preferences))
            .bind(Utc::now())
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(())
    }
}
