/// Auth service: signup, login, verification, invites and profiles
///
/// `AuthService` is the only writer to the identity store. Every operation runs
/// in at most one transaction that either commits as a whole or rolls back.
///
/// # Locking
///
/// SQLite allows one writer at a time. Write transactions here start with a
/// write statement, so the connection takes the write lock (waiting out the
/// busy timeout) before any of the reads its decisions depend on. A
/// transaction that read first and wrote later could instead fail with
/// `SQLITE_BUSY` after another writer committed in between.
///
/// # Example
///
/// ```no_run
/// use coldreach_shared::auth::config::AuthConfig;
/// use coldreach_shared::auth::service::{AuthService, PasswordSignup, RequestMeta};
/// use coldreach_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::for_path("data/coldreach.db")).await?;
/// let service = AuthService::new(pool, AuthConfig::from_env()?);
///
/// let pending = service
///     .create_password_user(
///         PasswordSignup {
///             email: "Ada@Example.com".to_string(),
///             password: "correct horse battery".to_string(),
///             display_name: Some("Ada".to_string()),
///             invite_code: Some("INV-7KQ2MZP9WA".to_string()),
///         },
///         &RequestMeta::default(),
///     )
///     .await?;
///
/// // Deliver pending.token out of band, then:
/// let user_id = service.verify_email_token(&pending.token).await?;
/// assert_eq!(user_id, Some(pending.user_id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::config::AuthConfig;
use crate::auth::error::{AuthError, AuthResult, InviteRejection};
use crate::auth::password::{hash_password, verify_dummy, verify_password, PasswordError};
use crate::auth::secret::{generate_invite_code, generate_verification_token, SecretHasher};
use crate::models::auth_identity::{AuthIdentity, CreateAuthIdentity, IdentityProvider};
use crate::models::email_verification::EmailVerification;
use crate::models::invite::{CreateInvite, CreateInviteUsage, Invite, InviteStatus, InviteUsage};
use crate::models::login_event::{CreateLoginEvent, LoginEvent, LoginReason};
use crate::models::user::{CreateUser, LoginRefresh, User};
use crate::models::user_profile::{Preferences, SenderProfile, UserProfile};

/// How many fresh codes `create_invite` tries before giving up on collisions
const MAX_INVITE_CODE_ATTEMPTS: usize = 5;

/// Where a request came from, recorded on audit rows
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }
}

/// Input for a password signup
#[derive(Clone, Validate)]
pub struct PasswordSignup {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    pub display_name: Option<String>,

    pub invite_code: Option<String>,
}

#[derive(Validate)]
struct InviteEmail {
    #[validate(email(message = "Invalid email format"))]
    email: String,
}

/// A freshly issued verification token
///
/// The plaintext token exists only here; the store keeps its keyed hash.
#[derive(Clone)]
pub struct PendingVerification {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Normalized email the token was issued for
    pub email: String,
    pub user_id: Uuid,
    /// Database invite that admitted the signup, if any
    pub invite_id: Option<Uuid>,
}

impl std::fmt::Debug for PendingVerification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingVerification")
            .field("expires_at", &self.expires_at)
            .field("email", &self.email)
            .field("user_id", &self.user_id)
            .field("invite_id", &self.invite_id)
            .finish_non_exhaustive()
    }
}

/// Claims asserted by Google for a sign-in
#[derive(Debug, Clone, Default)]
pub struct GoogleLogin {
    /// OAuth subject
    pub sub: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Only `Some(true)` allows linking to an existing account by email
    pub email_verified: Option<bool>,
    pub invite_code: Option<String>,
}

/// Which path a Google sign-in took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GoogleResolution {
    /// The Google identity already existed
    Existing,
    /// The Google identity was attached to an existing user by email
    Linked,
    /// A new user was created
    Created,
}

#[derive(Debug, Clone)]
pub struct GoogleLoginOutcome {
    pub user: User,
    pub resolution: GoogleResolution,
    /// Database invite that admitted a new account, if any
    pub invite_id: Option<Uuid>,
}

/// Input for creating an invite
#[derive(Debug, Clone, Default)]
pub struct NewInvite {
    pub allowed_email: String,
    pub label: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// None means unlimited
    pub max_uses: Option<i64>,
}

/// Invite metadata safe to show to administrators
///
/// Carries neither the code nor its hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InviteSummary {
    pub id: Uuid,
    pub label: Option<String>,
    pub allowed_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub status: InviteStatus,
}

impl InviteSummary {
    fn from_invite(invite: Invite, now: DateTime<Utc>) -> Self {
        let status = invite.status(now);
        Self {
            id: invite.id,
            label: invite.label,
            allowed_email: invite.allowed_email,
            created_at: invite.created_at,
            expires_at: invite.expires_at,
            revoked_at: invite.revoked_at,
            max_uses: invite.max_uses,
            used_count: invite.used_count,
            status,
        }
    }
}

/// A newly created invite and its plaintext code, shown once
#[derive(Debug, Clone)]
pub struct CreatedInvite {
    pub code: String,
    pub invite: InviteSummary,
}

/// Who redeemed an invite
#[derive(Debug, Clone, Default)]
pub struct InviteRedemption {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub provider: Option<IdentityProvider>,
}

pub struct AuthService {
    pool: SqlitePool,
    config: AuthConfig,
    hasher: SecretHasher,
}

impl AuthService {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let hasher = SecretHasher::new(&config.secret_key);
        Self {
            pool,
            config,
            hasher,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Password accounts
    // ------------------------------------------------------------------

    /// Creates an unverified password account and issues its first token
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a malformed email or a password under 8 characters
    /// - `InviteRequired`, `InviteInvalid` or `SignupDisabled` from invite gating
    /// - `AccountExists` if any identity already uses the email
    pub async fn create_password_user(
        &self,
        signup: PasswordSignup,
        meta: &RequestMeta,
    ) -> AuthResult<PendingVerification> {
        let signup = PasswordSignup {
            email: normalize_email(&signup.email),
            display_name: non_empty(signup.display_name),
            ..signup
        };
        signup
            .validate()
            .map_err(|e| AuthError::InvalidInput(e.to_string()))?;

        let password_hash = hash_in_background(signup.password.clone()).await?;
        let email = signup.email;

        let mut tx = self.pool.begin().await?;

        // Insert first so the transaction holds the write lock before the
        // invite and duplicate checks read.
        let user = User::create(
            &mut *tx,
            CreateUser {
                primary_email: Some(email.clone()),
                display_name: signup.display_name,
                ..Default::default()
            },
        )
        .await?;

        let invite_id = self
            .check_invite(
                &mut tx,
                signup.invite_code.as_deref(),
                Some(&email),
                self.config.invite_only,
            )
            .await?;

        if AuthIdentity::email_in_use(&mut *tx, &email).await? {
            debug!(email = %email, "Signup rejected, email already in use");
            return Err(AuthError::AccountExists);
        }

        let identity = AuthIdentity::create(
            &mut *tx,
            CreateAuthIdentity {
                user_id: user.id,
                provider: IdentityProvider::Password,
                provider_sub: email.clone(),
                email: Some(email.clone()),
                password_hash: Some(password_hash),
                email_verified: false,
                last_used_at: None,
            },
        )
        .await
        .map_err(account_exists_on_conflict)?;

        UserProfile::ensure(&mut *tx, user.id).await?;

        let (token, expires_at) = self.issue_verification(&mut tx, identity.id).await?;

        LoginEvent::create(
            &mut *tx,
            event(
                Some(user.id),
                IdentityProvider::Password,
                Some(&email),
                true,
                LoginReason::Signup,
                meta,
            ),
        )
        .await?;

        tx.commit().await?;

        info!(user_id = %user.id, invite_id = ?invite_id, "Password account created");

        Ok(PendingVerification {
            token,
            expires_at,
            email,
            user_id: user.id,
            invite_id,
        })
    }

    /// Logs in with email and password
    ///
    /// Every attempt leaves exactly one login event, failures included.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown account or wrong password
    /// - `EmailNotVerified` for a correct password on an unverified identity
    pub async fn authenticate_password(
        &self,
        email: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> AuthResult<User> {
        let email = normalize_email(email);

        let identity = if email.is_empty() || password.is_empty() {
            None
        } else {
            AuthIdentity::find_by_provider_sub(&self.pool, IdentityProvider::Password, &email)
                .await?
        };

        let stored_hash = identity.as_ref().and_then(|i| i.password_hash.clone());
        let password_ok = verify_in_background(password.to_string(), stored_hash).await?;

        let mut tx = self.pool.begin().await?;

        let identity = match identity {
            Some(identity) if password_ok => identity,
            _ => {
                LoginEvent::create(
                    &mut *tx,
                    event(
                        None,
                        IdentityProvider::Password,
                        non_empty_str(&email),
                        false,
                        LoginReason::InvalidCredentials,
                        meta,
                    ),
                )
                .await?;
                tx.commit().await?;

                warn!(email = %email, "Password login rejected: invalid credentials");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !identity.email_verified {
            LoginEvent::create(
                &mut *tx,
                event(
                    Some(identity.user_id),
                    IdentityProvider::Password,
                    Some(&email),
                    false,
                    LoginReason::EmailNotVerified,
                    meta,
                ),
            )
            .await?;
            tx.commit().await?;

            warn!(user_id = %identity.user_id, "Password login rejected: email not verified");
            return Err(AuthError::EmailNotVerified);
        }

        AuthIdentity::touch(&mut *tx, IdentityProvider::Password, &email).await?;
        let user = User::record_login(&mut *tx, identity.user_id, LoginRefresh::default())
            .await?
            .ok_or(AuthError::UserNotFound)?;
        UserProfile::ensure(&mut *tx, user.id).await?;
        LoginEvent::create(
            &mut *tx,
            event(
                Some(user.id),
                IdentityProvider::Password,
                Some(&email),
                true,
                LoginReason::Login,
                meta,
            ),
        )
        .await?;

        tx.commit().await?;

        info!(user_id = %user.id, "Password login succeeded");
        Ok(user)
    }

    /// Consumes a verification token and marks its identity verified
    ///
    /// Returns the user ID, or None when the token is unknown, already used or
    /// expired. A token is consumed at most once, even when presented
    /// concurrently.
    pub async fn verify_email_token(&self, token: &str) -> AuthResult<Option<Uuid>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        let Some(verification) =
            EmailVerification::consume(&mut *tx, &self.hasher.digest(token)).await?
        else {
            debug!("Verification token unknown or already used");
            return Ok(None);
        };

        if verification.is_expired(Utc::now()) {
            // Dropping the transaction rolls back the consumption
            debug!(verification_id = %verification.id, "Verification token expired");
            return Ok(None);
        }

        let Some(user_id) = AuthIdentity::mark_verified(&mut *tx, verification.identity_id).await?
        else {
            return Ok(None);
        };
        UserProfile::ensure(&mut *tx, user_id).await?;

        tx.commit().await?;

        info!(user_id = %user_id, "Email verified");
        Ok(Some(user_id))
    }

    /// Issues another verification token for an unverified password account
    ///
    /// Earlier tokens stay valid until they expire.
    ///
    /// # Errors
    ///
    /// - `NoPasswordAccount` if no password identity uses the email
    /// - `AlreadyVerified` if the identity is verified
    pub async fn resend_email_verification(
        &self,
        email: &str,
        meta: &RequestMeta,
    ) -> AuthResult<PendingVerification> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::InvalidInput("Email is required".to_string()));
        }

        let identity =
            AuthIdentity::find_by_provider_sub(&self.pool, IdentityProvider::Password, &email)
                .await?
                .ok_or(AuthError::NoPasswordAccount)?;

        if identity.email_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let mut tx = self.pool.begin().await?;

        let (token, expires_at) = self.issue_verification(&mut tx, identity.id).await?;
        LoginEvent::create(
            &mut *tx,
            event(
                Some(identity.user_id),
                IdentityProvider::Password,
                Some(&email),
                true,
                LoginReason::ResendVerification,
                meta,
            ),
        )
        .await?;

        tx.commit().await?;

        info!(user_id = %identity.user_id, "Verification token reissued");

        Ok(PendingVerification {
            token,
            expires_at,
            email,
            user_id: identity.user_id,
            invite_id: None,
        })
    }

    async fn issue_verification(
        &self,
        conn: &mut SqliteConnection,
        identity_id: Uuid,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        let token = generate_verification_token();
        let expires_at = Utc::now() + self.config.email_verify_ttl();

        EmailVerification::create(&mut *conn, identity_id, &self.hasher.digest(&token), expires_at)
            .await?;

        Ok((token, expires_at))
    }

    // ------------------------------------------------------------------
    // Google accounts
    // ------------------------------------------------------------------

    /// Signs in with Google claims
    ///
    /// Resolution order:
    /// 1. an existing Google identity for `sub` logs in, refreshing non-empty
    ///    display name and avatar and filling a missing primary email;
    /// 2. otherwise, when Google asserts the email is verified, the identity is
    ///    attached to the user owning that email (primary email first, then any
    ///    identity email);
    /// 3. otherwise a new user is created, subject to signup invite gating.
    pub async fn authenticate_google(
        &self,
        login: GoogleLogin,
        meta: &RequestMeta,
    ) -> AuthResult<GoogleLoginOutcome> {
        let sub = login.sub.trim().to_string();
        if sub.is_empty() {
            return Err(AuthError::InvalidInput("Missing Google subject".to_string()));
        }

        let email = login
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());
        let display_name = non_empty(login.display_name);
        let avatar_url = non_empty(login.avatar_url);
        let email_verified = login.email_verified == Some(true);

        let mut tx = self.pool.begin().await?;

        if let Some(user_id) = AuthIdentity::touch(&mut *tx, IdentityProvider::Google, &sub).await? {
            let user = User::record_login(
                &mut *tx,
                user_id,
                LoginRefresh {
                    fill_primary_email: email.clone(),
                    display_name,
                    avatar_url,
                },
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;
            UserProfile::ensure(&mut *tx, user.id).await?;
            LoginEvent::create(
                &mut *tx,
                event(
                    Some(user.id),
                    IdentityProvider::Google,
                    email.as_deref(),
                    true,
                    LoginReason::Login,
                    meta,
                ),
            )
            .await?;

            tx.commit().await?;

            info!(user_id = %user.id, "Google login succeeded");
            return Ok(GoogleLoginOutcome {
                user,
                resolution: GoogleResolution::Existing,
                invite_id: None,
            });
        }

        if let (Some(email), true) = (email.as_deref(), email_verified) {
            let existing = match User::find_by_primary_email(&mut *tx, email).await? {
                Some(user) => Some(user),
                None => User::find_by_identity_email(&mut *tx, email).await?,
            };

            if let Some(existing) = existing {
                AuthIdentity::create(
                    &mut *tx,
                    CreateAuthIdentity {
                        user_id: existing.id,
                        provider: IdentityProvider::Google,
                        provider_sub: sub.clone(),
                        email: Some(email.to_string()),
                        password_hash: None,
                        email_verified: true,
                        last_used_at: Some(Utc::now()),
                    },
                )
                .await?;
                let user = User::record_login(
                    &mut *tx,
                    existing.id,
                    LoginRefresh {
                        fill_primary_email: None,
                        display_name,
                        avatar_url,
                    },
                )
                .await?
                .ok_or(AuthError::UserNotFound)?;
                UserProfile::ensure(&mut *tx, user.id).await?;
                LoginEvent::create(
                    &mut *tx,
                    event(
                        Some(user.id),
                        IdentityProvider::Google,
                        Some(email),
                        true,
                        LoginReason::LinkAndLogin,
                        meta,
                    ),
                )
                .await?;

                tx.commit().await?;

                info!(user_id = %user.id, "Google identity linked to existing user");
                return Ok(GoogleLoginOutcome {
                    user,
                    resolution: GoogleResolution::Linked,
                    invite_id: None,
                });
            }
        }

        let invite_id = self
            .check_invite(
                &mut tx,
                login.invite_code.as_deref(),
                email.as_deref(),
                self.config.invite_only,
            )
            .await?;

        let user = User::create(
            &mut *tx,
            CreateUser {
                primary_email: email.clone(),
                display_name,
                avatar_url,
                last_login_at: Some(Utc::now()),
            },
        )
        .await?;
        AuthIdentity::create(
            &mut *tx,
            CreateAuthIdentity {
                user_id: user.id,
                provider: IdentityProvider::Google,
                provider_sub: sub,
                email: email.clone(),
                password_hash: None,
                email_verified,
                last_used_at: Some(Utc::now()),
            },
        )
        .await?;
        UserProfile::ensure(&mut *tx, user.id).await?;
        LoginEvent::create(
            &mut *tx,
            event(
                Some(user.id),
                IdentityProvider::Google,
                email.as_deref(),
                true,
                LoginReason::SignupAndLogin,
                meta,
            ),
        )
        .await?;

        tx.commit().await?;

        info!(user_id = %user.id, invite_id = ?invite_id, "Google account created");
        Ok(GoogleLoginOutcome {
            user,
            resolution: GoogleResolution::Created,
            invite_id,
        })
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn get_user(&self, user_id: Uuid) -> AuthResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, user_id).await?)
    }

    /// Login events recorded for a user, oldest first
    pub async fn list_login_events(&self, user_id: Uuid) -> AuthResult<Vec<LoginEvent>> {
        Ok(LoginEvent::list_for_user(&self.pool, user_id).await?)
    }

    // ------------------------------------------------------------------
    // Invites
    // ------------------------------------------------------------------

    /// Checks an invite for signup; returns the database invite ID, if any
    ///
    /// Side-effect free. Returns `Ok(None)` when signup gating is off or a
    /// static code matched.
    pub async fn validate_invite_for_signup(
        &self,
        code: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<Option<Uuid>> {
        self.validate_invite(code, email, self.config.invite_only).await
    }

    /// Checks an invite for login; same rules as signup, gated separately
    pub async fn validate_invite_for_login(
        &self,
        code: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<Option<Uuid>> {
        self.validate_invite(code, email, self.config.invite_required_for_login)
            .await
    }

    async fn validate_invite(
        &self,
        code: Option<&str>,
        email: Option<&str>,
        enforce: bool,
    ) -> AuthResult<Option<Uuid>> {
        if !enforce {
            return Ok(None);
        }

        let email = email.map(normalize_email).filter(|e| !e.is_empty());
        let mut tx = self.pool.begin().await?;
        let invite_id = self
            .check_invite(&mut tx, code, email.as_deref(), enforce)
            .await?;
        tx.commit().await?;

        Ok(invite_id)
    }

    /// Invite gating shared by validation, signup and Google account creation
    ///
    /// Once any invite exists in the database the static code list is no
    /// longer consulted.
    async fn check_invite(
        &self,
        conn: &mut SqliteConnection,
        code: Option<&str>,
        email: Option<&str>,
        enforce: bool,
    ) -> AuthResult<Option<Uuid>> {
        if !enforce {
            return Ok(None);
        }

        let code = code.map(str::trim).unwrap_or_default();
        if code.is_empty() {
            return Err(AuthError::InviteRequired);
        }

        if Invite::any_exist(&mut *conn).await? {
            let invite = Invite::find_by_code_hash(&mut *conn, &self.hasher.digest(code))
                .await?
                .ok_or(AuthError::InviteInvalid(InviteRejection::Unknown))?;

            if let Some(rejection) = invite.rejection_for(email, Utc::now()) {
                debug!(invite_id = %invite.id, reason = rejection.as_str(), "Invite rejected");
                return Err(AuthError::InviteInvalid(rejection));
            }

            return Ok(Some(invite.id));
        }

        if self.config.invite_codes.is_empty() {
            warn!("Invite gating is on but no invites are configured");
            return Err(AuthError::SignupDisabled);
        }

        if self.config.invite_codes.iter().any(|c| c == code) {
            debug!("Static invite code accepted");
            Ok(None)
        } else {
            Err(AuthError::InviteInvalid(InviteRejection::Unknown))
        }
    }

    /// Whether a code would currently be recognized, ignoring email binding
    /// and remaining uses
    pub async fn is_known_invite_code(&self, code: &str) -> AuthResult<bool> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        let known = if Invite::any_exist(&mut *tx).await? {
            Invite::find_by_code_hash(&mut *tx, &self.hasher.digest(code))
                .await?
                .map_or(false, |invite| invite.status(Utc::now()) == InviteStatus::Active)
        } else {
            self.config.invite_codes.iter().any(|c| c == code)
        };
        tx.commit().await?;

        Ok(known)
    }

    /// Redeems one use of a database invite
    ///
    /// The increment only applies to an unrevoked, unexpired invite with uses
    /// remaining, so with `max_uses = N` at most N redemptions succeed however
    /// they interleave.
    ///
    /// # Errors
    ///
    /// `InviteInvalid` when the invite is unknown, revoked, expired or
    /// exhausted; nothing is written in that case.
    pub async fn record_invite_use(
        &self,
        invite_id: Uuid,
        redemption: InviteRedemption,
        meta: &RequestMeta,
    ) -> AuthResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        if !Invite::try_increment(&mut *tx, invite_id, now).await? {
            let rejection = match Invite::find_by_id(&mut *tx, invite_id).await? {
                Some(invite) => match invite.status(now) {
                    InviteStatus::Revoked => InviteRejection::Revoked,
                    InviteStatus::Expired => InviteRejection::Expired,
                    InviteStatus::Active => InviteRejection::Exhausted,
                },
                None => InviteRejection::Unknown,
            };
            warn!(invite_id = %invite_id, reason = rejection.as_str(), "Invite redemption refused");
            return Err(AuthError::InviteInvalid(rejection));
        }

        InviteUsage::create(
            &mut *tx,
            CreateInviteUsage {
                invite_id,
                user_id: redemption.user_id,
                email: redemption
                    .email
                    .as_deref()
                    .map(normalize_email)
                    .filter(|e| !e.is_empty()),
                provider: redemption.provider,
                ip: meta.ip.clone(),
                user_agent: meta.user_agent.clone(),
            },
        )
        .await?;

        tx.commit().await?;

        info!(invite_id = %invite_id, user_id = ?redemption.user_id, "Invite redeemed");
        Ok(())
    }

    /// Creates an email-bound invite and returns its plaintext code once
    pub async fn create_invite(&self, new_invite: NewInvite) -> AuthResult<CreatedInvite> {
        let allowed_email = normalize_email(&new_invite.allowed_email);
        if allowed_email.is_empty() {
            return Err(AuthError::InvalidInput("allowed_email is required".to_string()));
        }
        InviteEmail {
            email: allowed_email.clone(),
        }
        .validate()
        .map_err(|e| AuthError::InvalidInput(e.to_string()))?;

        if matches!(new_invite.max_uses, Some(max) if max < 0) {
            return Err(AuthError::InvalidInput(
                "max_uses must not be negative".to_string(),
            ));
        }

        let label = non_empty(new_invite.label);
        let mut last_error = None;

        for attempt in 1..=MAX_INVITE_CODE_ATTEMPTS {
            let code = generate_invite_code();
            let result = Invite::create(
                &self.pool,
                CreateInvite {
                    code_hash: self.hasher.digest(&code),
                    label: label.clone(),
                    allowed_email: Some(allowed_email.clone()),
                    expires_at: new_invite.expires_at,
                    max_uses: new_invite.max_uses,
                },
            )
            .await;

            match result {
                Ok(invite) => {
                    info!(
                        invite_id = %invite.id,
                        allowed_email = %allowed_email,
                        max_uses = ?invite.max_uses,
                        "Invite created"
                    );
                    return Ok(CreatedInvite {
                        code,
                        invite: InviteSummary::from_invite(invite, Utc::now()),
                    });
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, "Invite code collision, regenerating");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error
            .map(AuthError::from)
            .unwrap_or_else(|| AuthError::InvalidInput("could not generate invite".to_string())))
    }

    /// Revokes one invite; false if it is unknown or already revoked
    pub async fn revoke_invite_by_id(&self, invite_id: Uuid) -> AuthResult<bool> {
        let revoked = Invite::revoke_by_id(&self.pool, invite_id).await?;
        if revoked {
            info!(invite_id = %invite_id, "Invite revoked");
        }
        Ok(revoked)
    }

    /// Revokes every unrevoked invite bound to the email
    pub async fn revoke_invites_for_email(&self, email: &str) -> AuthResult<u64> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Ok(0);
        }

        let count = Invite::revoke_for_email(&self.pool, &email).await?;
        info!(email = %email, count, "Invites revoked for email");
        Ok(count)
    }

    /// Lists invites newest first, without codes
    pub async fn list_invites(
        &self,
        email: Option<&str>,
        include_revoked: bool,
    ) -> AuthResult<Vec<InviteSummary>> {
        let email = email.map(normalize_email).filter(|e| !e.is_empty());
        let invites = Invite::list(&self.pool, email.as_deref(), include_revoked).await?;

        let now = Utc::now();
        Ok(invites
            .into_iter()
            .map(|invite| InviteSummary::from_invite(invite, now))
            .collect())
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Reads a user's profile, creating the empty row on first access
    ///
    /// # Errors
    ///
    /// `UserNotFound` if the user does not exist.
    pub async fn get_user_profile(&self, user_id: Uuid) -> AuthResult<UserProfile> {
        let mut tx = self.pool.begin().await?;

        UserProfile::ensure(&mut *tx, user_id)
            .await
            .map_err(user_not_found_on_fk)?;
        let profile = UserProfile::find(&mut *tx, user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        tx.commit().await?;
        Ok(profile)
    }

    /// Replaces the sender profile and/or preferences
    ///
    /// `None` leaves that document unchanged. Returns the stored profile.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a sender profile without a name
    /// - `UserNotFound` if the user does not exist
    pub async fn update_user_profile(
        &self,
        user_id: Uuid,
        sender_profile: Option<SenderProfile>,
        preferences: Option<Preferences>,
    ) -> AuthResult<UserProfile> {
        if let Some(profile) = &sender_profile {
            if profile.name.trim().is_empty() {
                return Err(AuthError::InvalidInput(
                    "Sender profile requires a name".to_string(),
                ));
            }
        }

        let mut tx = self.pool.begin().await?;

        UserProfile::ensure(&mut *tx, user_id)
            .await
            .map_err(user_not_found_on_fk)?;

        if let Some(profile) = &sender_profile {
            UserProfile::set_sender_profile(&mut *tx, user_id, profile).await?;
        }
        if let Some(preferences) = &preferences {
            UserProfile::set_preferences(&mut *tx, user_id, preferences).await?;
        }

        let profile = UserProfile::find(&mut *tx, user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        tx.commit().await?;

        debug!(
            user_id = %user_id,
            sender_profile = sender_profile.is_some(),
            preferences = preferences.is_some(),
            "Profile updated"
        );
        Ok(profile)
    }
}

/// Trims and lowercases an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_empty_str(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn event(
    user_id: Option<Uuid>,
    provider: IdentityProvider,
    email: Option<&str>,
    success: bool,
    reason: LoginReason,
    meta: &RequestMeta,
) -> CreateLoginEvent {
    CreateLoginEvent {
        user_id,
        provider: Some(provider),
        email: email.map(str::to_string),
        success,
        reason,
        ip: meta.ip.clone(),
        user_agent: meta.user_agent.clone(),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn account_exists_on_conflict(err: sqlx::Error) -> AuthError {
    if is_unique_violation(&err) {
        AuthError::AccountExists
    } else {
        AuthError::Database(err)
    }
}

fn user_not_found_on_fk(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => AuthError::UserNotFound,
        _ => AuthError::Database(err),
    }
}

async fn hash_in_background(password: String) -> AuthResult<String> {
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| PasswordError::HashError(e.to_string()))?;

    Ok(hashed?)
}

/// Verifies against the stored hash, or burns a dummy verification when there
/// is none so unknown accounts cost the same as wrong passwords
async fn verify_in_background(password: String, stored_hash: Option<String>) -> AuthResult<bool> {
    let verified = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            verify_dummy(&password);
            Ok(false)
        }
    })
    .await
    .map_err(|e| PasswordError::VerifyError(e.to_string()))?;

    Ok(verified?)
}
