/// Invite-gated authentication and the per-user profile store
///
/// # Modules
///
/// - [`config`]: invite gating, verification TTL and the secret key, read from the environment
/// - [`error`]: `AuthError` and the invite rejection reasons
/// - [`password`]: Argon2id password hashing
/// - [`secret`]: invite code and verification token generation, keyed hashing
/// - [`service`]: `AuthService`, the single entry point for every auth operation
///
/// # Secrets at rest
///
/// - **Passwords**: Argon2id with 64 MB memory, 3 iterations, 4 lanes
/// - **Invite codes and verification tokens**: HMAC-SHA256 under `AUTH_SECRET_KEY`;
///   plaintext is returned exactly once, when issued
///
/// # Example
///
/// ```no_run
/// use coldreach_shared::auth::config::AuthConfig;
/// use coldreach_shared::auth::service::{AuthService, NewInvite};
/// use coldreach_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let service = AuthService::new(pool, AuthConfig::from_env()?);
///
/// let created = service
///     .create_invite(NewInvite {
///         allowed_email: "ada@example.com".to_string(),
///         max_uses: Some(1),
///         ..Default::default()
///     })
///     .await?;
/// println!("Invite code: {}", created.code);
/// # Ok(())
/// # }
/// ```

pub mod config;
pub mod error;
pub mod password;
pub mod secret;
pub mod service;

pub use error::{AuthError, AuthResult, InviteRejection};
pub use service::AuthService;
