/// Auth service configuration
///
/// Values come from the process environment (and a `.env` file when present)
/// through the `config` crate. Keys are matched case-insensitively, so
/// `INVITE_ONLY` in the environment populates `invite_only` here.
///
/// # Environment Variables
///
/// - `INVITE_ONLY`: gate signups behind invite codes (default: true)
/// - `INVITE_REQUIRED_FOR_LOGIN`: also gate logins (default: false)
/// - `INVITE_CODES`: comma-separated static invite codes
/// - `INVITE_CODE`: single static code, accepted for older deployments
/// - `EMAIL_VERIFY_TTL_HOURS`: verification token lifetime (default: 24)
/// - `AUTH_SECRET_KEY`: key for hashing invite codes and tokens (required)
///
/// # Example
///
/// ```no_run
/// use coldreach_shared::auth::config::AuthConfig;
///
/// # fn example() -> Result<(), config::ConfigError> {
/// let config = AuthConfig::from_env()?;
/// println!("invite only: {}", config.invite_only);
/// # Ok(())
/// # }
/// ```

use chrono::Duration;
use config::{Config, ConfigError, Environment};

/// Shortest accepted `AUTH_SECRET_KEY`
pub const MIN_SECRET_KEY_LENGTH: usize = 16;

const DEFAULT_EMAIL_VERIFY_TTL_HOURS: i64 = 24;

/// Settings consumed by [`crate::auth::service::AuthService`]
#[derive(Clone)]
pub struct AuthConfig {
    /// Require a valid invite to create an account
    pub invite_only: bool,

    /// Require a valid invite on every login as well
    pub invite_required_for_login: bool,

    /// Static invite codes, used only while the database holds no invites
    pub invite_codes: Vec<String>,

    /// Lifetime of email verification tokens
    pub email_verify_ttl_hours: i64,

    /// Server secret keying the stored hashes of codes and tokens
    pub secret_key: String,
}

impl AuthConfig {
    /// Configuration with gating defaults and the given secret
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            invite_only: true,
            invite_required_for_login: false,
            invite_codes: Vec::new(),
            email_verify_ttl_hours: DEFAULT_EMAIL_VERIFY_TTL_HOURS,
            secret_key: secret_key.into(),
        }
    }

    /// Loads configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed, or `AUTH_SECRET_KEY` is
    /// missing or shorter than [`MIN_SECRET_KEY_LENGTH`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .add_source(Environment::default())
            .build()?;

        Self::from_settings(&settings)
    }

    /// Reads configuration from an already-built settings tree
    pub fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        let invite_only = optional(settings.get_bool("invite_only"))?.unwrap_or(true);
        let invite_required_for_login =
            optional(settings.get_bool("invite_required_for_login"))?.unwrap_or(false);
        let email_verify_ttl_hours = optional(settings.get_int("email_verify_ttl_hours"))?
            .unwrap_or(DEFAULT_EMAIL_VERIFY_TTL_HOURS);

        if email_verify_ttl_hours <= 0 {
            return Err(ConfigError::Message(
                "EMAIL_VERIFY_TTL_HOURS must be positive".to_string(),
            ));
        }

        let mut invite_codes = optional(settings.get_string("invite_codes"))?
            .map(|raw| parse_code_list(&raw))
            .unwrap_or_default();

        if let Some(legacy) = optional(settings.get_string("invite_code"))? {
            let legacy = legacy.trim();
            if !legacy.is_empty() && !invite_codes.iter().any(|c| c == legacy) {
                invite_codes.push(legacy.to_string());
            }
        }

        let secret_key = optional(settings.get_string("auth_secret_key"))?
            .unwrap_or_default()
            .trim()
            .to_string();

        if secret_key.is_empty() {
            return Err(ConfigError::NotFound("AUTH_SECRET_KEY".to_string()));
        }
        if secret_key.len() < MIN_SECRET_KEY_LENGTH {
            return Err(ConfigError::Message(format!(
                "AUTH_SECRET_KEY must be at least {} characters long",
                MIN_SECRET_KEY_LENGTH
            )));
        }

        Ok(Self {
            invite_only,
            invite_required_for_login,
            invite_codes,
            email_verify_ttl_hours,
            secret_key,
        })
    }

    /// Token lifetime as a duration
    pub fn email_verify_ttl(&self) -> Duration {
        Duration::hours(self.email_verify_ttl_hours)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("invite_only", &self.invite_only)
            .field("invite_required_for_login", &self.invite_required_for_login)
            .field("invite_codes", &self.invite_codes.len())
            .field("email_verify_ttl_hours", &self.email_verify_ttl_hours)
            .finish_non_exhaustive()
    }
}

fn optional<T>(value: Result<T, ConfigError>) -> Result<Option<T>, ConfigError> {
    match value {
        Ok(v) => Ok(Some(v)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_code_list(raw: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-long-enough";

    fn settings(pairs: &[(&str, &str)]) -> Config {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder
                .set_override(*key, *value)
                .expect("override should be accepted");
        }
        builder.build().expect("settings should build")
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::from_settings(&settings(&[("auth_secret_key", SECRET)]))
            .expect("config should load");

        assert!(config.invite_only);
        assert!(!config.invite_required_for_login);
        assert!(config.invite_codes.is_empty());
        assert_eq!(config.email_verify_ttl_hours, 24);
        assert_eq!(config.email_verify_ttl(), Duration::hours(24));
    }

    #[test]
    fn test_parses_flags_and_codes() {
        let config = AuthConfig::from_settings(&settings(&[
            ("auth_secret_key", SECRET),
            ("invite_only", "false"),
            ("invite_required_for_login", "true"),
            ("invite_codes", " ALPHA, BETA,,ALPHA "),
            ("invite_code", "GAMMA"),
            ("email_verify_ttl_hours", "6"),
        ]))
        .expect("config should load");

        assert!(!config.invite_only);
        assert!(config.invite_required_for_login);
        assert_eq!(config.invite_codes, vec!["ALPHA", "BETA", "GAMMA"]);
        assert_eq!(config.email_verify_ttl_hours, 6);
    }

    #[test]
    fn test_legacy_code_not_duplicated() {
        let config = AuthConfig::from_settings(&settings(&[
            ("auth_secret_key", SECRET),
            ("invite_codes", "ALPHA"),
            ("invite_code", "ALPHA"),
        ]))
        .expect("config should load");

        assert_eq!(config.invite_codes, vec!["ALPHA"]);
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = AuthConfig::from_settings(&settings(&[]));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let result = AuthConfig::from_settings(&settings(&[("auth_secret_key", "short")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_non_positive_ttl_is_rejected() {
        let result = AuthConfig::from_settings(&settings(&[
            ("auth_secret_key", SECRET),
            ("email_verify_ttl_hours", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = AuthConfig::new(SECRET);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(SECRET));
    }
}
