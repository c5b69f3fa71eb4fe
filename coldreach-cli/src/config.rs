/// Configuration for the admin CLI
///
/// Loads the process environment (and `.env`) once; the database settings are
/// read eagerly, the auth settings only by commands that need them, so
/// `db migrate` works without `AUTH_SECRET_KEY`.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: SQLite URL or file path
/// - `DB_PATH`: file path, used when `DATABASE_URL` is unset (default: data/coldreach.db)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 5)
/// - Auth variables as documented on [`AuthConfig`]
///
/// # Example
///
/// ```no_run
/// use coldreach_cli::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?.with_db_path("/tmp/coldreach.db");
/// println!("Database: {}", config.database.url);
/// # Ok(())
/// # }
/// ```

use std::path::Path;

use coldreach_shared::auth::config::AuthConfig;
use coldreach_shared::db::pool::{DatabaseConfig, DEFAULT_DB_PATH};
use config::{ConfigError, Environment};

/// Complete CLI configuration
#[derive(Clone)]
pub struct Config {
    pub database: DatabaseConfig,

    settings: config::Config,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a database setting cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(Environment::default())
            .build()?;

        Self::from_settings(settings)
    }

    pub fn from_settings(settings: config::Config) -> Result<Self, ConfigError> {
        let url = match optional(settings.get_string("database_url"))? {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => optional(settings.get_string("db_path"))?
                .map(|path| path.trim().to_string())
                .filter(|path| !path.is_empty())
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
        };

        let mut database = DatabaseConfig {
            url,
            ..Default::default()
        };

        if let Some(max) = optional(settings.get_int("database_max_connections"))? {
            if max <= 0 {
                return Err(ConfigError::Message(
                    "DATABASE_MAX_CONNECTIONS must be positive".to_string(),
                ));
            }
            database.max_connections = u32::try_from(max).map_err(|_| {
                ConfigError::Message("DATABASE_MAX_CONNECTIONS is too large".to_string())
            })?;
        }

        Ok(Self { database, settings })
    }

    /// Points the database at `path`, overriding the environment
    pub fn with_db_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database.url = path.as_ref().to_string_lossy().into_owned();
        self
    }

    /// Auth service settings from the same environment
    ///
    /// # Errors
    ///
    /// Returns an error if `AUTH_SECRET_KEY` is missing or a value is invalid.
    pub fn auth(&self) -> Result<AuthConfig, ConfigError> {
        AuthConfig::from_settings(&self.settings)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

fn optional<T>(value: Result<T, ConfigError>) -> Result<Option<T>, ConfigError> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> config::Config {
        pairs
            .iter()
            .fold(config::Config::builder(), |builder, (key, value)| {
                builder.set_override(*key, *value).unwrap()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_database_path() {
        let config = Config::from_settings(settings(&[])).unwrap();
        assert_eq!(config.database.url, DEFAULT_DB_PATH);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_database_url_wins_over_db_path() {
        let config = Config::from_settings(settings(&[
            ("database_url", "sqlite://prod.db"),
            ("db_path", "other.db"),
        ]))
        .unwrap();
        assert_eq!(config.database.url, "sqlite://prod.db");

        let config = Config::from_settings(settings(&[("db_path", "local.db")])).unwrap();
        assert_eq!(config.database.url, "local.db");
    }

    #[test]
    fn test_db_path_override() {
        let config = Config::from_settings(settings(&[("database_url", "sqlite://prod.db")]))
            .unwrap()
            .with_db_path("/tmp/override.db");
        assert_eq!(config.database.url, "/tmp/override.db");
    }

    #[test]
    fn test_max_connections() {
        let config =
            Config::from_settings(settings(&[("database_max_connections", "2")])).unwrap();
        assert_eq!(config.database.max_connections, 2);

        assert!(Config::from_settings(settings(&[("database_max_connections", "0")])).is_err());
    }

    #[test]
    fn test_auth_requires_secret() {
        let config = Config::from_settings(settings(&[])).unwrap();
        assert!(config.auth().is_err());

        let config = Config::from_settings(settings(&[(
            "auth_secret_key",
            "0123456789abcdef0123456789abcdef",
        )]))
        .unwrap();
        assert!(config.auth().unwrap().invite_only);
    }
}
