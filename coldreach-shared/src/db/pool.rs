/// Database connection pool management
///
/// This module opens the single SQLite file that backs the identity and invite
/// store. Every connection is configured with WAL journaling, enforced foreign
/// keys and a busy timeout so concurrent writers wait for the lock instead of
/// failing immediately.
///
/// # Example
///
/// ```no_run
/// use coldreach_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::for_path("data/coldreach.db");
///     let pool = create_pool(config).await?;
///
///     let row: (i64,) = sqlx::query_as("SELECT ?")
///         .bind(42i64)
///         .fetch_one(&pool)
///         .await?;
///     assert_eq!(row.0, 42);
///
///     Ok(())
/// }
/// ```

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default location of the database file, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "data/coldreach.db";

/// Configuration for the database connection pool
///
/// All timeouts are specified in seconds for ease of configuration from environment variables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite URL (`sqlite://data/coldreach.db`) or a plain file path
    pub url: String,

    /// Maximum number of connections in the pool
    ///
    /// Default: 5. SQLite serializes writers, so a large pool only helps readers.
    pub max_connections: u32,

    /// Minimum number of idle connections to maintain
    ///
    /// Default: 1
    pub min_connections: u32,

    /// Timeout for acquiring a connection from the pool (seconds)
    ///
    /// Default: 30 seconds
    pub connect_timeout_seconds: u64,

    /// How long a connection waits on a locked database before giving up (seconds)
    ///
    /// Default: 5 seconds
    pub busy_timeout_seconds: u64,

    /// How long a connection can remain idle before being closed (seconds)
    ///
    /// Default: Some(600) (10 minutes)
    pub idle_timeout_seconds: Option<u64>,

    /// Create the database file (and its parent directory) when missing
    ///
    /// Default: true
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DB_PATH.to_string(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_seconds: 30,
            busy_timeout_seconds: 5,
            idle_timeout_seconds: Some(600),
            create_if_missing: true,
        }
    }
}

impl DatabaseConfig {
    /// Configuration pointing at a database file, other settings defaulted
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            url: path.as_ref().to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    /// Builds per-connection options from the configured URL or path
    ///
    /// # Errors
    ///
    /// Returns an error if `url` starts with `sqlite:` but cannot be parsed.
    pub fn connect_options(&self) -> Result<SqliteConnectOptions, sqlx::Error> {
        let options = if self.url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(&self.url)?
        } else {
            SqliteConnectOptions::new().filename(&self.url)
        };

        Ok(options
            .create_if_missing(self.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(self.busy_timeout_seconds)))
    }

    /// The on-disk file this configuration refers to, when it names one
    fn file_path(&self) -> Option<&Path> {
        let raw = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))
            .unwrap_or(&self.url);
        let raw = raw.split('?').next().unwrap_or(raw);

        if raw.is_empty() || raw == ":memory:" {
            None
        } else {
            Some(Path::new(raw))
        }
    }
}

/// Creates and initializes the SQLite connection pool
///
/// This function:
/// 1. Creates the parent directory of the database file when allowed
/// 2. Opens a pool with the configured connection options
/// 3. Performs a health check to verify the file is usable
///
/// # Errors
///
/// Returns an error if:
/// - The URL is invalid
/// - The file cannot be created or opened
/// - Health check fails
///
/// # Example
///
/// ```no_run
/// use coldreach_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), sqlx::Error> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        busy_timeout_seconds = config.busy_timeout_seconds,
        "Creating database connection pool"
    );

    if config.create_if_missing {
        if let Some(parent) = config.file_path().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                debug!(directory = %parent.display(), "Created database directory");
            }
        }
    }

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds));

    if let Some(idle_timeout) = config.idle_timeout_seconds {
        pool_options = pool_options.idle_timeout(Duration::from_secs(idle_timeout));
        debug!(idle_timeout_seconds = idle_timeout, "Set idle timeout");
    }

    let pool = pool_options.connect_with(config.connect_options()?).await?;

    health_check(&pool).await?;

    info!("Database connection pool created successfully");
    Ok(pool)
}

/// Performs a health check on the database connection
///
/// # Errors
///
/// Returns an error if the health check query fails
pub async fn health_check(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("Performing database health check");

    let result: (i64,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;

    if result.0 == 1 {
        debug!("Database health check passed");
        Ok(())
    } else {
        warn!("Database health check returned unexpected value: {}", result.0);
        Err(sqlx::Error::Protocol(
            "Health check returned unexpected value".into(),
        ))
    }
}

/// Gracefully closes the connection pool
pub async fn close_pool(pool: SqlitePool) {
    info!("Closing database connection pool");
    pool.close().await;
    info!("Database connection pool closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, DEFAULT_DB_PATH);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.busy_timeout_seconds, 5);
        assert!(config.create_if_missing);
    }

    #[test]
    fn test_file_path_strips_scheme_and_query() {
        let config = DatabaseConfig {
            url: "sqlite://data/app.db?mode=rwc".to_string(),
            ..Default::default()
        };
        assert_eq!(config.file_path(), Some(Path::new("data/app.db")));

        let plain = DatabaseConfig::for_path("/tmp/app.db");
        assert_eq!(plain.file_path(), Some(Path::new("/tmp/app.db")));
    }

    #[test]
    fn test_file_path_memory_has_no_file() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        assert_eq!(config.file_path(), None);
    }
}
