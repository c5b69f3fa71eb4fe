/// Database layer for Coldreach
///
/// # Modules
///
/// - `pool`: SQLite connection pool with WAL, foreign keys and busy timeout
/// - `migrations`: embedded migration runner
/// - Models are in the `models` module at crate root level
///
/// # Example
///
/// ```no_run
/// use coldreach_shared::db::pool::{create_pool, DatabaseConfig};
/// use coldreach_shared::db::migrations::run_migrations;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::for_path("data/coldreach.db")).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
