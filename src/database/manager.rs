use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// SQLSTATE raised by PostgreSQL for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// Errors from the database layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate value violates {0}")]
    Conflict(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                let constraint = db_err.constraint().unwrap_or("unique constraint").to_string();
                DatabaseError::Conflict(constraint)
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::Unavailable(err.to_string())
            }
            other => DatabaseError::Sqlx(other),
        }
    }
}

/// Owns the PostgreSQL connection pool.
///
/// The pool connects lazily so the server can start (and report a degraded
/// `/health`) while the database is still unreachable.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let connection_string = Self::validate_url(&config.url)?;

        let mut options: PgConnectOptions = connection_string.parse()?;
        if !config.enable_query_logging {
            options = options.disable_statement_logging();
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect_lazy_with(options);

        info!("Database pool configured (max {} connections)", config.max_connections);
        Ok(Self { pool })
    }

    /// Manager for the globally configured database
    pub fn from_config() -> Result<Self, DatabaseError> {
        Self::new(&crate::config::config().database)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn validate_url(raw: &str) -> Result<String, DatabaseError> {
        if raw.trim().is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }

        let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        match url.scheme() {
            "postgres" | "postgresql" => Ok(url.into()),
            _ => Err(DatabaseError::InvalidDatabaseUrl),
        }
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}
