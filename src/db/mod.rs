use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

pub mod models;

/// Errors from the database layer
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

static POOL: OnceCell<PgPool> = OnceCell::const_new();

/// Process-wide connection pool, created lazily on first use.
pub struct Db;

impl Db {
    pub async fn pool() -> Result<PgPool, DbError> {
        Ok(POOL.get_or_try_init(Self::connect).await?.clone())
    }

    async fn connect() -> Result<PgPool, DbError> {
        let raw = std::env::var("DATABASE_URL").map_err(|_| DbError::ConfigMissing("DATABASE_URL"))?;
        // Parse up front so a malformed URL fails with a clear error instead
        // of a connect timeout.
        let parsed = url::Url::parse(&raw).map_err(|_| DbError::InvalidDatabaseUrl)?;
        if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
            return Err(DbError::InvalidDatabaseUrl);
        }

        let db_config = &crate::config::config().database;
        let pool = PgPoolOptions::new()
            .max_connections(db_config.max_connections)
            .acquire_timeout(Duration::from_secs(db_config.connection_timeout_secs))
            .connect(&raw)
            .await?;

        info!("Created database pool ({} max connections)", db_config.max_connections);
        Ok(pool)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check() -> Result<(), DbError> {
        let pool = Self::pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }
}
