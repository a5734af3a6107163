use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pool manager for the shared Postgres instance.
///
/// All tenants live in one database: the global area (public schema) holds the
/// tenant directory, and each tenant owns a dedicated schema. Isolation is done
/// per checked-out connection by the session layer, so the pool resets
/// `search_path` whenever a connection is returned.
pub struct DatabaseManager;

static POOL: OnceCell<PgPool> = OnceCell::const_new();

impl DatabaseManager {
    /// Get the shared pool, connecting lazily on first use.
    pub async fn shared_pool() -> Result<PgPool, DatabaseError> {
        let pool = POOL
            .get_or_try_init(|| async {
                let options = Self::build_connect_options()?;
                let db = config::config();

                let pool = PgPoolOptions::new()
                    .max_connections(db.database.max_connections)
                    .acquire_timeout(Duration::from_secs(db.database.acquire_timeout_secs))
                    .after_release(|conn, _meta| {
                        // A released connection may still carry a tenant
                        // search_path; never hand that to the next request.
                        Box::pin(async move {
                            sqlx::query("SET search_path TO public")
                                .execute(&mut *conn)
                                .await?;
                            Ok(true)
                        })
                    })
                    .connect_with(options)
                    .await?;

                info!("Connected shared database pool");
                Ok::<_, DatabaseError>(pool)
            })
            .await?;

        Ok(pool.clone())
    }

    fn build_connect_options() -> Result<PgConnectOptions, DatabaseError> {
        let base = std::env::var("DATABASE_URL")
            .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;

        // Parse via the url crate first so malformed values fail uniformly
        let url = url::Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;

        let statement_timeout = config::config().database.statement_timeout_ms;
        let options = PgConnectOptions::from_str(url.as_str())
            .map_err(|_| DatabaseError::InvalidDatabaseUrl)?
            .options([("statement_timeout", statement_timeout.to_string())])
            // Prepared statements pin the tables they were parsed against, not
            // the search_path in effect at execution. Connections here are
            // rebound to a different tenant namespace on every checkout, so a
            // statement cache would leak one tenant's tables into another's
            // queries.
            .statement_cache_capacity(0);

        Ok(options)
    }

    /// Pings the shared pool to ensure connectivity
    pub async fn health_check() -> Result<(), DatabaseError> {
        let pool = Self::shared_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Quote SQL identifier to prevent injection
    pub(crate) fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Close the pool (e.g., on shutdown)
    pub async fn close() {
        if let Some(pool) = POOL.get() {
            pool.close().await;
            info!("Closed shared database pool");
        }
    }
}
