//! Request-scoped, namespace-bound data access.
//!
//! The binding is per handle, never per process: each connection checkout
//! re-pins `search_path` to the handle's namespace before it is handed out,
//! and the pool resets `search_path` when the connection is returned (see
//! `DatabaseManager`). Two live handles for different tenants therefore never
//! see each other's namespace, and a recycled connection never carries a
//! previous tenant's binding.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::database::manager::DatabaseManager;

/// A namespace confirmed ready by the lifecycle manager. The only way to get
/// a `ScopedHandle` is through one of these, so nothing downstream can bind
/// to an unprovisioned or unchecked namespace.
#[derive(Debug, Clone)]
pub struct BoundNamespace {
    name: String,
}

impl BoundNamespace {
    pub(crate) fn new(name: String) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The one channel downstream code has to tenant data.
///
/// Cheap to create and clone (pool reference plus namespace name); owned by
/// the request that bound it and dropped when the request completes. Dropping
/// it, or any connection acquired through it, releases resources on every
/// exit path including panics.
#[derive(Clone)]
pub struct ScopedHandle {
    pool: PgPool,
    namespace: Arc<str>,
}

impl ScopedHandle {
    pub fn bind(pool: PgPool, namespace: &BoundNamespace) -> Self {
        Self {
            pool,
            namespace: Arc::from(namespace.name()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Check a connection out of the shared pool, bound to this handle's
    /// namespace.
    pub async fn acquire(&self) -> Result<ScopedConn, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(&bind_statement(&self.namespace))
            .execute(&mut *conn)
            .await?;
        Ok(ScopedConn { conn })
    }
}

/// Statement that pins a connection to one namespace. The namespace is the
/// only schema on the path; global tables must be referenced explicitly as
/// `public.*`, never picked up by accident.
fn bind_statement(namespace: &str) -> String {
    format!(
        "SET search_path TO {}",
        DatabaseManager::quote_identifier(namespace)
    )
}

/// A pooled connection pinned to one tenant namespace. Returns to the pool on
/// drop, where the release hook strips the binding.
pub struct ScopedConn {
    conn: PoolConnection<Postgres>,
}

impl Deref for ScopedConn {
    type Target = sqlx::PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for ScopedConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}
