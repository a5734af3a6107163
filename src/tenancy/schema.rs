//! Namespace lifecycle: create a tenant's schema on first use and bring it to
//! the current model version.
//!
//! `ensure_ready` is idempotent as a unit. Creation plus migrations run in one
//! transaction under a per-namespace advisory lock, so concurrent first
//! requests for the same tenant provision exactly once and a failed run rolls
//! back to a cleanly retryable state. A per-process mutex keyed by namespace
//! is the fast path; the advisory lock is the cross-process backstop.

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use once_cell::sync::Lazy;

use crate::config;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::tenancy::session::BoundNamespace;
use crate::tenancy::tenant::{is_valid_namespace, Tenant};

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Invalid namespace name: {0}")]
    InvalidNamespace(String),

    #[error("Provisioning of namespace {0} timed out")]
    Timeout(String),

    #[error("Migration '{step}' failed for namespace {namespace}: {source}")]
    MigrationFailed {
        namespace: String,
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database manager error: {0}")]
    Manager(#[from] DatabaseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct Migration {
    pub name: &'static str,
    pub ddl: &'static str,
}

/// Structural migrations applied to every tenant namespace, in dependency
/// order: entities without foreign keys first. Statements are unqualified and
/// run with search_path pinned to the target namespace, so the same plan
/// produces structurally identical namespaces for every tenant.
pub const MIGRATION_PLAN: &[Migration] = &[
    Migration {
        name: "0001_roles",
        ddl: r#"CREATE TABLE IF NOT EXISTS roles (
            id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name        VARCHAR(64) UNIQUE NOT NULL,
            description TEXT,
            permissions JSONB NOT NULL DEFAULT '[]'::jsonb,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#,
    },
    Migration {
        name: "0002_users",
        ddl: r#"CREATE TABLE IF NOT EXISTS users (
            id            UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name          VARCHAR(128) UNIQUE NOT NULL,
            email         VARCHAR(255) UNIQUE,
            role_id       UUID REFERENCES roles(id) ON DELETE SET NULL,
            access        VARCHAR(16) NOT NULL DEFAULT 'read',
            is_active     BOOLEAN NOT NULL DEFAULT TRUE,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX IF NOT EXISTS users_role_idx ON users(role_id)"#,
    },
    Migration {
        name: "0003_objects",
        ddl: r#"CREATE TABLE IF NOT EXISTS objects (
            id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name        VARCHAR(255) NOT NULL,
            address     TEXT,
            manager_id  UUID REFERENCES users(id) ON DELETE SET NULL,
            notes       TEXT,
            is_active   BOOLEAN NOT NULL DEFAULT TRUE,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX IF NOT EXISTS objects_manager_idx ON objects(manager_id);
        CREATE INDEX IF NOT EXISTS objects_created_idx ON objects(created_at DESC)"#,
    },
    Migration {
        name: "0004_equipment",
        ddl: r#"CREATE TABLE IF NOT EXISTS equipment (
            id            UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            object_id     UUID NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            name          VARCHAR(255) NOT NULL,
            serial_number VARCHAR(128),
            installed_at  DATE,
            last_service  DATE,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX IF NOT EXISTS equipment_object_idx ON equipment(object_id)"#,
    },
    Migration {
        name: "0005_contracts",
        ddl: r#"CREATE TABLE IF NOT EXISTS contracts (
            id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            object_id   UUID NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            number      VARCHAR(64) NOT NULL,
            starts_on   DATE NOT NULL,
            ends_on     DATE,
            is_active   BOOLEAN NOT NULL DEFAULT TRUE,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (object_id, number)
        );
        CREATE INDEX IF NOT EXISTS contracts_object_idx ON contracts(object_id)"#,
    },
    Migration {
        name: "0006_invoices",
        ddl: r#"CREATE TABLE IF NOT EXISTS invoices (
            id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            contract_id  UUID NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
            number       VARCHAR(64) UNIQUE NOT NULL,
            amount_cents BIGINT NOT NULL,
            issued_on    DATE NOT NULL,
            due_on       DATE,
            paid_on      DATE,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX IF NOT EXISTS invoices_contract_idx ON invoices(contract_id);
        CREATE INDEX IF NOT EXISTS invoices_issued_idx ON invoices(issued_on DESC)"#,
    },
];

/// Ensures tenant namespaces exist and are migrated before anything binds to
/// them.
pub struct SchemaLifecycleManager {
    /// Namespaces this process has confirmed ready.
    ready: RwLock<HashSet<String>>,
    /// One async mutex per namespace; keeps local stampedes off the database.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SchemaLifecycleManager {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(HashSet::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared() -> Arc<SchemaLifecycleManager> {
        static INSTANCE: Lazy<Arc<SchemaLifecycleManager>> =
            Lazy::new(|| Arc::new(SchemaLifecycleManager::new()));
        INSTANCE.clone()
    }

    /// Make the tenant's namespace ready, creating and migrating it on first
    /// use. Safe to call concurrently for the same tenant from any number of
    /// requests and processes.
    pub async fn ensure_ready(
        &self,
        tenant: &Tenant,
    ) -> Result<BoundNamespace, ProvisioningError> {
        let namespace = tenant.namespace.clone();
        if !is_valid_namespace(&namespace) {
            return Err(ProvisioningError::InvalidNamespace(namespace));
        }

        if self.ready.read().await.contains(&namespace) {
            return Ok(BoundNamespace::new(namespace));
        }

        let lock = self.namespace_lock(&namespace).await;
        let _guard = lock.lock().await;

        // Another local request may have finished while we waited
        if self.ready.read().await.contains(&namespace) {
            return Ok(BoundNamespace::new(namespace));
        }

        let pool = DatabaseManager::shared_pool().await?;

        if Self::is_provisioned(&pool, &namespace).await? {
            self.mark_ready(&namespace).await;
            return Ok(BoundNamespace::new(namespace));
        }

        let timeout = Duration::from_secs(config::config().tenancy.provision_timeout_secs);
        match tokio::time::timeout(timeout, Self::provision(&pool, &namespace)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Provisioning failed for namespace {}: {}", namespace, e);
                return Err(e);
            }
            // Dropping the in-flight transaction rolls it back and releases
            // the advisory lock; the next request retries from scratch.
            Err(_) => {
                error!("Provisioning timed out for namespace {}", namespace);
                return Err(ProvisioningError::Timeout(namespace));
            }
        }

        self.mark_ready(&namespace).await;
        Ok(BoundNamespace::new(namespace))
    }

    async fn namespace_lock(&self, namespace: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn mark_ready(&self, namespace: &str) {
        self.ready.write().await.insert(namespace.to_string());
    }

    /// Cheap readiness probe: the schema exists and every migration in the
    /// plan is recorded. A namespace with missing rows is treated as not
    /// provisioned and goes through the locked path.
    async fn is_provisioned(pool: &PgPool, namespace: &str) -> Result<bool, ProvisioningError> {
        let (has_table,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.tables
                 WHERE table_schema = $1 AND table_name = 'schema_migrations'
             )",
        )
        .bind(namespace)
        .fetch_one(pool)
        .await?;

        if !has_table {
            return Ok(false);
        }

        let sql = format!(
            "SELECT COUNT(*) FROM {}.schema_migrations",
            DatabaseManager::quote_identifier(namespace)
        );
        let (applied,): (i64,) = sqlx::query_as(&sql).fetch_one(pool).await?;

        Ok(applied >= MIGRATION_PLAN.len() as i64)
    }

    /// Create-if-absent plus ordered migrations, atomically. The advisory
    /// lock serializes provisioners across processes; the IF NOT EXISTS
    /// statements are the second line of defense if the lock is ever bypassed.
    async fn provision(pool: &PgPool, namespace: &str) -> Result<(), ProvisioningError> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(namespace))
            .execute(&mut *tx)
            .await?;

        let quoted = DatabaseManager::quote_identifier(namespace);
        sqlx::raw_sql(&format!("CREATE SCHEMA IF NOT EXISTS {quoted}"))
            .execute(&mut *tx)
            .await?;

        // LOCAL scope: reverts at commit, so the pooled connection is clean
        sqlx::raw_sql(&format!("SET LOCAL search_path TO {quoted}"))
            .execute(&mut *tx)
            .await?;

        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                 name       TEXT PRIMARY KEY,
                 applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             )",
        )
        .execute(&mut *tx)
        .await?;

        let applied: HashSet<String> = sqlx::query_scalar("SELECT name FROM schema_migrations")
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();

        let mut fresh = 0usize;
        for migration in MIGRATION_PLAN {
            if applied.contains(migration.name) {
                continue;
            }

            sqlx::raw_sql(migration.ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| ProvisioningError::MigrationFailed {
                    namespace: namespace.to_string(),
                    step: migration.name,
                    source: e,
                })?;

            sqlx::query("INSERT INTO schema_migrations (name) VALUES ($1)")
                .bind(migration.name)
                .execute(&mut *tx)
                .await
                .map_err(|e| ProvisioningError::MigrationFailed {
                    namespace: namespace.to_string(),
                    step: migration.name,
                    source: e,
                })?;

            fresh += 1;
        }

        tx.commit().await?;

        if fresh > 0 {
            info!("Provisioned namespace {} ({} migrations applied)", namespace, fresh);
        }
        Ok(())
    }
}

impl Default for SchemaLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable 64-bit advisory lock key for a namespace name.
fn advisory_key(namespace: &str) -> i64 {
    let digest = Sha256::digest(namespace.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_is_in_dependency_order() {
        let names: Vec<&str> = MIGRATION_PLAN.iter().map(|m| m.name).collect();
        assert_eq!(
            names,
            vec![
                "0001_roles",
                "0002_users",
                "0003_objects",
                "0004_equipment",
                "0005_contracts",
                "0006_invoices"
            ]
        );
    }

    #[test]
    fn plan_names_are_unique() {
        let mut seen = HashSet::new();
        for m in MIGRATION_PLAN {
            assert!(seen.insert(m.name), "duplicate migration name {}", m.name);
        }
    }

    #[test]
    fn plan_ddl_is_unqualified_and_idempotent() {
        for m in MIGRATION_PLAN {
            assert!(
                m.ddl.contains("IF NOT EXISTS"),
                "{} is not idempotent",
                m.name
            );
            assert!(
                !m.ddl.contains("public."),
                "{} must not pin a schema",
                m.name
            );
        }
    }

    #[test]
    fn advisory_keys_are_stable_and_distinct() {
        assert_eq!(advisory_key("tenant_acme"), advisory_key("tenant_acme"));
        assert_ne!(advisory_key("tenant_acme"), advisory_key("tenant_beta"));
    }

    #[tokio::test]
    async fn rejects_invalid_namespace_before_touching_the_store() {
        use crate::tenancy::tenant::Tenant;
        use chrono::Utc;
        use uuid::Uuid;

        let manager = SchemaLifecycleManager::new();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "bad".to_string(),
            namespace: "not_a_tenant_schema".to_string(),
            domain: None,
            is_active: true,
            max_users: None,
            max_objects: None,
            max_storage_mb: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let err = manager.ensure_ready(&tenant).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::InvalidNamespace(_)));
    }
}
