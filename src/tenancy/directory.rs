use async_trait::async_trait;
use once_cell::sync::Lazy;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::tenancy::tenant::{namespace_for, Tenant};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Database manager error: {0}")]
    Manager(#[from] DatabaseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-side lookups used by the resolver strategies.
#[async_trait]
pub trait TenantLookup: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DirectoryError>;
    async fn get_by_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError>;
    async fn get_by_namespace(&self, namespace: &str) -> Result<Option<Tenant>, DirectoryError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<Tenant>, DirectoryError>;
}

/// Lookups plus the registration needed by the bootstrap fallback.
#[async_trait]
pub trait TenantBootstrap: TenantLookup {
    async fn register_tenant(
        &self,
        name: &str,
        domain: Option<&str>,
    ) -> Result<Tenant, DirectoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Id(Uuid),
    Domain(String),
    Namespace(String),
    Name(String),
}

struct CacheEntry {
    tenant: Tenant,
    expires_at: Instant,
}

/// Bounded-TTL cache over the tenant directory. One tenant appears under
/// every key it is reachable by, so invalidation must drop all of them -
/// a stale active flag here would defeat the gate's 403 check.
struct DirectoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl DirectoryCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    async fn get(&self, key: &CacheKey) -> Option<Tenant> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.tenant.clone()),
            _ => None,
        }
    }

    async fn insert(&self, tenant: &Tenant) {
        let expires_at = Instant::now() + self.ttl;
        let mut entries = self.entries.write().await;
        for key in Self::keys_for(tenant) {
            entries.insert(
                key,
                CacheEntry {
                    tenant: tenant.clone(),
                    expires_at,
                },
            );
        }
    }

    async fn remove(&self, tenant: &Tenant) {
        let mut entries = self.entries.write().await;
        for key in Self::keys_for(tenant) {
            entries.remove(&key);
        }
    }

    fn keys_for(tenant: &Tenant) -> Vec<CacheKey> {
        let mut keys = vec![
            CacheKey::Id(tenant.id),
            CacheKey::Namespace(tenant.namespace.clone()),
            CacheKey::Name(tenant.name.clone()),
        ];
        if let Some(domain) = &tenant.domain {
            keys.push(CacheKey::Domain(domain.clone()));
        }
        keys
    }
}

const TENANT_COLUMNS: &str = "id, name, namespace, domain, is_active, \
     max_users, max_objects, max_storage_mb, created_at, updated_at";

/// The directory table lives in the global area; it is the one piece of
/// schema that exists before any tenant does.
const DIRECTORY_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS public.tenants (
        id             UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name           VARCHAR(100) UNIQUE NOT NULL,
        namespace      VARCHAR(63) UNIQUE NOT NULL,
        domain         VARCHAR(255) UNIQUE,
        is_active      BOOLEAN NOT NULL DEFAULT TRUE,
        max_users      INT,
        max_objects    INT,
        max_storage_mb BIGINT,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE INDEX IF NOT EXISTS tenants_domain_idx ON public.tenants(domain)
"#;

static DIRECTORY_READY: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

/// Authoritative store + cache for tenant records.
///
/// Queries always run against the global area (public schema), never a tenant
/// namespace. Lookups do not filter on `is_active`: the gate distinguishes an
/// unknown tenant (401) from a deactivated one (403), so inactive records must
/// still resolve.
pub struct TenantDirectory {
    cache: DirectoryCache,
}

impl TenantDirectory {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache: DirectoryCache::new(cache_ttl),
        }
    }

    /// Process-wide directory instance, TTL taken from configuration. Always
    /// the same instance: the resolver and the admin surface must share one
    /// cache for invalidation to mean anything.
    pub fn shared() -> Arc<TenantDirectory> {
        static INSTANCE: Lazy<Arc<TenantDirectory>> = Lazy::new(|| {
            Arc::new(TenantDirectory::new(Duration::from_secs(
                config::config().tenancy.cache_ttl_secs,
            )))
        });
        INSTANCE.clone()
    }

    async fn pool(&self) -> Result<PgPool, DirectoryError> {
        let pool = DatabaseManager::shared_pool().await?;

        // Idempotent, once per process; a failed attempt is retried by the
        // next caller rather than poisoning the cell
        DIRECTORY_READY
            .get_or_try_init(|| async {
                sqlx::raw_sql(DIRECTORY_DDL).execute(&pool).await?;
                Ok::<_, sqlx::Error>(())
            })
            .await?;

        Ok(pool)
    }

    async fn lookup(
        &self,
        key: CacheKey,
        column: &str,
    ) -> Result<Option<Tenant>, DirectoryError> {
        if let Some(tenant) = self.cache.get(&key).await {
            return Ok(Some(tenant));
        }

        let sql = format!(
            "SELECT {TENANT_COLUMNS} FROM public.tenants WHERE {column} = $1"
        );
        let query = sqlx::query_as::<_, Tenant>(&sql);
        let query = match &key {
            CacheKey::Id(id) => query.bind(*id),
            CacheKey::Domain(v) | CacheKey::Namespace(v) | CacheKey::Name(v) => {
                query.bind(v.clone())
            }
        };

        let tenant = query.fetch_optional(&self.pool().await?).await?;
        if let Some(tenant) = &tenant {
            self.cache.insert(tenant).await;
        }
        Ok(tenant)
    }

    /// Drop every cache entry for this tenant (by id, domain, namespace, name).
    pub async fn invalidate(&self, tenant: &Tenant) {
        debug!("Invalidating directory cache for tenant {}", tenant.name);
        self.cache.remove(tenant).await;
    }

    /// Register a tenant, deriving its namespace from the name. Idempotent
    /// under concurrent registration of the same name: the loser of the race
    /// reads back the winner's row.
    pub async fn register(
        &self,
        name: &str,
        domain: Option<&str>,
    ) -> Result<Tenant, DirectoryError> {
        let namespace = namespace_for(name);
        let pool = self.pool().await?;

        let sql = format!(
            "INSERT INTO public.tenants (name, namespace, domain) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO NOTHING \
             RETURNING {TENANT_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Tenant>(&sql)
            .bind(name)
            .bind(&namespace)
            .bind(domain)
            .fetch_optional(&pool)
            .await?;

        let tenant = match inserted {
            Some(tenant) => tenant,
            // Lost the insert race: the row exists, read it back
            None => {
                let sql = format!(
                    "SELECT {TENANT_COLUMNS} FROM public.tenants WHERE name = $1"
                );
                sqlx::query_as::<_, Tenant>(&sql)
                    .bind(name)
                    .fetch_one(&pool)
                    .await?
            }
        };

        self.cache.insert(&tenant).await;
        Ok(tenant)
    }

    /// Flip the active flag. Deactivation is the only supported teardown;
    /// the namespace and its data stay behind for audit and recovery.
    pub async fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Tenant>, DirectoryError> {
        let pool = self.pool().await?;
        let sql = format!(
            "UPDATE public.tenants SET is_active = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {TENANT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Tenant>(&sql)
            .bind(id)
            .bind(is_active)
            .fetch_optional(&pool)
            .await?;

        if let Some(tenant) = &updated {
            // The stale entry must go before anyone re-reads the active flag
            self.invalidate(tenant).await;
        }
        Ok(updated)
    }

    pub async fn list(&self) -> Result<Vec<Tenant>, DirectoryError> {
        let pool = self.pool().await?;
        let sql = format!(
            "SELECT {TENANT_COLUMNS} FROM public.tenants ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Tenant>(&sql).fetch_all(&pool).await?)
    }
}

#[async_trait]
impl TenantBootstrap for TenantDirectory {
    async fn register_tenant(
        &self,
        name: &str,
        domain: Option<&str>,
    ) -> Result<Tenant, DirectoryError> {
        self.register(name, domain).await
    }
}

#[async_trait]
impl TenantLookup for TenantDirectory {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DirectoryError> {
        self.lookup(CacheKey::Id(id), "id").await
    }

    async fn get_by_domain(&self, domain: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.lookup(CacheKey::Domain(domain.to_string()), "domain").await
    }

    async fn get_by_namespace(&self, namespace: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.lookup(CacheKey::Namespace(namespace.to_string()), "namespace").await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.lookup(CacheKey::Name(name.to_string()), "name").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tenant(name: &str, domain: Option<&str>) -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            namespace: namespace_for(name),
            domain: domain.map(str::to_string),
            is_active: true,
            max_users: None,
            max_objects: None,
            max_storage_mb: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cache_hits_by_every_key() {
        let cache = DirectoryCache::new(Duration::from_secs(60));
        let t = tenant("acme", Some("acme.example.com"));
        cache.insert(&t).await;

        // Every key yields the identical record for the TTL's duration
        for _ in 0..3 {
            assert_eq!(cache.get(&CacheKey::Id(t.id)).await.unwrap().id, t.id);
            assert_eq!(cache.get(&CacheKey::Name("acme".into())).await.unwrap().id, t.id);
        }
        assert!(cache.get(&CacheKey::Namespace(t.namespace.clone())).await.is_some());
        assert!(cache
            .get(&CacheKey::Domain("acme.example.com".into()))
            .await
            .is_some());
        assert!(cache.get(&CacheKey::Name("other".into())).await.is_none());
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let cache = DirectoryCache::new(Duration::ZERO);
        let t = tenant("acme", None);
        cache.insert(&t).await;

        assert!(cache.get(&CacheKey::Id(t.id)).await.is_none());
    }

    #[tokio::test]
    async fn remove_drops_all_keys() {
        let cache = DirectoryCache::new(Duration::from_secs(60));
        let t = tenant("acme", Some("acme.example.com"));
        cache.insert(&t).await;
        cache.remove(&t).await;

        assert!(cache.get(&CacheKey::Id(t.id)).await.is_none());
        assert!(cache.get(&CacheKey::Name("acme".into())).await.is_none());
        assert!(cache.get(&CacheKey::Namespace(t.namespace.clone())).await.is_none());
        assert!(cache
            .get(&CacheKey::Domain("acme.example.com".into()))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn domainless_tenants_cache_without_domain_key() {
        let cache = DirectoryCache::new(Duration::from_secs(60));
        let t = tenant("acme", None);
        cache.insert(&t).await;

        assert!(cache.get(&CacheKey::Id(t.id)).await.is_some());
        assert_eq!(DirectoryCache::keys_for(&t).len(), 3);
    }
}
