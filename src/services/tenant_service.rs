use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::error::ApiError;
use crate::tenancy::directory::TenantDirectory;
use crate::tenancy::schema::SchemaLifecycleManager;
use crate::tenancy::tenant::{validate_tenant_name, Tenant};
use crate::tenancy::{DirectoryError, ProvisioningError, TenantLookup};

#[derive(Debug, Error)]
pub enum TenantServiceError {
    #[error("Invalid tenant name: {0}")]
    InvalidName(String),

    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),

    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

impl From<TenantServiceError> for ApiError {
    fn from(err: TenantServiceError) -> Self {
        match err {
            TenantServiceError::InvalidName(msg) => ApiError::bad_request(msg),
            TenantServiceError::AlreadyExists(name) => {
                ApiError::conflict(format!("Tenant '{}' already exists", name))
            }
            TenantServiceError::NotFound(name) => {
                ApiError::not_found(format!("Tenant '{}' not found", name))
            }
            TenantServiceError::Directory(e) => e.into(),
            TenantServiceError::Provisioning(e) => e.into(),
        }
    }
}

/// Administrative tenant lifecycle: registration, eager provisioning, and
/// deactivation. Request-path provisioning stays in the gate; this is the
/// operator-driven path.
pub struct TenantService {
    directory: Arc<TenantDirectory>,
    lifecycle: Arc<SchemaLifecycleManager>,
}

impl TenantService {
    pub fn new() -> Self {
        Self {
            directory: TenantDirectory::shared(),
            lifecycle: SchemaLifecycleManager::shared(),
        }
    }

    /// Register a tenant and provision its namespace up front, so the first
    /// real request doesn't pay the migration cost.
    pub async fn create_tenant(
        &self,
        name: &str,
        domain: Option<&str>,
    ) -> Result<Tenant, TenantServiceError> {
        validate_tenant_name(name).map_err(TenantServiceError::InvalidName)?;

        if self.directory.get_by_name(name).await?.is_some() {
            return Err(TenantServiceError::AlreadyExists(name.to_string()));
        }

        let tenant = self.directory.register(name, domain).await?;
        self.lifecycle.ensure_ready(&tenant).await?;

        info!(
            "Created tenant '{}' (namespace {})",
            tenant.name, tenant.namespace
        );
        Ok(tenant)
    }

    pub async fn get_tenant(&self, name: &str) -> Result<Tenant, TenantServiceError> {
        self.directory
            .get_by_name(name)
            .await?
            .ok_or_else(|| TenantServiceError::NotFound(name.to_string()))
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, TenantServiceError> {
        Ok(self.directory.list().await?)
    }

    /// Deactivate a tenant. The namespace and its data survive for audit and
    /// recovery; only routing stops.
    pub async fn deactivate_tenant(&self, name: &str) -> Result<Tenant, TenantServiceError> {
        let tenant = self.get_tenant(name).await?;
        let updated = self
            .directory
            .set_active(tenant.id, false)
            .await?
            .ok_or_else(|| TenantServiceError::NotFound(name.to_string()))?;

        info!("Deactivated tenant '{}'", updated.name);
        Ok(updated)
    }

    /// Reactivate a previously deactivated tenant.
    pub async fn restore_tenant(&self, name: &str) -> Result<Tenant, TenantServiceError> {
        let tenant = self.get_tenant(name).await?;
        let updated = self
            .directory
            .set_active(tenant.id, true)
            .await?
            .ok_or_else(|| TenantServiceError::NotFound(name.to_string()))?;

        info!("Restored tenant '{}'", updated.name);
        Ok(updated)
    }
}

impl Default for TenantService {
    fn default() -> Self {
        Self::new()
    }
}
