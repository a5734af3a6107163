// /api/root/tenant - administrative tenant lifecycle
//
// Registration and deactivation happen here, not on the request path. These
// routes skip the tenant gate: they operate on the global directory and need
// no namespace binding. Root access is required throughout.

use axum::extract::{Extension, Path};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::services::TenantService;
use crate::tenancy::Tenant;

fn require_root(auth: &AuthUser) -> Result<(), ApiError> {
    if auth.access != "root" {
        return Err(ApiError::forbidden("Root access required"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub domain: Option<String>,
}

/// POST /api/root/tenant - register a tenant and provision its namespace
#[axum::debug_handler]
pub async fn tenant_create(
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateTenantRequest>,
) -> ApiResult<Tenant> {
    require_root(&auth)?;

    let tenant = TenantService::new()
        .create_tenant(&payload.name, payload.domain.as_deref())
        .await?;

    Ok(ApiResponse::created(tenant))
}

/// GET /api/root/tenant - list all tenants
pub async fn tenant_list(Extension(auth): Extension<AuthUser>) -> ApiResult<Vec<Tenant>> {
    require_root(&auth)?;

    let tenants = TenantService::new().list_tenants().await?;
    Ok(ApiResponse::success(tenants))
}

/// GET /api/root/tenant/:name - show one tenant
pub async fn tenant_show(
    Extension(auth): Extension<AuthUser>,
    Path(name): Path<String>,
) -> ApiResult<Tenant> {
    require_root(&auth)?;

    let tenant = TenantService::new().get_tenant(&name).await?;
    Ok(ApiResponse::success(tenant))
}

/// DELETE /api/root/tenant/:name - deactivate (never physically deletes)
pub async fn tenant_delete(
    Extension(auth): Extension<AuthUser>,
    Path(name): Path<String>,
) -> ApiResult<Tenant> {
    require_root(&auth)?;

    let tenant = TenantService::new().deactivate_tenant(&name).await?;
    Ok(ApiResponse::success(tenant))
}

/// POST /api/root/tenant/:name/restore - reactivate
pub async fn tenant_restore(
    Extension(auth): Extension<AuthUser>,
    Path(name): Path<String>,
) -> ApiResult<Tenant> {
    require_root(&auth)?;

    let tenant = TenantService::new().restore_tenant(&name).await?;
    Ok(ApiResponse::success(tenant))
}
