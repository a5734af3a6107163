//! Request gate: every protected request passes through here before any
//! business logic runs.
//!
//! Pipeline per request: public-route bypass, tenant resolution, active
//! check, namespace readiness, handle binding. Failures short-circuit with
//! the status for the failing stage (401 resolution, 403 inactive, 500
//! provisioning); downstream handlers either get a fully bound handle or
//! nothing at all.

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::debug;

use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::tenancy::resolver::RequestContext;
use crate::tenancy::{ScopedHandle, SchemaLifecycleManager, TenantResolver};

/// Routes exempt from tenant resolution. Handlers behind these paths must
/// not assume a bound tenant exists.
const PUBLIC_PATH_PREFIXES: &[&str] = &["/auth/"];
const PUBLIC_PATHS: &[&str] = &["/", "/health"];

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
        || PUBLIC_PATH_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Middleware that binds the request to its tenant's namespace.
#[axum::debug_middleware]
pub async fn tenant_gate_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let auth_user = request.extensions().get::<AuthUser>().cloned();
    let ctx = RequestContext::from_request(
        request.headers(),
        auth_user.as_ref().map(|u| u.claims.clone()),
        auth_user.map(|u| u.bearer),
    );

    let tenant = TenantResolver::shared().resolve(&ctx).await?;

    if !tenant.is_active {
        tracing::warn!("Rejected request for inactive tenant '{}'", tenant.name);
        return Err(ApiError::forbidden("Account is inactive"));
    }

    let namespace = SchemaLifecycleManager::shared().ensure_ready(&tenant).await?;

    let pool = DatabaseManager::shared_pool().await?;
    let handle = ScopedHandle::bind(pool, &namespace);

    debug!(
        "Bound request to tenant '{}' (namespace {})",
        tenant.name,
        handle.namespace()
    );

    // The handle lives in request extensions and is dropped with the request,
    // so release happens on every exit path
    request.extensions_mut().insert(tenant);
    request.extensions_mut().insert(handle);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_paths_bypass_the_gate() {
        assert!(is_public_path("/"));
        assert!(is_public_path("/health"));
        assert!(is_public_path("/auth/login/acme/admin"));
    }

    #[test]
    fn protected_paths_do_not() {
        assert!(!is_public_path("/api/data/objects"));
        assert!(!is_public_path("/api/auth/whoami"));
        assert!(!is_public_path("/healthz"));
        assert!(!is_public_path("/authx"));
    }
}
