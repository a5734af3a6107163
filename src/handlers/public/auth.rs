// POST /auth/login/:tenant/:user - token acquisition
//
// Public route: runs before any tenant binding exists, so it drives the
// directory and lifecycle manager itself. Failures stay deliberately vague;
// login responses must not reveal which tenants exist.

use axum::extract::Path;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::tenancy::{ScopedHandle, SchemaLifecycleManager, TenantDirectory, TenantLookup};

#[axum::debug_handler]
pub async fn session_login(Path((tenant, user)): Path<(String, String)>) -> ApiResult<Value> {
    let directory = TenantDirectory::shared();

    let tenant = directory
        .get_by_name(&tenant)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid tenant or user"))?;

    if !tenant.is_active {
        return Err(ApiError::forbidden("Account is inactive"));
    }

    let namespace = SchemaLifecycleManager::shared().ensure_ready(&tenant).await?;
    let handle = ScopedHandle::bind(DatabaseManager::shared_pool().await?, &namespace);

    let mut conn = handle.acquire().await?;
    let row: Option<(Uuid, String, String)> = sqlx::query_as(
        "SELECT id, name, access FROM users WHERE name = $1 AND is_active",
    )
    .bind(&user)
    .fetch_optional(&mut *conn)
    .await?;

    let (user_id, user_name, access) =
        row.ok_or_else(|| ApiError::unauthorized("Invalid tenant or user"))?;

    let claims = Claims::new(user_id, user_name.clone(), access.clone(), Some(tenant.id));
    let token = generate_jwt(claims)?;
    let expires_in = config::config().security.jwt_expiry_hours * 3600;

    Ok(ApiResponse::success(json!({
        "token": token,
        "user": {
            "id": user_id,
            "name": user_name,
            "access": access,
            "tenant": tenant.name,
            "namespace": tenant.namespace,
        },
        "expires_in": expires_in,
    })))
}

#[cfg(test)]
mod _send_probe9 {
    use super::*;
    use axum::extract::Path;
    fn assert_send<T: Send>(_: T) {}
    #[allow(dead_code)]
    fn probe() {
        assert_send(session_login(Path(("a".into(), "b".into()))));
    }
}
