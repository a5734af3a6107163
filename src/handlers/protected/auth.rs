// GET /api/auth/whoami - authenticated caller and bound tenant

use axum::extract::Extension;
use serde_json::{json, Value};

use crate::middleware::auth::AuthUser;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::tenancy::Tenant;

pub async fn session_whoami(
    Extension(auth): Extension<AuthUser>,
    Extension(tenant): Extension<Tenant>,
) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "user": {
            "id": auth.user_id,
            "name": auth.user,
            "access": auth.access,
        },
        "tenant": {
            "id": tenant.id,
            "name": tenant.name,
            "namespace": tenant.namespace,
        },
    })))
}
