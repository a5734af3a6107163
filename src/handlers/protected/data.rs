// /api/data/objects - managed business objects, per-tenant
//
// Everything here goes through the request's ScopedHandle; the handlers never
// see the raw pool, so they cannot escape the tenant's namespace.

use axum::extract::Extension;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::tenancy::ScopedHandle;

#[derive(Debug, Serialize, FromRow)]
pub struct BusinessObject {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateObjectRequest {
    pub name: String,
    pub address: Option<String>,
    pub notes: Option<String>,
}

pub async fn object_list(
    Extension(handle): Extension<ScopedHandle>,
) -> ApiResult<Vec<BusinessObject>> {
    let mut conn = handle.acquire().await?;

    let objects = sqlx::query_as::<_, BusinessObject>(
        "SELECT id, name, address, notes, is_active, created_at \
         FROM objects ORDER BY created_at DESC LIMIT 100",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(ApiResponse::success(objects))
}

pub async fn object_create(
    Extension(handle): Extension<ScopedHandle>,
    Json(payload): Json<CreateObjectRequest>,
) -> ApiResult<BusinessObject> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("Object name is required"));
    }

    let mut conn = handle.acquire().await?;

    let object = sqlx::query_as::<_, BusinessObject>(
        "INSERT INTO objects (name, address, notes) VALUES ($1, $2, $3) \
         RETURNING id, name, address, notes, is_active, created_at",
    )
    .bind(payload.name.trim())
    .bind(payload.address.as_deref())
    .bind(payload.notes.as_deref())
    .fetch_one(&mut *conn)
    .await?;

    Ok(ApiResponse::created(object))
}
