pub mod auth;
pub mod response;
pub mod tenant_gate;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use response::{ApiResponse, ApiResult};
pub use tenant_gate::{is_public_path, tenant_gate_middleware};
