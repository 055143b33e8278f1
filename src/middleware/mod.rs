pub mod auth;
pub mod response;
pub mod validate_tenant;
pub mod validate_user;

pub use auth::{jwt_auth_middleware, require_root_middleware, AuthUser};
pub use response::{ApiResponse, ApiResult, JsonBody, PathParams};
pub use validate_tenant::{validate_tenant_middleware, TenantPool, ValidatedTenant};
pub use validate_user::{validate_user_middleware, ValidatedUser};
