use axum::Extension;

use crate::middleware::{TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::{PgUserService, UserService};

/// GET /api/me
pub async fn me(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
) -> ServiceResult<ValidatedUser> {
    PgUserService::new(pool).me(&user).await
}
