// Tenant registry administration under /api/root/tenant. `:tenant` accepts
// either the identifier or the id.

use std::sync::Arc;

use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::services::TenantService;
use crate::tenancy::{PgTenantStore, SqlxTenantMigrate};

pub mod create;
pub mod delete;
pub mod health;
pub mod list;
pub mod migrate;
pub mod restore;
pub mod show;
pub mod update;

pub use create::tenant_create;
pub use delete::tenant_delete;
pub use health::tenant_health;
pub use list::tenant_list;
pub use migrate::tenant_migrate;
pub use restore::tenant_restore;
pub use show::tenant_show;
pub use update::tenant_update;

/// Tenant service over the IAM registry and the embedded tenant migrations
pub(crate) async fn tenant_service() -> Result<TenantService, ApiError> {
    let pool = DatabaseManager::iam_pool().await?;
    Ok(TenantService::new(
        Arc::new(PgTenantStore::new(pool)),
        Arc::new(SqlxTenantMigrate),
    ))
}
