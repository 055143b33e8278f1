use axum::{extract::Request, middleware::Next, response::Response};
use sqlx::PgPool;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::config;
use crate::database::models::tenant::Tenant;
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::tenancy::{PgTenantStore, TenantStore};

/// Extracted tenant database pool, injected by middleware
#[derive(Clone)]
pub struct TenantPool(pub PgPool);

/// Tenant the request was resolved to
#[derive(Clone, Debug)]
pub struct ValidatedTenant {
    pub id: Uuid,
    pub identifier: String,
    pub name: String,
}

impl From<&Tenant> for ValidatedTenant {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id,
            identifier: tenant.identifier.clone(),
            name: tenant.name.clone(),
        }
    }
}

/// Resolves the tenant from the tenant header or the token claim, then attaches its pool
pub async fn validate_tenant_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before tenant validation"))?;

    let header_name = &config::config().tenancy.tenant_header;
    let header_value = request
        .headers()
        .get(header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let iam_pool = DatabaseManager::iam_pool().await?;
    let store = PgTenantStore::new(iam_pool);
    let tenant = resolve_tenant(&store, header_value.as_deref(), &auth_user).await?;

    let tenant_pool = DatabaseManager::tenant_pool(&tenant).await.map_err(|e| {
        tracing::error!("Failed to get database pool for tenant '{}': {}", tenant.identifier, e);
        ApiError::from(e)
    })?;

    tracing::debug!("Tenant validation successful: {} ({})", tenant.identifier, tenant.id);

    request.extensions_mut().insert(ValidatedTenant::from(&tenant));
    request.extensions_mut().insert(TenantPool(tenant_pool));

    Ok(next.run(request).await)
}

/// Header first, then the token's tenant claim.
pub async fn resolve_tenant(
    store: &dyn TenantStore,
    header_value: Option<&str>,
    auth_user: &AuthUser,
) -> Result<Tenant, ApiError> {
    let key = header_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| auth_user.tenant.as_deref().map(str::trim).filter(|v| !v.is_empty()))
        .ok_or_else(|| {
            let header = &config::config().tenancy.tenant_header;
            ApiError::bad_request(format!("Tenant is required: send the '{}' header or a tenant claim", header))
        })?;

    let tenant = store
        .try_get(key)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Tenant '{}' not found", key)))?;

    if !tenant.is_active {
        tracing::warn!("Tenant validation failed: tenant '{}' is inactive", tenant.identifier);
        return Err(ApiError::forbidden(format!("Tenant '{}' is not active", tenant.identifier)));
    }

    if !auth_user.is_root() {
        if let Some(claim) = auth_user.tenant.as_deref() {
            let claim = claim.trim();
            let matches = claim.eq_ignore_ascii_case(&tenant.identifier) || claim == tenant.id.to_string();
            if !matches {
                tracing::warn!(
                    "Token for '{}' is bound to tenant '{}' but requested '{}'",
                    auth_user.sub,
                    claim,
                    tenant.identifier
                );
                return Err(ApiError::forbidden("Token is not valid for this tenant"));
            }
        }
    }

    Ok(tenant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::testing::InMemoryTenantStore;
    use axum::http::StatusCode;

    fn user(tenant: Option<&str>, access: Option<&str>) -> AuthUser {
        AuthUser::from(Claims::new(
            "ops@acme.io",
            tenant.map(str::to_string),
            access.map(str::to_string),
        ))
    }

    fn store() -> InMemoryTenantStore {
        let acme = Tenant::new("acme", "Acme");
        let mut retired = Tenant::new("retired", "Retired");
        retired.is_active = false;
        InMemoryTenantStore::with(vec![acme, Tenant::new("globex", "Globex"), retired])
    }

    #[tokio::test]
    async fn header_wins_over_claim_for_root() {
        let tenant = resolve_tenant(&store(), Some("globex"), &user(Some("acme"), Some("root")))
            .await
            .unwrap();
        assert_eq!(tenant.identifier, "globex");
    }

    #[tokio::test]
    async fn claim_is_used_without_header() {
        let tenant = resolve_tenant(&store(), None, &user(Some("acme"), None)).await.unwrap();
        assert_eq!(tenant.identifier, "acme");
    }

    #[tokio::test]
    async fn missing_tenant_is_a_bad_request() {
        let err = resolve_tenant(&store(), Some("  "), &user(None, None)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let err = resolve_tenant(&store(), Some("initech"), &user(None, None)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn inactive_tenant_is_forbidden() {
        let err = resolve_tenant(&store(), Some("retired"), &user(Some("retired"), None))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn tenant_bound_token_cannot_switch_tenants() {
        let err = resolve_tenant(&store(), Some("globex"), &user(Some("acme"), None))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        assert!(resolve_tenant(&store(), Some("ACME"), &user(Some("acme"), None)).await.is_ok());
    }
}
