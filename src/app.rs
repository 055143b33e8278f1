use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{config, SecurityConfig};
use crate::handlers::{elevated, protected, public};
use crate::middleware::{jwt_auth_middleware, require_root_middleware, validate_tenant_middleware, validate_user_middleware};

/// Full application router
pub fn app() -> Router {
    let settings = config();

    let mut router = Router::new()
        .merge(public_routes())
        .merge(protected_routes())
        .merge(root_routes())
        .layer(DefaultBodyLimit::max(settings.api.max_request_size_bytes));

    if settings.security.enable_cors {
        router = router.layer(cors_layer(&settings.security));
    }
    if settings.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

fn public_routes() -> Router {
    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/auth/login", post(public::login))
}

/// /api/* except /api/root: token, then tenant, then user
fn protected_routes() -> Router {
    use protected::*;

    Router::new()
        .route("/api/me", get(me::me))
        // Identity
        .route("/api/users", get(users::user_list).post(users::user_create))
        .route(
            "/api/users/:id",
            get(users::user_show).put(users::user_update).delete(users::user_delete),
        )
        .route("/api/users/:id/roles", put(users::user_roles))
        .route("/api/roles", get(roles::role_list).post(roles::role_create))
        .route(
            "/api/roles/:id",
            get(roles::role_show).put(roles::role_update).delete(roles::role_delete),
        )
        .route("/api/roles/:id/permissions", put(roles::role_permissions))
        .route("/api/permissions", get(roles::permission_list))
        // Catalog
        .route("/api/clients", get(clients::client_list).post(clients::client_create))
        .route(
            "/api/clients/:id",
            get(clients::client_show)
                .put(clients::client_update)
                .delete(clients::client_delete),
        )
        .route("/api/projects", get(projects::project_list).post(projects::project_create))
        .route(
            "/api/projects/:id",
            get(projects::project_show)
                .put(projects::project_update)
                .delete(projects::project_delete),
        )
        .route("/api/schemas", get(schemas::schema_list).post(schemas::schema_create))
        .route(
            "/api/schemas/:id",
            get(schemas::schema_show)
                .put(schemas::schema_update)
                .delete(schemas::schema_delete),
        )
        .route("/api/schemas/:id/fields", get(schemas::field_list).post(schemas::field_create))
        .route("/api/schemas/:id/fields/order", put(schemas::field_reorder))
        .route(
            "/api/schemas/:id/fields/:field_id",
            put(schemas::field_update).delete(schemas::field_delete),
        )
        .route(
            "/api/field-mappings",
            get(field_mappings::mapping_list).post(field_mappings::mapping_create),
        )
        .route("/api/field-mappings/:id", delete(field_mappings::mapping_delete))
        // Work
        .route("/api/batches", get(batches::batch_list).post(batches::batch_create))
        .route("/api/batches/:id", get(batches::batch_show).put(batches::batch_update))
        .route("/api/batches/:id/close", post(batches::batch_close))
        .route("/api/orders", get(orders::order_list).post(orders::order_create))
        .route(
            "/api/orders/:id",
            get(orders::order_show)
                .put(orders::order_update)
                .delete(orders::order_delete),
        )
        .route("/api/orders/:id/flow", get(orders::flow_history))
        .route("/api/orders/:id/flow/:action", post(orders::flow_transition))
        .route("/api/orders/:id/data", get(orders::data_show).put(orders::data_update))
        .route("/api/orders/:id/data/extracted", post(orders::data_import))
        .route(
            "/api/orders/:id/documents",
            get(documents::document_list).post(documents::document_create),
        )
        .route("/api/documents/:id", delete(documents::document_delete))
        .route("/api/audit", get(audit::audit_list))
        // Last layer added runs first
        .route_layer(middleware::from_fn(validate_user_middleware))
        .route_layer(middleware::from_fn(validate_tenant_middleware))
        .route_layer(middleware::from_fn(jwt_auth_middleware))
}

/// /api/root/*: token with root access, no tenant
fn root_routes() -> Router {
    use elevated::root::{self, tenant};

    Router::new()
        .route("/api/root/tenant", get(tenant::tenant_list).post(tenant::tenant_create))
        .route(
            "/api/root/tenant/:tenant",
            get(tenant::tenant_show)
                .patch(tenant::tenant_update)
                .delete(tenant::tenant_delete)
                .put(tenant::tenant_restore),
        )
        .route("/api/root/tenant/:tenant/health", get(tenant::tenant_health))
        .route("/api/root/tenant/:tenant/migrate", post(tenant::tenant_migrate))
        .route("/api/root/migrate", post(root::migrate_all))
        .route_layer(middleware::from_fn(require_root_middleware))
        .route_layer(middleware::from_fn(jwt_auth_middleware))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
