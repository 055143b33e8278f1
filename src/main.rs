use anyhow::Context;
use tracing_subscriber::EnvFilter;

use docflow_api::config::config;
use docflow_api::database::DatabaseManager;
use docflow_api::tenancy::{migrate_iam, migrate_tenants, PgTenantStore, SqlxTenantMigrate, TenantStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = config();
    tracing::info!("Starting DocFlow API in {:?} mode", settings.environment);

    if settings.tenancy.run_migrations_on_startup {
        run_startup_migrations().await;
    }

    let bind_addr = format!("0.0.0.0:{}", settings.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("DocFlow API listening on http://{}", bind_addr);

    axum::serve(listener, docflow_api::app())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    DatabaseManager::close_all().await;
    Ok(())
}

/// IAM schema first, then every active tenant. Failures are logged; the server still starts.
async fn run_startup_migrations() {
    if let Err(e) = migrate_iam().await {
        tracing::error!("IAM migrations failed: {}", e);
        return;
    }

    let pool = match DatabaseManager::iam_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Cannot reach IAM database for tenant migrations: {}", e);
            return;
        }
    };

    let tenants = PgTenantStore::new(pool).get_all().await;
    let report = migrate_tenants(&tenants, &SqlxTenantMigrate).await;
    if !report.is_success() {
        tracing::warn!("{} tenant(s) failed to migrate", report.failed);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
