use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    ConnectOptions, PgPool,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config;
use crate::database::models::tenant::{ConnectionTarget, Tenant};

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("Tenant '{0}' has no connection string or database name")]
    NoConnectionTarget(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Centralized connection pool manager for the IAM database and tenant databases
pub struct DatabaseManager {
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl DatabaseManager {
    fn instance() -> &'static DatabaseManager {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<DatabaseManager> = OnceLock::new();
        INSTANCE.get_or_init(|| DatabaseManager {
            pools: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Pool for the IAM database holding the tenant registry
    pub async fn iam_pool() -> Result<PgPool, DatabaseError> {
        let name = &config::config().tenancy.iam_database;
        let connection_string = Self::build_connection_string(name)?;
        Self::instance().get_pool(name, &connection_string).await
    }

    /// Pool for a tenant, from its explicit connection string or its database name
    pub async fn tenant_pool(tenant: &Tenant) -> Result<PgPool, DatabaseError> {
        let key = Self::tenant_pool_key(tenant)?;
        let connection_string = match tenant.connection_target() {
            Some(ConnectionTarget::ConnectionString(connection_string)) => connection_string.to_string(),
            Some(ConnectionTarget::Database(database_name)) => Self::build_connection_string(database_name)?,
            None => return Err(DatabaseError::NoConnectionTarget(tenant.identifier.clone())),
        };
        Self::instance().get_pool(&key, &connection_string).await
    }

    /// Cache key of a tenant pool. It changes with the connection settings, so an
    /// edited tenant never reuses a pool opened against its old database.
    fn tenant_pool_key(tenant: &Tenant) -> Result<String, DatabaseError> {
        match tenant.connection_target() {
            Some(ConnectionTarget::ConnectionString(connection_string)) => {
                // Fingerprint only; the connection string may carry a password and keys are logged
                Ok(format!("tenant:{}:{}", tenant.id, short_hash(connection_string)))
            }
            Some(ConnectionTarget::Database(database_name)) => {
                if !Self::is_valid_tenant_db_name(database_name) {
                    return Err(DatabaseError::InvalidDatabaseName(database_name.to_string()));
                }
                Ok(format!("tenant:{}:{}", tenant.id, database_name))
            }
            None => Err(DatabaseError::NoConnectionTarget(tenant.identifier.clone())),
        }
    }

    /// Close and forget every cached pool of a tenant. Returns how many were dropped.
    pub async fn evict_tenant(tenant_id: Uuid) -> usize {
        let prefix = format!("tenant:{}:", tenant_id);

        let evicted: Vec<(String, PgPool)> = {
            let mut pools = Self::instance().pools.write().await;
            let keys: Vec<String> = pools.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
            keys.into_iter()
                .filter_map(|key| pools.remove(&key).map(|pool| (key, pool)))
                .collect()
        };

        let count = evicted.len();
        for (key, pool) in evicted {
            pool.close().await;
            info!("Evicted database pool: {}", key);
        }
        count
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(&self, key: &str, connection_string: &str) -> Result<PgPool, DatabaseError> {
        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(key) {
                return Ok(pool.clone());
            }
        }

        let settings = &config::config().database;
        let mut options = PgConnectOptions::from_str(connection_string)?;
        if !settings.enable_query_logging {
            options = options.disable_statement_logging();
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connection_timeout))
            .connect_with(options)
            .await?;

        let mut pools = self.pools.write().await;
        if let Some(existing) = pools.get(key) {
            // Another request won the race; keep the cached pool
            pool.close().await;
            return Ok(existing.clone());
        }
        pools.insert(key.to_string(), pool.clone());

        info!("Created database pool for: {}", key);
        Ok(pool)
    }

    fn build_connection_string(database_name: &str) -> Result<String, DatabaseError> {
        let base = std::env::var("DATABASE_URL")
            .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let mut url = url::Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        // Replace the path to the database name (ensure leading slash)
        url.set_path(&format!("/{}", database_name));
        Ok(url.into())
    }

    /// Pings the IAM pool to ensure connectivity
    pub async fn health_check() -> Result<(), DatabaseError> {
        let pool = Self::iam_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Pings a tenant database
    pub async fn tenant_health_check(tenant: &Tenant) -> Result<(), DatabaseError> {
        let pool = Self::tenant_pool(tenant).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Create an empty database for a newly registered tenant
    pub async fn create_database(database_name: &str) -> Result<(), DatabaseError> {
        if !Self::is_valid_tenant_db_name(database_name) {
            return Err(DatabaseError::InvalidDatabaseName(database_name.to_string()));
        }

        // Connect to postgres database for administrative operations
        let admin_pool = Self::instance().get_admin_pool().await?;

        let exists: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(database_name)
            .fetch_one(&admin_pool)
            .await?;
        if exists.0 {
            info!("Database {} already exists, reusing it", database_name);
            return Ok(());
        }

        let query = format!("CREATE DATABASE {}", Self::quote_identifier(database_name));
        sqlx::query(&query).execute(&admin_pool).await?;

        info!("Created database {}", database_name);
        Ok(())
    }

    /// Get administrative connection pool (connects to postgres database)
    async fn get_admin_pool(&self) -> Result<PgPool, DatabaseError> {
        let connection_string = Self::build_connection_string("postgres")?;
        self.get_pool("postgres", &connection_string).await
    }

    /// Deterministic database name for a tenant identifier
    pub fn tenant_database_name(identifier: &str) -> String {
        format!("tenant_{}", short_hash(identifier))
    }

    /// Quote SQL identifier to prevent injection
    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all() {
        let manager = Self::instance();
        let mut pools = manager.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!("Closed database pool: {}", name);
        }
    }

    /// Tenant databases are named `tenant_` followed by [a-zA-Z0-9_]+. The IAM and
    /// `postgres` databases never qualify.
    pub fn is_valid_tenant_db_name(name: &str) -> bool {
        match name.strip_prefix("tenant_") {
            Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) async fn cache_lazy_tenant_pool(tenant: &Tenant) -> Result<String, DatabaseError> {
        let key = Self::tenant_pool_key(tenant)?;
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/tenant_cached")?;
        Self::instance().pools.write().await.insert(key.clone(), pool);
        Ok(key)
    }

    #[cfg(test)]
    pub(crate) async fn is_cached(key: &str) -> bool {
        Self::instance().pools.read().await.contains_key(key)
    }
}

/// First 16 hex characters of the SHA-256 of `value`
fn short_hash(value: &str) -> String {
    use sha2::{Digest, Sha256};

    let hash = format!("{:x}", Sha256::digest(value.as_bytes()));
    hash[..16].to_string()
}
