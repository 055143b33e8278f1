use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub tenancy: TenancyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_expiry_hours: u64,
    pub allow_dev_login: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Database holding the tenant registry.
    pub iam_database: String,
    /// Request header carrying the tenant identifier or id.
    pub tenant_header: String,
    pub run_migrations_on_startup: bool,
    /// Create a dedicated database when a tenant is registered without a connection string.
    pub provision_databases: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }

        // API overrides
        if let Some(v) = env::var("DOCFLOW_API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ISSUER") {
            self.security.jwt_issuer = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_ALLOW_DEV_LOGIN") {
            self.security.allow_dev_login = v.parse().unwrap_or(self.security.allow_dev_login);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_IAM_DATABASE") {
            self.tenancy.iam_database = v;
        }
        if let Ok(v) = env::var("TENANCY_TENANT_HEADER") {
            self.tenancy.tenant_header = v.to_ascii_lowercase();
        }
        if let Ok(v) = env::var("TENANCY_RUN_MIGRATIONS_ON_STARTUP") {
            self.tenancy.run_migrations_on_startup = v.parse().unwrap_or(self.tenancy.run_migrations_on_startup);
        }
        if let Ok(v) = env::var("TENANCY_PROVISION_DATABASES") {
            self.tenancy.provision_databases = v.parse().unwrap_or(self.tenancy.provision_databases);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 5,
                enable_query_logging: true,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                default_page_size: 50,
                max_page_size: 1000,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "docflow-development-secret".to_string(),
                jwt_issuer: "docflow-api".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                allow_dev_login: true,
            },
            tenancy: TenancyConfig {
                iam_database: "docflow_iam".to_string(),
                tenant_header: "x-tenant".to_string(),
                run_migrations_on_startup: false,
                provision_databases: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                enable_query_logging: true,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                default_page_size: 50,
                max_page_size: 500,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_issuer: "docflow-api".to_string(),
                jwt_expiry_hours: 24,
                allow_dev_login: false,
            },
            tenancy: TenancyConfig {
                iam_database: "docflow_iam".to_string(),
                tenant_header: "x-tenant".to_string(),
                run_migrations_on_startup: true,
                provision_databases: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                enable_query_logging: false,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
                default_page_size: 25,
                max_page_size: 100,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_issuer: "docflow-api".to_string(),
                jwt_expiry_hours: 4,
                allow_dev_login: false,
            },
            tenancy: TenancyConfig {
                iam_database: "docflow_iam".to_string(),
                tenant_header: "x-tenant".to_string(),
                run_migrations_on_startup: true,
                provision_databases: false,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.security.allow_dev_login);
        assert!(!config.security.jwt_secret.is_empty());
        assert_eq!(config.api.max_page_size, 1000);
        assert!(!config.tenancy.run_migrations_on_startup);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.security.allow_dev_login);
        assert!(config.security.jwt_secret.is_empty());
        assert_eq!(config.api.max_page_size, 100);
        assert!(config.tenancy.run_migrations_on_startup);
        assert!(!config.tenancy.provision_databases);
    }

    #[test]
    fn test_tenant_header_is_lowercase() {
        for config in [AppConfig::development(), AppConfig::staging(), AppConfig::production()] {
            assert_eq!(config.tenancy.tenant_header, config.tenancy.tenant_header.to_ascii_lowercase());
        }
    }
}
