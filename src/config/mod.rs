use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub tenancy: TenancyConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

/// Tenant resolution and namespace lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// TTL for directory cache entries (seconds).
    pub cache_ttl_secs: u64,
    /// Whether unresolved requests may fall back to the bootstrap tenant.
    /// Routing every unresolved request to one tenant is only acceptable for
    /// local development; production presets force this off.
    pub default_tenant_enabled: bool,
    /// Name of the bootstrap tenant used by the fallback.
    pub default_tenant: String,
    /// Upper bound on a single namespace provisioning run (seconds).
    pub provision_timeout_secs: u64,
}

/// External identity lookup used when JWT claims carry no tenant field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity service; unset disables the lookup.
    pub endpoint: Option<String>,
    /// Hard timeout for the upstream call (milliseconds).
    pub timeout_ms: u64,
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
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs = v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_STATEMENT_TIMEOUT_MS") {
            self.database.statement_timeout_ms = v.parse().unwrap_or(self.database.statement_timeout_ms);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_CACHE_TTL_SECS") {
            self.tenancy.cache_ttl_secs = v.parse().unwrap_or(self.tenancy.cache_ttl_secs);
        }
        if let Ok(v) = env::var("TENANCY_DEFAULT_TENANT_ENABLED") {
            self.tenancy.default_tenant_enabled = v.parse().unwrap_or(self.tenancy.default_tenant_enabled);
        }
        if let Ok(v) = env::var("TENANCY_DEFAULT_TENANT") {
            self.tenancy.default_tenant = v;
        }
        if let Ok(v) = env::var("TENANCY_PROVISION_TIMEOUT_SECS") {
            self.tenancy.provision_timeout_secs = v.parse().unwrap_or(self.tenancy.provision_timeout_secs);
        }

        // Identity overrides
        if let Ok(v) = env::var("IDENTITY_ENDPOINT") {
            self.identity.endpoint = if v.is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = env::var("IDENTITY_TIMEOUT_MS") {
            self.identity.timeout_ms = v.parse().unwrap_or(self.identity.timeout_ms);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                acquire_timeout_secs: 30,
                statement_timeout_ms: 10_000,
            },
            security: SecurityConfig {
                jwt_secret: "fieldops-dev-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            tenancy: TenancyConfig {
                cache_ttl_secs: 900,
                default_tenant_enabled: true,
                default_tenant: "default".to_string(),
                provision_timeout_secs: 60,
            },
            identity: IdentityConfig {
                endpoint: None,
                timeout_ms: 2_500,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                acquire_timeout_secs: 10,
                statement_timeout_ms: 5_000,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                jwt_expiry_hours: 24,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            tenancy: TenancyConfig {
                cache_ttl_secs: 900,
                default_tenant_enabled: false,
                default_tenant: "default".to_string(),
                provision_timeout_secs: 30,
            },
            identity: IdentityConfig {
                endpoint: None,
                timeout_ms: 2_500,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                acquire_timeout_secs: 5,
                statement_timeout_ms: 5_000,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                jwt_expiry_hours: 4,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            tenancy: TenancyConfig {
                cache_ttl_secs: 900,
                default_tenant_enabled: false,
                default_tenant: "default".to_string(),
                provision_timeout_secs: 30,
            },
            identity: IdentityConfig {
                endpoint: None,
                timeout_ms: 2_500,
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

// Helper macros for common checks
#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.tenancy.default_tenant_enabled);
        assert_eq!(config.tenancy.cache_ttl_secs, 900);
        assert!(!config.security.jwt_secret.is_empty());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        // The bootstrap fallback must stay off outside development
        assert!(!config.tenancy.default_tenant_enabled);
        assert!(config.security.jwt_secret.is_empty());
        assert_eq!(config.tenancy.provision_timeout_secs, 30);
    }

    #[test]
    fn test_identity_lookup_disabled_by_default() {
        assert!(AppConfig::development().identity.endpoint.is_none());
        assert!(AppConfig::production().identity.endpoint.is_none());
    }
}
