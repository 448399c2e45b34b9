use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub platform: PlatformConfig,
    pub provisioning: ProvisioningConfig,
    pub rate_limit: RateLimitConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL for the central registry database. When unset the
    /// server falls back to the in-memory backend (development only).
    pub url: Option<String>,
    /// Privileged URL used for CREATE DATABASE / CREATE ROLE. Defaults to
    /// `url` with the path swapped to `postgres`.
    pub admin_url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base domain under which tenant subdomains are issued.
    pub base_domain: String,
    /// Host/port advertised in tenant connection strings.
    pub db_host: String,
    pub db_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Numbered-suffix candidates tried before the timestamp fallback.
    pub max_name_attempts: u32,
    /// Provision calls with side effects allowed before a registration is
    /// forced to `cancelled`.
    pub max_provisioning_attempts: u32,
    /// Ceiling on each outbound DNS/SSL configuration call.
    pub infra_timeout_secs: u64,
    /// Enable the slower DNS resolution probe during subdomain allocation.
    pub dns_probe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Per-source-IP ceiling across all guarded endpoints.
    pub global_ip_max: u32,
    pub global_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Target for fire-and-forget registration event notifications. Events
    /// are logged only when unset.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Environment presets first, then specific env vars override.
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("ATRIUM_BIND") {
            self.server.bind = v;
        }
        if let Ok(v) = env::var("PORT").or_else(|_| env::var("ATRIUM_PORT")) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("ADMIN_DATABASE_URL") {
            self.database.admin_url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT") {
            self.database.connect_timeout_secs =
                v.parse().unwrap_or(self.database.connect_timeout_secs);
        }

        if let Ok(v) = env::var("ATRIUM_BASE_DOMAIN") {
            self.platform.base_domain = v;
        }
        if let Ok(v) = env::var("ATRIUM_DB_HOST") {
            self.platform.db_host = v;
        }
        if let Ok(v) = env::var("ATRIUM_DB_PORT") {
            self.platform.db_port = v.parse().unwrap_or(self.platform.db_port);
        }

        if let Ok(v) = env::var("PROVISIONING_MAX_NAME_ATTEMPTS") {
            self.provisioning.max_name_attempts =
                v.parse().unwrap_or(self.provisioning.max_name_attempts);
        }
        if let Ok(v) = env::var("PROVISIONING_MAX_ATTEMPTS") {
            self.provisioning.max_provisioning_attempts = v
                .parse()
                .unwrap_or(self.provisioning.max_provisioning_attempts);
        }
        if let Ok(v) = env::var("PROVISIONING_INFRA_TIMEOUT") {
            self.provisioning.infra_timeout_secs =
                v.parse().unwrap_or(self.provisioning.infra_timeout_secs);
        }
        if let Ok(v) = env::var("PROVISIONING_DNS_PROBE") {
            self.provisioning.dns_probe = v.parse().unwrap_or(self.provisioning.dns_probe);
        }

        if let Ok(v) = env::var("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = v.parse().unwrap_or(self.rate_limit.enabled);
        }
        if let Ok(v) = env::var("RATE_LIMIT_GLOBAL_IP_MAX") {
            self.rate_limit.global_ip_max = v.parse().unwrap_or(self.rate_limit.global_ip_max);
        }
        if let Ok(v) = env::var("RATE_LIMIT_GLOBAL_WINDOW") {
            self.rate_limit.global_window_secs =
                v.parse().unwrap_or(self.rate_limit.global_window_secs);
        }

        if let Ok(v) = env::var("WEBHOOK_URL") {
            self.webhook.url = Some(v);
        }
        if let Ok(v) = env::var("WEBHOOK_TIMEOUT") {
            self.webhook.timeout_secs = v.parse().unwrap_or(self.webhook.timeout_secs);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                bind: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: None,
                admin_url: None,
                max_connections: 10,
                connect_timeout_secs: 30,
            },
            platform: PlatformConfig {
                base_domain: "atrium.localtest.me".to_string(),
                db_host: "localhost".to_string(),
                db_port: 5432,
            },
            provisioning: ProvisioningConfig {
                max_name_attempts: 5,
                max_provisioning_attempts: 5,
                infra_timeout_secs: 30,
                dns_probe: false,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                global_ip_max: 50,
                global_window_secs: 3600,
            },
            webhook: WebhookConfig {
                url: None,
                timeout_secs: 30,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                admin_url: None,
                max_connections: 20,
                connect_timeout_secs: 10,
            },
            platform: PlatformConfig {
                base_domain: "staging.atrium.cloud".to_string(),
                db_host: "localhost".to_string(),
                db_port: 5432,
            },
            provisioning: ProvisioningConfig {
                max_name_attempts: 5,
                max_provisioning_attempts: 5,
                infra_timeout_secs: 30,
                dns_probe: true,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                global_ip_max: 50,
                global_window_secs: 3600,
            },
            ..Self::development()
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                admin_url: None,
                max_connections: 50,
                connect_timeout_secs: 5,
            },
            platform: PlatformConfig {
                base_domain: "atrium.cloud".to_string(),
                db_host: "localhost".to_string(),
                db_port: 5432,
            },
            provisioning: ProvisioningConfig {
                max_name_attempts: 5,
                max_provisioning_attempts: 5,
                infra_timeout_secs: 30,
                dns_probe: true,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                global_ip_max: 50,
                global_window_secs: 3600,
            },
            ..Self::development()
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
