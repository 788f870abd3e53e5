use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub realtime: RealtimeConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub enabled: bool,
    pub auth_timeout_ms: u64,
    pub mount_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Fragment files merged in order
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("SECURITY_JWT_SECRET must be set outside development")]
    MissingJwtSecret,

    #[error("no endpoint model configured (set ARBOR_MODEL or pass model files)")]
    MissingModel,

    #[error("REALTIME_AUTH_TIMEOUT_MS must be greater than zero")]
    ZeroAuthTimeout,
}

const DEV_JWT_SECRET: &str = "arbor-development-secret";

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(lookup)
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // API overrides
        if let Some(v) = lookup("ARBOR_PORT").or_else(|| lookup("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Some(v) = lookup("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Some(v) = lookup("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Some(v) = lookup("SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Some(v) = lookup("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Some(v) = lookup("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Some(v) = lookup("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }

        // Real-time overrides
        if let Some(v) = lookup("REALTIME_ENABLED") {
            self.realtime.enabled = v.parse().unwrap_or(self.realtime.enabled);
        }
        if let Some(v) = lookup("REALTIME_AUTH_TIMEOUT_MS") {
            self.realtime.auth_timeout_ms = v.parse().unwrap_or(self.realtime.auth_timeout_ms);
        }

        if let Some(v) = lookup("ARBOR_MODEL") {
            self.model.paths = split_list(&v).into_iter().map(PathBuf::from).collect();
        }

        self
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.realtime.auth_timeout_ms)
    }

    /// Checks run before the server starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        if self.model.paths.is_empty() {
            return Err(ConfigError::MissingModel);
        }
        if self.realtime.enabled && self.realtime.auth_timeout_ms == 0 {
            return Err(ConfigError::ZeroAuthTimeout);
        }
        Ok(())
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                port: 9001,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            realtime: RealtimeConfig {
                enabled: true,
                auth_timeout_ms: 5000,
                mount_path: "/realtime".to_string(),
            },
            model: ModelConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                port: 9001,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            realtime: RealtimeConfig {
                enabled: true,
                auth_timeout_ms: 5000,
                mount_path: "/realtime".to_string(),
            },
            model: ModelConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                port: 9001,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            realtime: RealtimeConfig {
                enabled: true,
                auth_timeout_ms: 5000,
                mount_path: "/realtime".to_string(),
            },
            model: ModelConfig::default(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.realtime.auth_timeout_ms, 5000);
        assert!(!config.security.jwt_secret.is_empty());
        assert!(config.api.enable_request_logging);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::from_lookup(lookup(&[("APP_ENV", "prod"), ("ARBOR_MODEL", "api.json")]));
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.api.enable_request_logging);
        assert_eq!(config.validate(), Err(ConfigError::MissingJwtSecret));
    }

    #[test]
    fn env_overrides_apply() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("SECURITY_JWT_SECRET", "s3cret"),
            ("SECURITY_CORS_ORIGINS", "https://a.test, https://b.test"),
            ("REALTIME_AUTH_TIMEOUT_MS", "250"),
            ("REALTIME_ENABLED", "false"),
            ("ARBOR_MODEL", "base.yaml,extra.json"),
        ]));
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.security.jwt_secret, "s3cret");
        assert_eq!(config.security.cors_origins, vec!["https://a.test", "https://b.test"]);
        assert_eq!(config.auth_timeout(), Duration::from_millis(250));
        assert!(!config.realtime.enabled);
        assert_eq!(config.model.paths, vec![PathBuf::from("base.yaml"), PathBuf::from("extra.json")]);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn arbor_port_wins_over_port() {
        let config = AppConfig::from_lookup(lookup(&[("PORT", "8080"), ("ARBOR_PORT", "7000")]));
        assert_eq!(config.api.port, 7000);
    }

    #[test]
    fn missing_model_is_reported() {
        assert_eq!(AppConfig::development().validate(), Err(ConfigError::MissingModel));
    }
}
