use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub filter: FilterConfig,
    pub restrict: RestrictConfig,
    pub crud: CrudConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Limit applied when the caller supplies none.
    pub default_limit: i64,
    /// Hard cap; client-requested limits are clamped to this.
    pub max_limit: i64,
    /// Compile id-looking string comparisons as an OR of id-typed and
    /// string-typed alternatives.
    pub auto_detect_ids: bool,
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictConfig {
    /// Recursion budget for the enforce() walk.
    pub max_depth: u32,
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrudConfig {
    /// Fields removed unconditionally during output preparation.
    pub secret_fields: Vec<String>,
    /// Fields one-way hashed during input preparation.
    pub password_fields: Vec<String>,
    pub enable_audit_logging: bool,
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
        if let Ok(v) = env::var("FILTER_DEFAULT_LIMIT") {
            self.filter.default_limit = v.parse().unwrap_or(self.filter.default_limit);
        }
        if let Ok(v) = env::var("FILTER_MAX_LIMIT") {
            self.filter.max_limit = v.parse().unwrap_or(self.filter.max_limit);
        }
        if let Ok(v) = env::var("FILTER_AUTO_DETECT_IDS") {
            self.filter.auto_detect_ids = v.parse().unwrap_or(self.filter.auto_detect_ids);
        }
        if let Ok(v) = env::var("FILTER_DEBUG_LOGGING") {
            self.filter.debug_logging = v.parse().unwrap_or(self.filter.debug_logging);
        }
        if let Ok(v) = env::var("RESTRICT_MAX_DEPTH") {
            self.restrict.max_depth = v.parse().unwrap_or(self.restrict.max_depth);
        }
        if let Ok(v) = env::var("RESTRICT_DEBUG_LOGGING") {
            self.restrict.debug_logging = v.parse().unwrap_or(self.restrict.debug_logging);
        }
        if let Ok(v) = env::var("CRUD_SECRET_FIELDS") {
            self.crud.secret_fields = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("CRUD_PASSWORD_FIELDS") {
            self.crud.password_fields = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("CRUD_ENABLE_AUDIT_LOGGING") {
            self.crud.enable_audit_logging = v.parse().unwrap_or(self.crud.enable_audit_logging);
        }
        self
    }

    fn base_crud() -> CrudConfig {
        CrudConfig {
            secret_fields: vec![
                "password".to_string(),
                "verificationToken".to_string(),
                "passwordResetToken".to_string(),
            ],
            password_fields: vec!["password".to_string()],
            enable_audit_logging: false,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            filter: FilterConfig {
                default_limit: 25,
                max_limit: 1000,
                auto_detect_ids: false,
                debug_logging: true,
            },
            restrict: RestrictConfig {
                max_depth: 32,
                debug_logging: true,
            },
            crud: Self::base_crud(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            filter: FilterConfig {
                default_limit: 25,
                max_limit: 500,
                auto_detect_ids: false,
                debug_logging: false,
            },
            restrict: RestrictConfig {
                max_depth: 32,
                debug_logging: false,
            },
            crud: CrudConfig {
                enable_audit_logging: true,
                ..Self::base_crud()
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            filter: FilterConfig {
                default_limit: 25,
                max_limit: 100,
                auto_detect_ids: false,
                debug_logging: false,
            },
            restrict: RestrictConfig {
                max_depth: 16,
                debug_logging: false,
            },
            crud: CrudConfig {
                enable_audit_logging: true,
                ..Self::base_crud()
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
