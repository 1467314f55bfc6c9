//! Configuration loading and management
//!
//! - [`ApiConfig`]: the file-level settings, loaded from YAML with
//!   environment overrides
//! - [`Options`]: the process-wide settings every pipeline reads, assembled
//!   with [`Options::builder`]
//! - [`RouteConfig`]: per route group stage callbacks and naming overrides

pub mod route;

pub use route::RouteConfig;

use crate::core::auth::LoginModel;
use crate::core::error::ConfigError;
use crate::core::naming::normalize_prefix;
use crate::core::store::{DataStore, StoreHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Environment variable overriding [`ApiConfig::jwt_secret`]
pub const ENV_JWT_SECRET: &str = "GRAPI_JWT_SECRET";
/// Environment variable overriding [`ApiConfig::uri_prefix`]
pub const ENV_URI_PREFIX: &str = "GRAPI_URI_PREFIX";
/// Environment variable overriding [`ApiConfig::log_level`]
pub const ENV_LOG_LEVEL: &str = "GRAPI_LOG_LEVEL";

/// Log verbosity
///
/// Numerically `-1`, `0` and `1`; see [`LogLevel::from_verbosity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Nothing is logged
    Silent,
    /// Only errors
    #[default]
    Errors,
    /// Everything, including one line per HTTP request
    Verbose,
}

impl LogLevel {
    /// Negative is silent, zero is errors only, positive is verbose
    pub fn from_verbosity(verbosity: i32) -> Self {
        match verbosity {
            v if v < 0 => LogLevel::Silent,
            0 => LogLevel::Errors,
            _ => LogLevel::Verbose,
        }
    }

    /// `tracing_subscriber` filter directive for this level
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            LogLevel::Errors => "error",
            LogLevel::Verbose => "grapi=debug,tower_http=debug,info",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(LogLevel::Silent),
            "errors" | "error" => Ok(LogLevel::Errors),
            "verbose" => Ok(LogLevel::Verbose),
            other => other
                .parse::<i32>()
                .map(LogLevel::from_verbosity)
                .map_err(|_| ConfigError::Load(format!("unknown log level '{}'", s))),
        }
    }
}

/// Settings that can live in a configuration file
///
/// ```yaml
/// uri_prefix: /v1
/// jwt_secret: SomethingLongAndDifficultToGuess
/// log_level: verbose
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Prefix of every generated route; empty means `/api`
    pub uri_prefix: String,

    /// Secret signing the tokens of the built-in authentication
    pub jwt_secret: Option<String>,

    pub log_level: LogLevel,
}

impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Apply `GRAPI_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `GRAPI_*` overrides read through `lookup`
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(secret) = lookup(ENV_JWT_SECRET) {
            self.jwt_secret = Some(secret);
        }
        if let Some(prefix) = lookup(ENV_URI_PREFIX) {
            self.uri_prefix = prefix;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level.parse()?;
        }
        Ok(self)
    }
}

/// Process-wide settings shared read-only by every pipeline
pub struct Options {
    pub(crate) store: StoreHandle,
    pub(crate) jwt_secret: Option<String>,
    pub(crate) login_model: Option<Arc<dyn LoginModel>>,
    pub(crate) uri_prefix: String,
    pub(crate) log_level: LogLevel,
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// The unscoped store handle
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref()
    }

    pub fn login_model(&self) -> Option<&Arc<dyn LoginModel>> {
        self.login_model.as_ref()
    }

    /// Normalized URI prefix, e.g. `/api`
    pub fn uri_prefix(&self) -> &str {
        &self.uri_prefix
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("store", &self.store)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("login_model", &self.login_model.is_some())
            .field("uri_prefix", &self.uri_prefix)
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Builder for [`Options`]
///
/// # Example
///
/// ```rust
/// use grapi::prelude::*;
///
/// let options = Options::builder()
///     .store(MemoryStore::new())
///     .uri_prefix("v1/")
///     .build()
///     .unwrap();
/// assert_eq!(options.uri_prefix(), "/v1");
/// ```
#[derive(Default)]
pub struct OptionsBuilder {
    store: Option<Arc<dyn DataStore>>,
    jwt_secret: Option<String>,
    login_model: Option<Arc<dyn LoginModel>>,
    uri_prefix: String,
    log_level: LogLevel,
}

impl OptionsBuilder {
    /// Set the data store (required)
    pub fn store(mut self, store: impl DataStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set an already shared data store
    pub fn store_arc(mut self, store: Arc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    /// Set the collaborator checking logins and resolving token subjects
    pub fn login_model(mut self, model: impl LoginModel + 'static) -> Self {
        self.login_model = Some(Arc::new(model));
        self
    }

    pub fn uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uri_prefix = prefix.into();
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Apply loaded file settings; a missing secret keeps the current one
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.uri_prefix = config.uri_prefix;
        self.log_level = config.log_level;
        if config.jwt_secret.is_some() {
            self.jwt_secret = config.jwt_secret;
        }
        self
    }

    pub fn build(self) -> Result<Options, ConfigError> {
        let store = self.store.ok_or(ConfigError::MissingStore)?;

        Ok(Options {
            store: StoreHandle::new(store),
            jwt_secret: self.jwt_secret.filter(|secret| !secret.is_empty()),
            login_model: self.login_model,
            uri_prefix: normalize_prefix(&self.uri_prefix),
            log_level: self.log_level,
        })
    }
}
