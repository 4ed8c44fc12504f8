//! Server configuration file.
//!
//! ```yaml
//! bind: "0.0.0.0:8080"
//! http:
//!   max_header_bytes: 16384
//!   max_body_bytes: 1048576
//!   read_timeout_ms: 30000
//! session:
//!   cookie_prefix: brrtkit
//!   scope: session
//!   ttl_secs: 1800
//!   sweep_interval_secs: 60
//! public_dir: ./public
//! ```
//!
//! Every field is optional. Environment overrides are applied by
//! [`ServerConfig::apply_env_overrides`]: `BRRTKIT_BIND`,
//! `BRRTKIT_SESSION_TTL_SECS`, `BRRTKIT_SWEEP_INTERVAL_SECS`,
//! `BRRTKIT_PUBLIC_DIR`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::server::{RequestLimits, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES};
use crate::session::{SessionOptions, DEFAULT_COOKIE_PREFIX, DEFAULT_SCOPE};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub http: HttpConfig,
    pub session: SessionConfig,
    pub public_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            http: HttpConfig::default(),
            session: SessionConfig::default(),
            public_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    pub read_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            read_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_prefix: String,
    pub scope: String,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_prefix: DEFAULT_COOKIE_PREFIX.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Load and validate a YAML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] when the file cannot be read or parsed, and
    /// anything [`ServerConfig::validate`] rejects.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_yaml(&text).map_err(|e| match e {
            ConfigError::Invalid(message) => ConfigError::Load {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = env::var("BRRTKIT_BIND") {
            self.bind = bind;
        }
        if let Some(ttl) = env_u64("BRRTKIT_SESSION_TTL_SECS") {
            self.session.ttl_secs = ttl;
        }
        if let Some(interval) = env_u64("BRRTKIT_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs = interval;
        }
        if let Ok(dir) = env::var("BRRTKIT_PUBLIC_DIR") {
            self.public_dir = Some(PathBuf::from(dir));
        }
    }

    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for zero limits or timers,
    /// [`ConfigError::MissingDirectory`] for a public directory that does not exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("bind address is empty".into()));
        }
        if self.http.max_header_bytes == 0 || self.http.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("http limits must be non-zero".into()));
        }
        if self.session.ttl_secs == 0 {
            return Err(ConfigError::Invalid("session.ttl_secs must be non-zero".into()));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.sweep_interval_secs must be non-zero".into(),
            ));
        }
        if self.session.cookie_prefix.is_empty() || self.session.scope.is_empty() {
            return Err(ConfigError::Invalid(
                "session cookie prefix and scope must be non-empty".into(),
            ));
        }
        if let Some(dir) = &self.public_dir {
            if !dir.is_dir() {
                return Err(ConfigError::MissingDirectory { path: dir.clone() });
            }
        }
        Ok(())
    }

    pub fn limits(&self) -> RequestLimits {
        RequestLimits {
            max_header_bytes: self.http.max_header_bytes,
            max_body_bytes: self.http.max_body_bytes,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.http.read_timeout_ms)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            cookie_prefix: self.session.cookie_prefix.clone(),
            scope: self.session.scope.clone(),
            ttl: Duration::from_secs(self.session.ttl_secs),
            sweep_interval: Duration::from_secs(self.session.sweep_interval_secs),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}
