//! Server configuration.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use super::constants::*;
use super::env_loader;
use crate::error::ServeError;
use crate::helpers::csrf;

/// Settings for the bundled HTTP adapter.
#[derive(Clone)]
pub struct ServeConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Secret mixed into CSRF tokens.
    pub csrf_secret: String,
    /// Parameter forms submit the CSRF token under.
    pub csrf_param: String,
    pub session_max_age: Duration,
    /// Log one line per request with filtered parameters.
    pub log_requests: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            csrf_secret: csrf::generate_seed(),
            csrf_param: csrf::DEFAULT_PARAM.to_string(),
            session_max_age: Duration::from_secs(DEFAULT_SESSION_MAX_AGE_SECS),
            log_requests: true,
        }
    }
}

impl ServeConfig {
    /// Load `.env` files from `folder`, then read the environment.
    pub fn load(folder: &Path) -> Result<Self, ServeError> {
        env_loader::load_env_files(folder);
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ServeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(ENV_HOST) {
            config.host = host
                .parse()
                .map_err(|e: std::net::AddrParseError| ServeError::config(ENV_HOST, e.to_string()))?;
        }
        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .parse()
                .map_err(|e: std::num::ParseIntError| ServeError::config(ENV_PORT, e.to_string()))?;
        }
        match lookup(ENV_CSRF_SECRET).filter(|secret| !secret.is_empty()) {
            Some(secret) => config.csrf_secret = secret,
            None => warn!(
                "{} is not set; using a random CSRF secret, tokens will not survive a restart",
                ENV_CSRF_SECRET
            ),
        }
        if let Some(param) = lookup(ENV_CSRF_PARAM).filter(|param| !param.is_empty()) {
            config.csrf_param = param;
        }
        if let Some(max_age) = lookup(ENV_SESSION_MAX_AGE) {
            let secs: u64 = max_age.parse().map_err(|e: std::num::ParseIntError| {
                ServeError::config(ENV_SESSION_MAX_AGE, e.to_string())
            })?;
            config.session_max_age = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup(ENV_LOG_REQUESTS) {
            config.log_requests = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ServeError::config(
                        ENV_LOG_REQUESTS,
                        format!("expected a boolean, got '{}'", other),
                    ))
                }
            };
        }

        Ok(config)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl fmt::Debug for ServeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("csrf_secret", &FILTERED_PLACEHOLDER)
            .field("csrf_param", &self.csrf_param)
            .field("session_max_age", &self.session_max_age)
            .field("log_requests", &self.log_requests)
            .finish()
    }
}
