//! Configuration module for the Gmail connection and server settings
//!
//! All configuration is loaded from environment variables prefixed with
//! `GMAIL_MCP_`. Secret values are read separately into a [`Secrets`]
//! snapshot keyed by the environment variable names that connections declare.

use std::collections::BTreeMap;
use std::env;
use std::env::VarError;
use std::net::SocketAddr;

use secrecy::SecretString;

use crate::connection::ConnectionRegistry;
use crate::errors::{AppError, AppResult};

/// Default upstream for the `gmail` connection
pub const DEFAULT_GMAIL_BASE_URL: &str = "https://gmail.googleapis.com";

/// Server-wide configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL of the Gmail REST API
    pub gmail_base_url: String,
    /// Whole-request timeout for upstream calls in milliseconds
    pub request_timeout_ms: u64,
    /// TCP/TLS connect timeout for upstream calls in milliseconds
    pub connect_timeout_ms: u64,
    /// Whether mutating tools (send, trash, modify, delete) are exposed
    pub write_enabled: bool,
    /// Listen address for the streamable HTTP transport
    pub http_bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            gmail_base_url: DEFAULT_GMAIL_BASE_URL.to_owned(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            write_enabled: true,
            http_bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is set to a malformed value.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// GMAIL_ACCESS_TOKEN=ya29.a0Af...
    /// GMAIL_MCP_BASE_URL=https://gmail.googleapis.com
    /// GMAIL_MCP_REQUEST_TIMEOUT_MS=30000
    /// GMAIL_MCP_WRITE_ENABLED=false
    /// GMAIL_MCP_HTTP_BIND=0.0.0.0:8080
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            gmail_base_url: optional_env("GMAIL_MCP_BASE_URL")?
                .unwrap_or(defaults.gmail_base_url),
            request_timeout_ms: parse_u64_env(
                "GMAIL_MCP_REQUEST_TIMEOUT_MS",
                defaults.request_timeout_ms,
            )?,
            connect_timeout_ms: parse_u64_env(
                "GMAIL_MCP_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout_ms,
            )?,
            write_enabled: parse_bool_env("GMAIL_MCP_WRITE_ENABLED", defaults.write_enabled)?,
            http_bind: parse_socket_addr_env("GMAIL_MCP_HTTP_BIND", defaults.http_bind)?,
        })
    }
}

/// Snapshot of secret values keyed by environment variable name
///
/// Values are stored using `SecretString` to prevent accidental logging.
/// Absent keys are not an error here; dispatch reports them per call.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, SecretString>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every secret key declared by the registered connections
    ///
    /// Empty or non-unicode values are treated as absent.
    pub fn load_from_env(connections: &ConnectionRegistry) -> Self {
        let mut secrets = Self::new();
        for connection in connections.iter() {
            let key = connection.secrets().token.as_str();
            match env::var(key) {
                Ok(v) if !v.trim().is_empty() => secrets.insert(key, v),
                _ => {}
            }
        }
        secrets
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value: String = value.into();
        self.values.insert(key.into(), SecretString::new(value.into()));
    }

    /// Builder-style [`Secrets::insert`]
    #[cfg(test)]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// Read an optional environment variable, treating empty values as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set to an unrecognized value.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match optional_env(key)? {
        Some(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match optional_env(key)? {
        Some(v) => v.parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

/// Parse a socket address environment variable with default fallback
fn parse_socket_addr_env(key: &str, default: SocketAddr) -> AppResult<SocketAddr> {
    match optional_env(key)? {
        Some(v) => v.parse::<SocketAddr>().map_err(|_| {
            AppError::InvalidInput(format!("invalid socket address environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}
