//! Named upstream connections and their registry
//!
//! A [`Connection`] declares where an upstream service lives and how its
//! secret is injected into outbound requests. Connections are registered once
//! at startup into a [`ConnectionRegistry`] and only read afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Url;
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Placeholder substituted with the resolved secret in an auth header template
pub const SECRET_PLACEHOLDER: &str = "{api_key}";

/// Secret key identifiers for a connection
///
/// Each field names the environment variable holding the secret value, not
/// the value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeys {
    /// Environment variable holding the bearer token
    pub token: String,
}

impl SecretKeys {
    pub fn token(env_var: impl Into<String>) -> Self {
        Self {
            token: env_var.into(),
        }
    }
}

/// Static declaration of an upstream service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    name: String,
    secrets: SecretKeys,
    base_url: String,
    auth_header_template: String,
}

impl Connection {
    /// Declare a connection
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the name is empty, the base URL is not an
    /// absolute `http(s)` URL, or the template lacks [`SECRET_PLACEHOLDER`].
    pub fn new(
        name: impl Into<String>,
        secrets: SecretKeys,
        base_url: impl Into<String>,
        auth_header_template: impl Into<String>,
    ) -> AppResult<Self> {
        let name = name.into();
        let base_url = base_url.into();
        let auth_header_template = auth_header_template.into();

        if name.trim().is_empty() {
            return Err(AppError::invalid("connection name must not be empty"));
        }
        let parsed = Url::parse(&base_url).map_err(|e| {
            AppError::InvalidInput(format!(
                "connection '{name}' has invalid base URL '{base_url}': {e}"
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::InvalidInput(format!(
                "connection '{name}' base URL must use http or https"
            )));
        }
        if !auth_header_template.contains(SECRET_PLACEHOLDER) {
            return Err(AppError::InvalidInput(format!(
                "connection '{name}' auth header template must contain {SECRET_PLACEHOLDER}"
            )));
        }

        Ok(Self {
            name,
            secrets,
            base_url,
            auth_header_template,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secrets(&self) -> &SecretKeys {
        &self.secrets
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Render the `Authorization` header value for a resolved secret
    pub fn authorization(&self, secret: &str) -> String {
        self.auth_header_template.replace(SECRET_PLACEHOLDER, secret)
    }

    /// Join the base URL with a request path (which may carry a query string)
    pub fn target(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            base.to_owned()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Name-keyed set of connections
///
/// Written during startup, then shared behind an `Arc` and read without
/// locking.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: BTreeMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any prior entry with the same name
    pub fn register(&mut self, connection: Connection) {
        let name = connection.name().to_owned();
        if self
            .entries
            .insert(name.clone(), Arc::new(connection))
            .is_some()
        {
            debug!(connection = %name, "replaced previously registered connection");
        }
    }

    /// Look up a connection by name
    ///
    /// # Errors
    ///
    /// Returns `UnknownConnection` if no connection has that name.
    pub fn resolve(&self, name: &str) -> AppResult<Arc<Connection>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::UnknownConnection(name.to_owned()))
    }

    /// All registered connections, ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.entries.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{Connection, ConnectionRegistry, SecretKeys};
    use crate::errors::AppError;

    fn mailbox(base_url: &str) -> Connection {
        Connection::new(
            "mailbox",
            SecretKeys::token("MAILBOX_TOKEN"),
            base_url,
            "Bearer {api_key}",
        )
        .expect("valid connection")
    }

    #[test]
    fn resolve_returns_registered_connection_unchanged() {
        let mut registry = ConnectionRegistry::new();
        registry.register(mailbox("https://api.example.com"));

        let resolved = registry.resolve("mailbox").expect("registered");
        assert_eq!(resolved.name(), "mailbox");
        assert_eq!(resolved.base_url(), "https://api.example.com");
        assert_eq!(resolved.secrets(), &SecretKeys::token("MAILBOX_TOKEN"));
        assert_eq!(resolved.authorization("abc"), "Bearer abc");
    }

    #[test]
    fn re_registering_a_name_replaces_the_entry() {
        let mut registry = ConnectionRegistry::new();
        registry.register(mailbox("https://old.example.com"));
        registry.register(mailbox("https://new.example.com"));

        assert_eq!(registry.len(), 1);
        let resolved = registry.resolve("mailbox").expect("registered");
        assert_eq!(resolved.base_url(), "https://new.example.com");
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let registry = ConnectionRegistry::new();
        let err = registry.resolve("nope").expect_err("must fail");
        assert!(matches!(err, AppError::UnknownConnection(name) if name == "nope"));
    }

    #[test]
    fn rejects_template_without_placeholder() {
        let err = Connection::new(
            "mailbox",
            SecretKeys::token("T"),
            "https://api.example.com",
            "Bearer static",
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("{api_key}"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        for bad in ["not a url", "ftp://files.example.com"] {
            Connection::new("mailbox", SecretKeys::token("T"), bad, "Bearer {api_key}")
                .expect_err("must fail");
        }
    }

    #[test]
    fn formats_authorization_and_target() {
        let conn = mailbox("https://api.example.com/");
        assert_eq!(conn.authorization("abc"), "Bearer abc");
        assert_eq!(
            conn.target("/v1/messages?maxResults=10"),
            "https://api.example.com/v1/messages?maxResults=10"
        );
        assert_eq!(conn.target("v1/labels"), "https://api.example.com/v1/labels");
    }
}
