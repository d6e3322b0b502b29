//! Authenticated dispatch of request envelopes to named connections
//!
//! [`DispatchContext::dispatch`] resolves a connection, injects its secret into
//! the `Authorization` header, performs exactly one HTTP round-trip, and
//! normalizes the outcome into a [`DispatchResult`]. Transport and upstream
//! failures come back as data; only programming errors (an unknown connection
//! name) are returned as `Err`. Nothing here retries.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{Secrets, ServerConfig};
use crate::connection::ConnectionRegistry;
use crate::errors::{AppError, AppResult};

/// Longest plain-text upstream error body echoed back as a failure message
const MAX_TEXT_ERROR_CHARS: usize = 500;

/// HTTP verbs supported by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// Outbound call description, relative to a connection's base URL
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path (and optional query string) appended to the base URL
    pub path: String,
    /// JSON body, sent only when present
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Failure half of the result envelope
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    /// Upstream-provided error text, or a generic description
    pub message: String,
    /// Upstream HTTP status, absent for transport errors and missing secrets
    pub status: Option<u16>,
    /// Parsed upstream JSON body, when the failure response carried one
    pub body: Option<Value>,
}

/// Normalized outcome of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    Success { status: u16, body: Value },
    Failure(DispatchFailure),
}

impl DispatchResult {
    /// Failure that never reached (or never heard back from) the upstream
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(DispatchFailure {
            message: message.into(),
            status: None,
            body: None,
        })
    }

    /// JSON the calling agent sees: the success body or `{"error": message}`
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success { body, .. } => body.clone(),
            Self::Failure(failure) => json!({ "error": failure.message }),
        }
    }

    /// Pretty-printed form of [`DispatchResult::to_json`]
    pub fn to_pretty_json(&self) -> String {
        let value = self.to_json();
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
    }
}

/// Runtime façade handed to every tool handler
///
/// Cheap to clone; the registry and secrets are shared read-only state built
/// before serving starts.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    connections: Arc<ConnectionRegistry>,
    secrets: Arc<Secrets>,
    http: reqwest::Client,
}

impl DispatchContext {
    /// Build a context with an HTTP client configured from `config`
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be constructed.
    pub fn new(
        connections: ConnectionRegistry,
        secrets: Secrets,
        config: &ServerConfig,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(connections, secrets, http))
    }

    pub fn with_client(
        connections: ConnectionRegistry,
        secrets: Secrets,
        http: reqwest::Client,
    ) -> Self {
        Self {
            connections: Arc::new(connections),
            secrets: Arc::new(secrets),
            http,
        }
    }

    /// Secret keys declared by registered connections but absent at startup
    pub fn missing_secrets(&self) -> Vec<(String, String)> {
        self.connections
            .iter()
            .filter(|c| !self.secrets.contains(&c.secrets().token))
            .map(|c| (c.name().to_owned(), c.secrets().token.clone()))
            .collect()
    }

    /// Send `request` through the named connection
    ///
    /// # Errors
    ///
    /// Returns `UnknownConnection` if `connection_name` was never registered.
    /// Every other outcome, including a missing secret, is an `Ok` result.
    pub async fn dispatch(
        &self,
        connection_name: &str,
        request: HttpRequest,
    ) -> AppResult<DispatchResult> {
        let connection = self.connections.resolve(connection_name)?;
        let key = connection.secrets().token.as_str();
        let Some(secret) = self.secrets.get(key) else {
            warn!(connection = %connection.name(), key, "secret is not configured");
            return Ok(DispatchResult::failure(format!(
                "missing secret {key} for connection '{}'",
                connection.name()
            )));
        };

        let target = connection.target(&request.path);
        debug!(
            connection = %connection.name(),
            method = %request.method,
            path = %request.path,
            "dispatching upstream request"
        );

        let mut builder = self
            .http
            .request(request.method.into(), target.as_str())
            .header(AUTHORIZATION, connection.authorization(secret.expose_secret()))
            .header(ACCEPT, "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(connection = %connection.name(), error = %e, "upstream request failed");
                return Ok(DispatchResult::failure(transport_message(&e)));
            }
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(connection = %connection.name(), error = %e, "failed to read upstream body");
                return Ok(DispatchResult::failure(format!(
                    "failed to read upstream response: {e}"
                )));
            }
        };

        debug!(
            connection = %connection.name(),
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream responded"
        );
        Ok(normalize_response(status, &bytes))
    }
}

/// Describe a transport-level error without leaking request headers
fn transport_message(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("upstream request timed out: {err}")
    } else if err.is_connect() {
        format!("could not connect to upstream: {err}")
    } else {
        format!("upstream request failed: {err}")
    }
}

/// Map an upstream status and raw body onto the result envelope
fn normalize_response(status: StatusCode, bytes: &[u8]) -> DispatchResult {
    let code = status.as_u16();
    let is_empty = bytes.iter().all(u8::is_ascii_whitespace);
    let parsed = if is_empty {
        None
    } else {
        Some(serde_json::from_slice::<Value>(bytes))
    };

    if status.is_success() {
        return match parsed {
            None => DispatchResult::Success {
                status: code,
                body: json!({}),
            },
            Some(Ok(body)) => DispatchResult::Success { status: code, body },
            Some(Err(e)) => DispatchResult::Failure(DispatchFailure {
                message: format!("malformed upstream response: {e}"),
                status: Some(code),
                body: None,
            }),
        };
    }

    let body = parsed.and_then(Result::ok);
    let message = match &body {
        Some(body) => upstream_error_message(body),
        None => text_error_message(bytes),
    }
    .unwrap_or_else(|| format!("request failed with status {code}"));
    DispatchResult::Failure(DispatchFailure {
        message,
        status: Some(code),
        body,
    })
}

/// Pull an error message out of common JSON error shapes
///
/// Checks `error` (string), `error.message`, `message`, then `detail`.
fn upstream_error_message(body: &Value) -> Option<String> {
    match body.get("error") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Object(obj)) => {
            if let Some(Value::String(s)) = obj.get("message") {
                return Some(s.clone());
            }
        }
        _ => {}
    }
    ["message", "detail"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str).map(str::to_owned))
}

fn text_error_message(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() || text.starts_with('<') {
        return None;
    }
    Some(text.chars().take(MAX_TEXT_ERROR_CHARS).collect())
}
