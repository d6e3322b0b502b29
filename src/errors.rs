//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the appropriate MCP `ErrorData` type for protocol
//! compliance. Ordinary upstream failures are not errors here: they travel as
//! [`crate::dispatch::DispatchResult::Failure`] data.

use rmcp::model::ErrorData;
use serde_json::{Value, json};
use thiserror::Error;

/// Upstream rejected the request's credentials
///
/// Carries the parsed upstream body, which may name a re-authorization URL
/// either at the top level (`connect_url`) or one level down under `detail`.
#[derive(Debug, Clone, Error)]
#[error("authentication failed: {message}")]
pub struct AuthenticationError {
    /// Human-readable failure text
    pub message: String,
    /// Parsed upstream payload, if the response carried JSON
    pub body: Option<Value>,
}

impl AuthenticationError {
    pub fn new(message: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            message: message.into(),
            body,
        }
    }

    /// Re-authorization URL, checking `connect_url` then `detail.connect_url`
    pub fn connect_url(&self) -> Option<&str> {
        fn usable(value: Option<&Value>) -> Option<&str> {
            value
                .and_then(Value::as_str)
                .filter(|url| !url.trim().is_empty())
        }

        let body = self.body.as_ref()?;
        usable(body.get("connect_url"))
            .or_else(|| usable(body.get("detail").and_then(|detail| detail.get("connect_url"))))
    }
}

/// Application error type
///
/// Each variant maps to an appropriate MCP error code in [`ErrorData`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed arguments)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A request named a connection that was never registered
    #[error("unknown connection: {0}")]
    UnknownConnection(String),
    /// A call named a tool that is not in the catalog
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Upstream authentication failure
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    /// Operation abandoned before completion
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convert to MCP `ErrorData`
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `UnknownConnection` → `internal_error`
    /// - `UnknownTool` → `invalid_params`
    /// - `Authentication` → `invalid_request` (with `connect_url` when known)
    /// - `Cancelled` → `internal_error`
    /// - `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        let msg = self.to_string();
        match self {
            Self::InvalidInput(_) => {
                ErrorData::invalid_params(msg, Some(json!({ "code": "invalid_input" })))
            }
            Self::UnknownConnection(_) => {
                ErrorData::internal_error(msg, Some(json!({ "code": "unknown_connection" })))
            }
            Self::UnknownTool(_) => {
                ErrorData::invalid_params(msg, Some(json!({ "code": "unknown_tool" })))
            }
            Self::Authentication(err) => ErrorData::invalid_request(
                msg,
                Some(json!({ "code": "auth_required", "connect_url": err.connect_url() })),
            ),
            Self::Cancelled(_) => {
                ErrorData::internal_error(msg, Some(json!({ "code": "cancelled" })))
            }
            Self::Internal(_) => {
                ErrorData::internal_error(msg, Some(json!({ "code": "internal" })))
            }
        }
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AppError, AuthenticationError};

    #[test]
    fn connect_url_prefers_top_level_field() {
        let err = AuthenticationError::new(
            "expired",
            Some(json!({
                "connect_url": "https://top",
                "detail": { "connect_url": "https://nested" }
            })),
        );
        assert_eq!(err.connect_url(), Some("https://top"));
    }

    #[test]
    fn connect_url_falls_back_to_detail() {
        let err = AuthenticationError::new(
            "expired",
            Some(json!({ "detail": { "connect_url": "https://y" } })),
        );
        assert_eq!(err.connect_url(), Some("https://y"));

        for top in [json!(""), json!("   "), json!(null), json!(7)] {
            let err = AuthenticationError::new(
                "expired",
                Some(json!({ "connect_url": top, "detail": { "connect_url": "https://y" } })),
            );
            assert_eq!(err.connect_url(), Some("https://y"));
        }
    }

    #[test]
    fn connect_url_absent_for_unrelated_bodies() {
        for body in [
            None,
            Some(json!("plain string")),
            Some(json!({ "detail": "token expired" })),
            Some(json!({ "connect_url": 42 })),
            Some(json!({ "connect_url": "  " })),
        ] {
            assert_eq!(AuthenticationError::new("expired", body).connect_url(), None);
        }
    }

    #[test]
    fn auth_error_data_carries_connect_url() {
        let err = AppError::from(AuthenticationError::new(
            "expired",
            Some(json!({ "connect_url": "https://x" })),
        ));
        let data = err.to_error_data();
        let extra = data.data.expect("error data payload");
        assert_eq!(extra["code"], "auth_required");
        assert_eq!(extra["connect_url"], "https://x");
    }
}
