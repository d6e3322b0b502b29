//! In-process tool runner for terminal use
//!
//! Runs one catalog tool with the OAuth retry wrapper around it, so an
//! expired token turns into a single browser round-trip instead of an error.

use std::fmt::Write as _;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::ToolCatalog;
use crate::dispatch::DispatchContext;
use crate::errors::{AppError, AppResult};
use crate::oauth::{Operator, run_with_retry_until};

/// Run `name` with `args`, re-authorizing once on a recoverable 401
///
/// # Errors
///
/// - `UnknownTool` if `name` is not in the catalog
/// - `InvalidInput` if `args` do not fit the tool's input
/// - `Authentication` if the upstream still rejects the token
/// - `Cancelled` if `cancel` fires first
pub async fn call_tool<O: Operator>(
    catalog: &ToolCatalog,
    ctx: &DispatchContext,
    name: &str,
    args: Value,
    operator: &O,
    cancel: &CancellationToken,
) -> AppResult<String> {
    if catalog.get(name).is_none() {
        return Err(AppError::UnknownTool(name.to_owned()));
    }

    let run = run_with_retry_until(
        || {
            let args = args.clone();
            async move {
                debug!(tool = name, "attempting tool call");
                catalog.invoke(ctx, name, args).await?.into_authorized()
            }
        },
        operator,
        cancel,
    );

    let output = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return Err(AppError::Cancelled(format!("call to '{name}' was interrupted")));
        }
        output = run => output?,
    };
    Ok(output.render())
}

/// Parse `--args`, defaulting to an empty object
pub fn parse_args(raw: Option<&str>) -> AppResult<Value> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Value::Object(serde_json::Map::new()));
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(AppError::invalid("--args must be a JSON object")),
        Err(e) => Err(AppError::InvalidInput(format!("--args is not valid JSON: {e}"))),
    }
}

/// One line per tool: name, access, tags, description
pub fn render_tool_list(catalog: &ToolCatalog) -> String {
    let width = catalog
        .iter()
        .map(|e| e.meta().name.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for entry in catalog.iter() {
        let meta = entry.meta();
        let access = if meta.annotations.read_only { "ro" } else { "rw" };
        let tags = meta.tags.iter().cloned().collect::<Vec<_>>().join(",");
        let _ = writeln!(
            out,
            "{:<width$}  {access}  [{tags}]  {}",
            meta.name, meta.description
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::{call_tool, parse_args, render_tool_list};
    use crate::catalog::ToolCatalog;
    use crate::errors::{AppError, AppResult};
    use crate::oauth::Operator;
    use crate::test_support::{gmail_context, spawn_upstream};
    use crate::{gmail, smoke};

    #[derive(Default)]
    struct RecordingOperator {
        urls: Mutex<Vec<String>>,
    }

    impl Operator for RecordingOperator {
        async fn reauthorize(&self, connect_url: &str) -> AppResult<()> {
            self.urls
                .lock()
                .expect("urls lock")
                .push(connect_url.to_owned());
            Ok(())
        }
    }

    fn catalog() -> ToolCatalog {
        let mut catalog = ToolCatalog::new();
        smoke::register(&mut catalog).expect("smoke");
        gmail::register(&mut catalog).expect("gmail");
        catalog
    }

    /// Upstream answering 401 with a connect URL `failures` times, then 200
    async fn flaky_profile(failures: usize) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/gmail/v1/users/me/profile",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({
                                "error": "token expired",
                                "connect_url": "https://auth.example.com/connect"
                            })),
                        )
                    } else {
                        (StatusCode::OK, Json(json!({ "emailAddress": "me@example.com" })))
                    }
                }
            }),
        );
        (spawn_upstream(router).await, hits)
    }

    #[tokio::test]
    async fn recovers_from_one_expired_token() {
        let (base, hits) = flaky_profile(1).await;
        let ctx = gmail_context(&base);
        let operator = RecordingOperator::default();

        let text = call_tool(
            &catalog(),
            &ctx,
            "gmail_get_profile",
            json!({}),
            &operator,
            &CancellationToken::new(),
        )
        .await
        .expect("second attempt succeeds");

        assert!(text.contains("me@example.com"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(
            *operator.urls.lock().expect("urls lock"),
            vec!["https://auth.example.com/connect".to_owned()]
        );
    }

    #[tokio::test]
    async fn persistent_401_surfaces_authentication_error() {
        let (base, hits) = flaky_profile(usize::MAX).await;
        let ctx = gmail_context(&base);

        let err = call_tool(
            &catalog(),
            &ctx,
            "gmail_get_profile",
            json!({}),
            &RecordingOperator::default(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("must fail");

        assert!(matches!(err, AppError::Authentication(ref e) if e.message == "token expired"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_calls_upstream() {
        let (base, hits) = flaky_profile(0).await;
        let ctx = gmail_context(&base);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = call_tool(
            &catalog(),
            &ctx,
            "gmail_get_profile",
            json!({}),
            &RecordingOperator::default(),
            &cancel,
        )
        .await
        .expect_err("must fail");

        assert!(matches!(err, AppError::Cancelled(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_up_front() {
        let ctx = gmail_context("http://127.0.0.1:9");
        let err = call_tool(
            &catalog(),
            &ctx,
            "nope",
            json!({}),
            &RecordingOperator::default(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("must fail");
        assert!(matches!(err, AppError::UnknownTool(_)));
    }

    #[test]
    fn parses_args_as_object_only() {
        assert_eq!(parse_args(None).expect("default"), json!({}));
        assert_eq!(
            parse_args(Some(r#"{"message":"hi"}"#)).expect("object"),
            json!({ "message": "hi" })
        );
        parse_args(Some("[1]")).expect_err("array");
        parse_args(Some("{")).expect_err("malformed");
    }

    #[test]
    fn tool_list_marks_access() {
        let listing = render_tool_list(&catalog());
        let first = listing.lines().next().expect("at least one line");
        assert!(first.starts_with("smoke_echo"));
        assert!(first.contains("  ro  [smoke]  "));
        assert!(listing.lines().any(|l| l.starts_with("gmail_send_message") && l.contains(" rw ")));
        assert_eq!(listing.lines().count(), 23);
    }
}
