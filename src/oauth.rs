//! Single-shot OAuth recovery around a unit of work
//!
//! [`run_with_retry`] runs an operation once. When it fails with an
//! [`AuthenticationError`] that names a re-authorization URL, a human
//! [`Operator`] is asked to complete the flow and the operation runs exactly
//! one more time. Every other outcome, including a second authentication
//! failure, is returned as-is.

use std::future::Future;
use std::io::Write;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult, AuthenticationError};

/// Human in the loop for re-authorization
///
/// Implementations present the URL and resolve once the operator says the
/// external step is done. Dropping the returned future abandons the wait.
pub trait Operator: Send + Sync {
    fn reauthorize(&self, connect_url: &str) -> impl Future<Output = AppResult<()>> + Send;
}

/// Run `work`, recovering once from a recoverable authentication failure
///
/// # Errors
///
/// - The error from `work` if it is not an authentication error
/// - The original `Authentication` error if it carries no `connect_url`
/// - Any error from the operator step (the retry does not happen)
/// - Whatever the second attempt returns
pub async fn run_with_retry<T, F, Fut, O>(mut work: F, operator: &O) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    O: Operator,
{
    let connect_url = match work().await {
        Err(AppError::Authentication(err)) => match recoverable_url(&err) {
            Some(url) => url,
            None => return Err(AppError::Authentication(err)),
        },
        other => return other,
    };

    info!(%connect_url, "re-authorization required; waiting for operator");
    operator.reauthorize(&connect_url).await?;
    info!("operator confirmed re-authorization; retrying once");
    work().await
}

/// [`run_with_retry`], abandoning the operator wait when `cancel` fires
///
/// # Errors
///
/// Returns `Cancelled` if the token fires while the operator step is pending;
/// the unit of work is then not invoked again.
pub async fn run_with_retry_until<T, F, Fut, O>(
    work: F,
    operator: &O,
    cancel: &CancellationToken,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    O: Operator,
{
    let guarded = CancellableOperator {
        inner: operator,
        cancel,
    };
    run_with_retry(work, &guarded).await
}

fn recoverable_url(err: &AuthenticationError) -> Option<String> {
    err.connect_url().map(str::to_owned)
}

struct CancellableOperator<'a, O> {
    inner: &'a O,
    cancel: &'a CancellationToken,
}

impl<O: Operator> Operator for CancellableOperator<'_, O> {
    async fn reauthorize(&self, connect_url: &str) -> AppResult<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AppError::Cancelled(
                "re-authorization was cancelled before the operator confirmed".to_owned(),
            )),
            result = self.inner.reauthorize(connect_url) => result,
        }
    }
}

/// Terminal-driven operator
///
/// Prints the URL to stderr, optionally opens it in the system browser, and
/// waits for Enter on stdin. The URL is always printed before any browser is
/// launched and the opener is never awaited.
#[derive(Debug, Clone)]
pub struct TerminalOperator {
    open_browser: bool,
    opener: Option<BrowserCommand>,
}

impl TerminalOperator {
    pub fn new(open_browser: bool) -> Self {
        Self {
            open_browser,
            opener: None,
        }
    }

    /// Launch `program args.. <url>` instead of `$BROWSER` or the platform opener
    #[cfg(test)]
    fn with_opener(mut self, program: &str, args: &[&str]) -> Self {
        self.opener = Some(BrowserCommand {
            program: program.to_owned(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
        });
        self
    }

    /// Write the prompt to `out`, start the browser, then wait for a line on `input`
    async fn prompt<W, R>(&self, connect_url: &str, out: &mut W, input: &mut R) -> AppResult<()>
    where
        W: Write + Send,
        R: AsyncBufRead + Unpin + Send,
    {
        let write_err = |e: std::io::Error| AppError::Internal(format!("failed to write prompt: {e}"));
        writeln!(out, "\nOAuth required. Complete authorization at:\n  {connect_url}")
            .map_err(write_err)?;
        out.flush().map_err(write_err)?;

        if self.open_browser {
            let opener = self.opener.clone().unwrap_or_else(BrowserCommand::from_env);
            match opener.spawn(connect_url) {
                Ok(()) => writeln!(out, "Opened {} for you.", opener.program).map_err(write_err)?,
                Err(e) => warn!(program = %opener.program, error = %e, "could not open a browser"),
            }
        }
        write!(out, "Press Enter after completing OAuth...").map_err(write_err)?;
        out.flush().map_err(write_err)?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .await
            .map_err(|e| AppError::Internal(format!("failed to read operator input: {e}")))?;
        if read == 0 {
            return Err(AppError::Cancelled(
                "operator input closed before re-authorization was confirmed".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for TerminalOperator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Operator for TerminalOperator {
    async fn reauthorize(&self, connect_url: &str) -> AppResult<()> {
        let mut stderr = std::io::stderr();
        let mut stdin = BufReader::new(tokio::io::stdin());
        self.prompt(connect_url, &mut stderr, &mut stdin).await
    }
}

/// Program (plus leading args) that receives the URL as its last argument
#[derive(Debug, Clone)]
struct BrowserCommand {
    program: String,
    args: Vec<String>,
}

impl BrowserCommand {
    /// `$BROWSER` if set, else the platform's default opener
    fn from_env() -> Self {
        match std::env::var("BROWSER") {
            Ok(browser) if !browser.trim().is_empty() => Self {
                program: browser.trim().to_owned(),
                args: Vec::new(),
            },
            _ => platform_opener(),
        }
    }

    /// Start the opener detached from the terminal; its exit is only logged
    fn spawn(&self, url: &str) -> std::io::Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(%program, "browser opener exited"),
                Ok(status) => warn!(%program, %status, "browser opener exited with failure"),
                Err(e) => warn!(%program, error = %e, "failed to wait for browser opener"),
            }
        });
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn platform_opener() -> BrowserCommand {
    BrowserCommand {
        program: "open".to_owned(),
        args: Vec::new(),
    }
}

#[cfg(target_os = "windows")]
fn platform_opener() -> BrowserCommand {
    BrowserCommand {
        program: "cmd".to_owned(),
        args: vec!["/C".to_owned(), "start".to_owned(), String::new()],
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_opener() -> BrowserCommand {
    BrowserCommand {
        program: "xdg-open".to_owned(),
        args: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;

    use super::{Operator, TerminalOperator, run_with_retry, run_with_retry_until};
    use crate::errors::{AppError, AppResult, AuthenticationError};

    /// Operator that confirms immediately and remembers every URL it saw
    #[derive(Default)]
    struct RecordingOperator {
        urls: Mutex<Vec<String>>,
    }

    impl RecordingOperator {
        fn urls(&self) -> Vec<String> {
            self.urls.lock().expect("urls lock").clone()
        }
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

    /// Operator that never confirms
    struct StalledOperator;

    impl Operator for StalledOperator {
        async fn reauthorize(&self, _connect_url: &str) -> AppResult<()> {
            std::future::pending().await
        }
    }

    /// Operator that refuses
    struct RefusingOperator;

    impl Operator for RefusingOperator {
        async fn reauthorize(&self, _connect_url: &str) -> AppResult<()> {
            Err(AppError::Cancelled("operator declined".to_owned()))
        }
    }

    fn auth_error(body: Value) -> AppError {
        AppError::Authentication(AuthenticationError::new("unauthorized", Some(body)))
    }

    #[tokio::test]
    async fn succeeds_first_time_without_prompting() {
        let operator = RecordingOperator::default();
        let calls = AtomicUsize::new(0);

        let value = run_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, AppError>(7) }
            },
            &operator,
        )
        .await
        .expect("succeeds");

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(operator.urls().is_empty());
    }

    #[tokio::test]
    async fn retries_once_after_top_level_connect_url() {
        let operator = RecordingOperator::default();
        let calls = AtomicUsize::new(0);

        let value = run_with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(auth_error(json!({ "connect_url": "https://x" })))
                    } else {
                        Ok("second")
                    }
                }
            },
            &operator,
        )
        .await
        .expect("second attempt succeeds");

        assert_eq!(value, "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(operator.urls(), vec!["https://x".to_owned()]);
    }

    #[tokio::test]
    async fn nested_detail_connect_url_is_used() {
        let operator = RecordingOperator::default();
        let calls = AtomicUsize::new(0);

        run_with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(auth_error(json!({ "detail": { "connect_url": "https://y" } })))
                    } else {
                        Ok(())
                    }
                }
            },
            &operator,
        )
        .await
        .expect("second attempt succeeds");

        assert_eq!(operator.urls(), vec!["https://y".to_owned()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_error_without_url_propagates_unchanged() {
        let operator = RecordingOperator::default();
        let calls = AtomicUsize::new(0);

        let err = run_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(auth_error(json!({ "detail": "token expired" }))) }
            },
            &operator,
        )
        .await
        .expect_err("must fail");

        match err {
            AppError::Authentication(inner) => {
                assert_eq!(inner.message, "unauthorized");
                assert_eq!(inner.body, Some(json!({ "detail": "token expired" })));
            }
            other => panic!("expected authentication error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(operator.urls().is_empty());
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let operator = RecordingOperator::default();
        let calls = AtomicUsize::new(0);

        let err = run_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::Internal("boom".to_owned())) }
            },
            &operator,
        )
        .await
        .expect_err("must fail");

        assert!(matches!(err, AppError::Internal(msg) if msg == "boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(operator.urls().is_empty());
    }

    #[tokio::test]
    async fn second_auth_failure_is_fatal() {
        let operator = RecordingOperator::default();
        let calls = AtomicUsize::new(0);

        let err = run_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(auth_error(json!({ "connect_url": "https://x" }))) }
            },
            &operator,
        )
        .await
        .expect_err("must fail");

        assert!(matches!(err, AppError::Authentication(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(operator.urls().len(), 1);
    }

    #[tokio::test]
    async fn operator_failure_skips_the_retry() {
        let calls = AtomicUsize::new(0);

        let err = run_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(auth_error(json!({ "connect_url": "https://x" }))) }
            },
            &RefusingOperator,
        )
        .await
        .expect_err("must fail");

        assert!(matches!(err, AppError::Cancelled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_during_operator_wait_prevents_retry() {
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let run = run_with_retry_until(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(auth_error(json!({ "connect_url": "https://x" }))) }
            },
            &StalledOperator,
            &cancel,
        );
        let (result, ()) = tokio::join!(run, async move { trigger.cancel() });

        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn prompt_is_shown_while_browser_is_still_running() {
        let operator =
            TerminalOperator::new(true).with_opener("sh", &["-c", "sleep 5", "opener"]);
        let mut out = Vec::new();
        let mut input: &[u8] = b"\n";

        let started = Instant::now();
        operator
            .prompt("https://auth.example.com/connect", &mut out, &mut input)
            .await
            .expect("operator confirms");

        assert!(started.elapsed() < Duration::from_secs(3));
        let text = String::from_utf8(out).expect("utf-8 prompt");
        assert!(text.contains("  https://auth.example.com/connect\n"));
        assert!(text.ends_with("Press Enter after completing OAuth..."));
    }

    #[tokio::test]
    async fn missing_opener_still_prints_the_url() {
        let operator =
            TerminalOperator::new(true).with_opener("gmail-mcp-rs-no-such-browser", &[]);
        let mut out = Vec::new();
        let mut input: &[u8] = b"\n";

        operator
            .prompt("https://x", &mut out, &mut input)
            .await
            .expect("operator confirms");

        let text = String::from_utf8(out).expect("utf-8 prompt");
        assert!(text.contains("https://x"));
        assert!(!text.contains("Opened"));
    }

    #[tokio::test]
    async fn closed_input_cancels_the_prompt() {
        let operator = TerminalOperator::new(false);
        let mut out = Vec::new();
        let mut input: &[u8] = b"";

        let err = operator
            .prompt("https://x", &mut out, &mut input)
            .await
            .expect_err("must fail");

        assert!(matches!(err, AppError::Cancelled(_)));
        assert!(String::from_utf8(out).expect("utf-8 prompt").contains("https://x"));
    }
}
