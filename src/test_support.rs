//! Shared fixtures for tests that need a live upstream

use axum::Router;
use tokio::net::TcpListener;

use crate::config::Secrets;
use crate::connection::{Connection, ConnectionRegistry, SecretKeys};
use crate::dispatch::DispatchContext;

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub upstream");
    let addr = listener.local_addr().expect("stub upstream address");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("stub upstream serves");
    });
    format!("http://{addr}")
}

/// Base URL of a local port with nothing listening on it
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    format!("http://{addr}")
}

/// Context with a single `mailbox` connection reading `MAILBOX_TOKEN`
pub fn mailbox_context(base_url: &str, token: Option<&str>) -> DispatchContext {
    let mut registry = ConnectionRegistry::new();
    registry.register(
        Connection::new(
            "mailbox",
            SecretKeys::token("MAILBOX_TOKEN"),
            base_url,
            "Bearer {api_key}",
        )
        .expect("valid connection"),
    );
    let secrets = match token {
        Some(token) => Secrets::new().with("MAILBOX_TOKEN", token),
        None => Secrets::new(),
    };
    DispatchContext::with_client(registry, secrets, reqwest::Client::new())
}

/// Context with the real `gmail` connection pointed at `base_url`
pub fn gmail_context(base_url: &str) -> DispatchContext {
    let mut registry = ConnectionRegistry::new();
    registry.register(crate::gmail::connection(base_url).expect("valid gmail connection"));
    let secrets = Secrets::new().with(crate::gmail::TOKEN_ENV, "tok");
    DispatchContext::with_client(registry, secrets, reqwest::Client::new())
}
