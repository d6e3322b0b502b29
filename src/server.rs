//! MCP server over the tool catalog
//!
//! Implements `ServerHandler` by hand: `list_tools` walks the catalog in
//! registration order and `call_tool` routes by name to the bound handler.
//! The same server value is served over stdio or rmcp's streamable HTTP
//! service.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
};
use rmcp::service::RequestContext;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::catalog::{ToolCatalog, ToolEntry};
use crate::config::{Secrets, ServerConfig};
use crate::connection::ConnectionRegistry;
use crate::dispatch::DispatchContext;
use crate::errors::{AppError, AppResult};
use crate::{gmail, smoke};

/// Path the streamable HTTP service is mounted under
pub const MCP_PATH: &str = "/mcp";

/// Gmail MCP server
///
/// Holds the frozen catalog and the dispatch context handed to every tool.
#[derive(Debug, Clone)]
pub struct GmailMcpServer {
    catalog: Arc<ToolCatalog>,
    ctx: DispatchContext,
    write_enabled: bool,
}

impl GmailMcpServer {
    pub fn new(catalog: ToolCatalog, ctx: DispatchContext, write_enabled: bool) -> Self {
        Self {
            catalog: Arc::new(catalog),
            ctx,
            write_enabled,
        }
    }

    /// Catalog entries as MCP tool descriptors
    fn tools(&self) -> Vec<Tool> {
        self.catalog.iter().map(tool_descriptor).collect()
    }

    /// Run one tool and wrap its text payload
    async fn run_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        let args = Value::Object(arguments.unwrap_or_default());
        match self.catalog.call(&self.ctx, name, args).await {
            Ok(text) => {
                info!(
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call completed"
                );
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                Err(e.to_error_data())
            }
        }
    }
}

impl ServerHandler for GmailMcpServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = if self.write_enabled {
            "Gmail MCP server. Requests are authenticated with GMAIL_ACCESS_TOKEN; set \
             GMAIL_MCP_WRITE_ENABLED=false to expose read-only tools only."
        } else {
            "Gmail MCP server in read-only mode. Mutating tools are hidden because \
             GMAIL_MCP_WRITE_ENABLED=false."
        };
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(instructions)
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(self.tools())))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move { self.run_tool(&request.name, request.arguments).await }
    }
}

fn tool_descriptor(entry: &ToolEntry) -> Tool {
    let meta = entry.meta();
    let read_only = meta.annotations.read_only;

    let mut annotations = ToolAnnotations::default();
    annotations.read_only_hint = Some(read_only);
    annotations.destructive_hint = Some(!read_only);

    let mut tool = Tool::new(
        meta.name.clone(),
        meta.description.clone(),
        entry.input_schema(),
    );
    tool.annotations = Some(annotations);
    tool
}

/// Register every tool, hiding mutating ones when writes are disabled
///
/// # Errors
///
/// Returns `InvalidInput` if two tools share a name.
pub fn build_catalog(config: &ServerConfig) -> AppResult<ToolCatalog> {
    let mut catalog = ToolCatalog::new();
    smoke::register(&mut catalog)?;
    gmail::register(&mut catalog)?;
    if !config.write_enabled {
        catalog.retain(|meta| meta.annotations.read_only);
    }
    Ok(catalog)
}

/// Register connections, snapshot their secrets, and build the HTTP client
///
/// Missing secrets are logged here and reported again on every call that
/// needs them.
///
/// # Errors
///
/// Returns `InvalidInput` for a malformed base URL and `Internal` if the HTTP
/// client cannot be built.
pub fn build_context(config: &ServerConfig) -> AppResult<DispatchContext> {
    let mut registry = ConnectionRegistry::new();
    registry.register(gmail::connection(&config.gmail_base_url)?);
    for connection in registry.iter() {
        debug!(
            connection = %connection.name(),
            base_url = %connection.base_url(),
            "registered connection"
        );
    }
    info!(connections = registry.len(), "connection registry ready");
    let secrets = Secrets::load_from_env(&registry);

    let ctx = DispatchContext::new(registry, secrets, config)?;
    for (connection, key) in ctx.missing_secrets() {
        warn!(%connection, key, "secret is not set; calls through this connection will fail");
    }
    Ok(ctx)
}

/// Serve MCP over stdio until the client disconnects
pub async fn serve_stdio(server: GmailMcpServer) -> AppResult<()> {
    info!("serving MCP over stdio");
    let service = server
        .serve(stdio())
        .await
        .map_err(|e| AppError::Internal(format!("failed to start stdio transport: {e}")))?;
    service
        .waiting()
        .await
        .map_err(|e| AppError::Internal(format!("stdio transport ended abnormally: {e}")))?;
    Ok(())
}

/// Serve stateless streamable HTTP under [`MCP_PATH`] until Ctrl-C
pub async fn serve_http(server: GmailMcpServer, bind: SocketAddr) -> AppResult<()> {
    let mut http_config = StreamableHttpServerConfig::default();
    http_config.stateful_mode = false;

    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        http_config,
    );
    let router = axum::Router::new().nest_service(MCP_PATH, service);

    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| AppError::Internal(format!("failed to bind {bind}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| AppError::Internal(format!("failed to read bound address: {e}")))?;
    info!(addr = %local, path = MCP_PATH, "serving MCP over streamable HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Internal(format!("HTTP server error: {e}")))?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
    }
}
