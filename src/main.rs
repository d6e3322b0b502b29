//! gmail-mcp-rs: Gmail tools over MCP with authenticated dispatch
//!
//! Tool handlers describe Gmail REST requests by connection name; a shared
//! dispatch context resolves the connection, injects the access token, and
//! normalizes every upstream outcome into one result envelope.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading, tracing, and CLI dispatch
//! - [`cli`]: `clap` definitions for `serve`, `tools`, and `call`
//! - [`config`]: Environment-driven server settings and secret snapshot
//! - [`errors`]: Application error model with MCP error mapping
//! - [`connection`]: Named upstream connections and their registry
//! - [`dispatch`]: Request/result envelope and the dispatch context
//! - [`oauth`]: Single-shot re-authorization around a unit of work
//! - [`catalog`]: Tool metadata, registration, and invocation
//! - [`gmail`]: Gmail REST tools
//! - [`smoke`]: Liveness tools
//! - [`models`]: Input DTOs and schema-bearing types
//! - [`mime`]: Outgoing message composition
//! - [`server`]: MCP `ServerHandler` and transports
//! - [`driver`]: In-process tool runner with OAuth recovery

mod catalog;
mod cli;
mod config;
mod connection;
mod dispatch;
mod driver;
mod errors;
mod gmail;
mod mime;
mod models;
mod oauth;
mod server;
mod smoke;
#[cfg(test)]
mod test_support;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, Transport};
use config::ServerConfig;
use oauth::TerminalOperator;

/// Application entry point
///
/// Loads `.env`, initializes tracing on stderr, loads config, and runs the
/// selected subcommand. With no subcommand the server speaks MCP over stdio,
/// which is how MCP clients spawn it.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// GMAIL_ACCESS_TOKEN=ya29.a0Af... \
/// cargo run -- serve --transport http
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load_from_env()?;
    let catalog = server::build_catalog(&config)?;
    info!(
        tools = catalog.len(),
        write_enabled = config.write_enabled,
        "tool catalog ready"
    );

    match cli.command {
        None => {
            let ctx = server::build_context(&config)?;
            let server = server::GmailMcpServer::new(catalog, ctx, config.write_enabled);
            server::serve_stdio(server).await?;
        }
        Some(Command::Serve { transport, bind }) => {
            let ctx = server::build_context(&config)?;
            let server = server::GmailMcpServer::new(catalog, ctx, config.write_enabled);
            match transport {
                Transport::Stdio => server::serve_stdio(server).await?,
                Transport::Http => {
                    server::serve_http(server, bind.unwrap_or(config.http_bind)).await?
                }
            }
        }
        Some(Command::Tools { json }) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&catalog.describe())?);
            } else {
                print!("{}", driver::render_tool_list(&catalog));
            }
        }
        Some(Command::Call {
            tool,
            args,
            no_browser,
        }) => {
            let ctx = server::build_context(&config)?;
            let args = driver::parse_args(args.as_deref())?;
            let operator = TerminalOperator::new(!no_browser);

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => trigger.cancel(),
                    Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
                }
            });

            let text =
                driver::call_tool(&catalog, &ctx, &tool, args, &operator, &cancel).await?;
            println!("{text}");
        }
    }
    Ok(())
}
