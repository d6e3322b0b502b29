//! Command-line interface

use std::net::SocketAddr;

use clap::{Parser, Subcommand, ValueEnum};

/// MCP transport to serve on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Newline-delimited JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// Stateless streamable HTTP under /mcp
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "gmail-mcp-rs")]
#[command(author, version, about = "Gmail tools for MCP clients")]
#[command(long_about = r#"
Serves Gmail REST operations as MCP tools. Each call is authenticated with the
access token in GMAIL_ACCESS_TOKEN; handlers never see the token.

With no subcommand the server speaks MCP over stdio, which is how MCP clients
spawn it.

Example:
  gmail-mcp-rs serve --transport http --bind 127.0.0.1:8080
  gmail-mcp-rs tools
  gmail-mcp-rs call gmail_list_messages --args '{"query":"is:unread"}'
"#)]
pub struct Cli {
    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the tool catalog over MCP
    Serve {
        #[arg(short, long, value_enum, default_value = "stdio")]
        transport: Transport,

        /// Listen address for the HTTP transport (overrides GMAIL_MCP_HTTP_BIND)
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },
    /// Print the tool catalog
    Tools {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run one tool in-process, re-authorizing once if the token has expired
    Call {
        /// Tool name, e.g. gmail_list_labels
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, value_name = "JSON")]
        args: Option<String>,

        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
}

impl Cli {
    /// Default tracing directive when `RUST_LOG` is unset
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, Transport};

    #[test]
    fn no_subcommand_means_stdio_serving() {
        let cli = Cli::try_parse_from(["gmail-mcp-rs"]).expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.log_directive(), "warn");
    }

    #[test]
    fn parses_http_serving_with_bind() {
        let cli = Cli::try_parse_from([
            "gmail-mcp-rs",
            "-vv",
            "serve",
            "--transport",
            "http",
            "--bind",
            "0.0.0.0:9000",
        ])
        .expect("parse");
        assert_eq!(cli.log_directive(), "debug");
        match cli.command {
            Some(Command::Serve { transport, bind }) => {
                assert_eq!(transport, Transport::Http);
                assert_eq!(bind, Some("0.0.0.0:9000".parse().expect("addr")));
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn parses_call_with_args() {
        let cli = Cli::try_parse_from([
            "gmail-mcp-rs",
            "call",
            "smoke_echo",
            "--args",
            r#"{"message":"hi"}"#,
            "--no-browser",
        ])
        .expect("parse");
        match cli.command {
            Some(Command::Call {
                tool,
                args,
                no_browser,
            }) => {
                assert_eq!(tool, "smoke_echo");
                assert_eq!(args.as_deref(), Some(r#"{"message":"hi"}"#));
                assert!(no_browser);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_transport() {
        Cli::try_parse_from(["gmail-mcp-rs", "serve", "--transport", "carrier-pigeon"])
            .expect_err("must fail");
    }
}
