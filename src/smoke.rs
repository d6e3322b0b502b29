//! Liveness tools that never touch the network

use crate::catalog::{ToolCatalog, ToolMeta, ToolOutput};
use crate::dispatch::DispatchContext;
use crate::errors::AppResult;
use crate::models::{EchoInput, NoInput};

pub fn register(catalog: &mut ToolCatalog) -> AppResult<()> {
    catalog.register_tool(
        ToolMeta::new("smoke_echo", "Smoke test tool that echoes input")
            .tags(&["smoke"])
            .read_only(true),
        echo,
    )?;
    catalog.register_tool(
        ToolMeta::new("smoke_info", "Smoke test tool that returns server info")
            .tags(&["smoke"])
            .read_only(true),
        info,
    )?;
    Ok(())
}

async fn echo(_ctx: DispatchContext, input: EchoInput) -> AppResult<ToolOutput> {
    Ok(ToolOutput::Text(format!("Echo: {}", input.message)))
}

async fn info(_ctx: DispatchContext, _input: NoInput) -> AppResult<ToolOutput> {
    Ok(ToolOutput::Text(info_line()))
}

/// One-line server identity
pub fn info_line() -> String {
    format!(
        "{} server v{} - Gmail MCP tools over authenticated dispatch",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}
