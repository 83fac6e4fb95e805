//! `parley tools`: open a transient session against a bridge and print its
//! tool catalog.

use std::io::Write;

use anyhow::{Context, Result};
use console::style;

use parley_core::chat::{ReleaseHandle, ReleaseTrigger, ToolSession, ToolSessionConnector};
use parley_types::protocol::ToolDefinition;

/// Connect, list, release. The session is released on both paths.
pub async fn list_tools<C: ToolSessionConnector>(connector: &C, json: bool) -> Result<()> {
    let session = connector
        .connect()
        .await
        .context("failed to connect to the tool bridge")?;
    let handle = ReleaseHandle::new(session);

    let tools = match handle.session().list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            handle.release(ReleaseTrigger::SetupFailed).await;
            return Err(e).context("failed to list tools");
        }
    };
    handle.release(ReleaseTrigger::Finished).await;

    let mut out = std::io::stdout().lock();
    write_tools(&mut out, &tools, json)?;
    Ok(())
}

fn write_tools(out: &mut impl Write, tools: &[ToolDefinition], json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(tools)?)?;
        return Ok(());
    }

    if tools.is_empty() {
        writeln!(out, "  {}", style("No tools exposed.").dim())?;
        return Ok(());
    }

    writeln!(out)?;
    for tool in tools {
        writeln!(out, "  {}  {}", style(&tool.name).cyan().bold(), tool.description)?;
        if let Some(required) = tool.input_schema.get("required").and_then(|r| r.as_array()) {
            let fields: Vec<&str> = required.iter().filter_map(|f| f.as_str()).collect();
            if !fields.is_empty() {
                writeln!(out, "  {}", style(format!("  requires: {}", fields.join(", "))).dim())?;
            }
        }
    }
    writeln!(out)?;
    Ok(())
}
