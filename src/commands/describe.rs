//! Print the tool's name and model-facing description.

use anyhow::{Context, Result};

use crate::tool::{self, ToolDescription};

/// Prints the tool description as JSON.
pub(crate) fn run() -> Result<()> {
    let json = render(&tool::description())?;
    println!("{json}");
    Ok(())
}

fn render(description: &ToolDescription) -> Result<String> {
    serde_json::to_string_pretty(description).context("Failed to encode tool description")
}
