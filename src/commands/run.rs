//! Run one piece of code through the python tool and print the response.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::backend::{self, BackendKind};
use crate::config::Config;
use crate::sandbox::RuntimeHandle;
use crate::tool::{PythonTool, ToolMessage};

/// Where the code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CodeSource {
    Inline(String),
    File(PathBuf),
    Stdin,
}

impl CodeSource {
    /// `--code` wins over a file argument; with neither, read stdin.
    pub(crate) fn from_args(code: Option<String>, file: Option<PathBuf>) -> Self {
        match (code, file) {
            (Some(code), _) => Self::Inline(code),
            (None, Some(path)) if path != Path::new("-") => Self::File(path),
            (None, _) => Self::Stdin,
        }
    }

    fn read(self) -> Result<String> {
        match self {
            Self::Inline(code) => Ok(code),
            Self::File(path) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display())),
            Self::Stdin => {
                let mut code = String::new();
                std::io::stdin()
                    .read_to_string(&mut code)
                    .context("Failed to read code from stdin")?;
                Ok(code)
            }
        }
    }
}

/// Options for the run command.
#[derive(Debug, Clone)]
pub(crate) struct RunOptions {
    pub source: CodeSource,
    pub channel: Option<String>,
    pub backend: Option<BackendKind>,
    pub json: bool,
}

/// Runs the command.
pub(crate) async fn run(options: RunOptions, mut config: Config) -> Result<()> {
    if let Some(kind) = options.backend {
        config.execution.backend = kind;
    }

    let code = options.source.read()?;
    if code.trim().is_empty() {
        anyhow::bail!("No code to run");
    }

    let handle = Arc::new(RuntimeHandle::docker());
    let tool = PythonTool::new(backend::from_config(&config, handle)?);
    info!(backend = %tool.backend_kind(), "Running code");

    let message = tool.process(&code, options.channel.as_deref()).await;
    print!("{}", render(&message, options.json)?);

    Ok(())
}

fn render(message: &ToolMessage, json: bool) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(message).context("Failed to encode message")?;
        out.push('\n');
        return Ok(out);
    }

    let mut text = message.text();
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}
