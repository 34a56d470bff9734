//! The `python` tool exposed to a conversation.
//!
//! Takes code plus an optional channel tag, runs it on the configured backend,
//! and answers with exactly one text message.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{BackendKind, ExecutionBackend, ExecutionOutcome};

const TOOL_NAME: &str = "python";

/// Recipient of every tool response.
const RECIPIENT: &str = "assistant";

const INSTRUCTION: &str = "\
Use this tool to execute Python code in your chain of thought. The code will not be shown to the user.
When you send a message containing Python code to python, it runs in a fresh, stateless container and whatever the script prints to stdout is returned to you. Use print statements to see results.
If the result is a graph, histogram or table, save it as a PNG file in /tmp (for example /tmp/plot_result.png) and its location on the host will be reported back.";

/// Name and model-facing description of the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ToolDescription {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Author {
    pub role: Role,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Content {
    Text { text: String },
}

/// The single response message produced per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ToolMessage {
    pub author: Author,
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub content: Vec<Content>,
}

impl ToolMessage {
    fn new(text: String, channel: Option<&str>) -> Self {
        Self {
            author: Author {
                role: Role::Tool,
                name: TOOL_NAME.to_string(),
            },
            recipient: RECIPIENT.to_string(),
            channel: channel.filter(|c| !c.is_empty()).map(str::to_string),
            content: vec![Content::Text { text }],
        }
    }

    /// Concatenated text of all content parts.
    pub(crate) fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                Content::Text { text } => text.as_str(),
            })
            .collect()
    }
}

/// Description of the tool, available without building a backend.
pub(crate) fn description() -> ToolDescription {
    ToolDescription {
        name: TOOL_NAME.to_string(),
        description: INSTRUCTION.to_string(),
    }
}

/// Python execution tool bound to one backend for its whole life.
pub(crate) struct PythonTool {
    backend: Box<dyn ExecutionBackend>,
}

impl PythonTool {
    pub(crate) fn new(backend: Box<dyn ExecutionBackend>) -> Self {
        Self { backend }
    }

    pub(crate) fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Runs `code` and packages the result as one message.
    ///
    /// Backend failures become the message text; this never fails.
    pub(crate) async fn process(&self, code: &str, channel: Option<&str>) -> ToolMessage {
        debug!(backend = %self.backend.kind(), "Processing {} bytes of code", code.len());
        let text = match self.backend.execute(code).await {
            Ok(outcome) => render_outcome(&outcome),
            Err(e) => {
                warn!("Execution failed: {}", e);
                format!("Error: {e}")
            }
        };
        ToolMessage::new(text, channel)
    }
}

/// Stdout followed by a note for each extracted artifact.
fn render_outcome(outcome: &ExecutionOutcome) -> String {
    let mut text = outcome.stdout.clone();
    for artifact in &outcome.artifacts {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!(
            "the file is saved at {}",
            artifact.local_path.display()
        ));
    }
    text
}
