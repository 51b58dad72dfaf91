//! Tool registry and execution engine.
//!
//! Defines the [`Tool`] trait all tools implement, the [`ToolResult`]
//! shape dispatch always returns, and the concrete tools the agent ships
//! with. Dispatch itself lives in [`registry`].

pub mod path;

mod filesystem;
mod registry;
mod shell;

pub use filesystem::{ListDirTool, ReadFileTool, WriteFileTool};
pub use registry::{ToolRegistry, ToolStats};
pub use shell::ShellTool;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AgentError, Result};

/// Name of the sanctioned completion tool. The loop intercepts it.
pub const DONE_TOOL_NAME: &str = "done";

/// What the gateway advertises to the model for one tool.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object.
    pub parameters: Value,
}

/// Execution details attached to every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolMetadata {
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub files_modified: Vec<String>,
    pub cache_hit: bool,
    pub truncated: bool,
}

/// The outcome of one tool dispatch. Failures are data, not process
/// errors: the model sees the output either way and decides what to do.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    /// Text fed back to the model.
    pub output: String,
    /// Optional structured companion to `output`.
    pub payload: Option<Value>,
    pub metadata: ToolMetadata,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            payload: None,
            metadata: ToolMetadata::default(),
        }
    }

    pub fn ok_with_payload(output: impl Into<String>, payload: Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            payload: Some(payload),
            metadata: ToolMetadata::default(),
        }
    }

    pub fn fail(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            payload: None,
            metadata: ToolMetadata::default(),
        }
    }
}

/// Per-session execution context handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The sandbox root. Every path argument must resolve inside it.
    pub workdir: PathBuf,
}

impl ToolContext {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Resolve a path argument inside the sandbox.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        path::resolve_in_workdir(raw, &self.workdir)
    }
}

/// Trait that all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model calls this tool by.
    fn name(&self) -> &str;

    /// Sent to the model so it knows when to use the tool.
    fn description(&self) -> &str;

    /// JSON schema for the arguments object.
    fn parameters(&self) -> Value;

    /// Whether identical calls may be served from the result cache.
    /// Tools that mutate anything must leave this `false`.
    fn cacheable(&self) -> bool {
        false
    }

    /// Argument keys that hold filesystem paths. The registry refuses the
    /// call before execution when any of them escapes the sandbox.
    fn path_params(&self) -> &'static [&'static str] {
        &[]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

/// Pull a required string argument out of the args object.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str, tool: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::Tool(format!("{}: missing required argument '{}'", tool, key)))
}

/// The sanctioned completion signal. Calling it ends the session; the
/// loop intercepts the call, so `execute` only echoes the summary.
pub struct DoneTool;

#[async_trait]
impl Tool for DoneTool {
    fn name(&self) -> &str {
        DONE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Declare the task complete. Call this exactly once, when the work is finished \
         and verified. Optionally include a short summary of what was done."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "One-paragraph summary of the completed work"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let summary = args
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("Task complete.");
        Ok(ToolResult::ok(summary))
    }
}
