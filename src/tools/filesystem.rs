//! Filesystem tools: read, write, list.
//!
//! All paths go through the sandbox resolver. Reads and listings are
//! cacheable; writes are not and report what they touched.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AgentError, Result};

use super::{require_str, Tool, ToolContext, ToolResult};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file inside the working directory and return its contents."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the session root"
                }
            },
            "required": ["path"]
        })
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn path_params(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let raw = require_str(&args, "path", "read_file")?;
        let path = ctx.resolve(raw)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(ToolResult::ok(contents)),
            Err(e) => Ok(ToolResult::fail(format!("read_file: {}: {}", raw, e))),
        }
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file inside the working directory, creating parent \
         directories as needed. Overwrites existing files."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the session root"
                },
                "content": {
                    "type": "string",
                    "description": "Full file contents to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn path_params(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let raw = require_str(&args, "path", "write_file")?;
        let content = require_str(&args, "content", "write_file")?;
        let path = ctx.resolve(raw)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(AgentError::Io)?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(AgentError::Io)?;

        debug!(path = %path.display(), bytes = content.len(), "Wrote file");
        let mut result = ToolResult::ok(format!("Wrote {} bytes to {}", content.len(), raw));
        result.metadata.files_modified = vec![raw.to_string()];
        Ok(result)
    }
}

pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory inside the working directory. \
         Directories carry a trailing slash."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the session root; defaults to the root"
                }
            },
            "required": []
        })
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn path_params(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let raw = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let path = ctx.resolve(raw)?;

        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(reader) => reader,
            Err(e) => return Ok(ToolResult::fail(format!("list_dir: {}: {}", raw, e))),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(AgentError::Io)? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map_err(AgentError::Io)?.is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        let output = if entries.is_empty() {
            "(empty)".to_string()
        } else {
            entries.join("\n")
        };
        Ok(ToolResult::ok_with_payload(output, json!(entries)))
    }
}
