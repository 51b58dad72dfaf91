//! Shell command execution.
//!
//! Runs commands under `sh -lc` in the sandbox with a scrubbed
//! environment. Stdout and stderr are combined in arrival order per
//! stream, a non-zero exit gets an explicit note, and the per-call
//! timeout kills the shell itself. Backgrounded grandchildren are not
//! chased; the pipe drain is bounded so they cannot stall the tool.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{AgentError, Result};

use super::{require_str, Tool, ToolContext, ToolResult};

/// Environment variables passed through to the child. Everything else is
/// cleared so session secrets never leak into subprocesses.
const SAFE_ENV: &[&str] = &[
    "PATH", "HOME", "USER", "LOGNAME", "SHELL", "LANG", "LC_ALL", "TMPDIR",
];

pub struct ShellTool {
    default_timeout_secs: u64,
}

impl ShellTool {
    pub fn new(default_timeout_secs: u64) -> Self {
        Self {
            default_timeout_secs,
        }
    }
}

/// Collects a child pipe in the background so output written before a
/// timeout kill is not lost.
struct PipeDrain {
    buf: Arc<Mutex<Vec<u8>>>,
    task: tokio::task::JoinHandle<()>,
}

fn drain<R>(reader: Option<R>) -> PipeDrain
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = buf.clone();
    let task = tokio::spawn(async move {
        let Some(mut reader) = reader else { return };
        use tokio::io::AsyncReadExt;
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    });
    PipeDrain { buf, task }
}

impl PipeDrain {
    /// Wait briefly for the pipe to close, then take whatever arrived.
    /// A backgrounded grandchild can hold the pipe open indefinitely, so
    /// the wait is bounded rather than until EOF.
    async fn finish(mut self) -> Vec<u8> {
        let _ = tokio::time::timeout(Duration::from_millis(200), &mut self.task).await;
        self.task.abort();
        match self.buf.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command inside the working directory. Stdout and stderr are \
         combined. Non-zero exits are reported, not fatal."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to run with `sh -lc`"
                },
                "workdir": {
                    "type": "string",
                    "description": "Directory to run in, relative to the session root"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Seconds before the command is killed"
                }
            },
            "required": ["command"]
        })
    }

    fn path_params(&self) -> &'static [&'static str] {
        &["workdir"]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let command = require_str(&args, "command", "shell")?;
        let cwd = match args.get("workdir").and_then(|v| v.as_str()) {
            Some(raw) => ctx.resolve(raw)?,
            None => ctx.workdir.clone(),
        };
        let timeout_secs = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_timeout_secs);

        debug!(command, cwd = %cwd.display(), timeout_secs, "Running shell command");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-lc")
            .arg(command)
            .current_dir(&cwd)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in SAFE_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        cmd.env("TERM", "dumb");

        let mut child = cmd
            .spawn()
            .map_err(|e| AgentError::Tool(format!("shell: failed to spawn: {}", e)))?;

        // Drain the pipes concurrently so output produced before a timeout
        // survives the kill.
        let stdout_pipe = drain(child.stdout.take());
        let stderr_pipe = drain(child.stderr.take());

        let status = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => return Err(AgentError::Tool(format!("shell: wait failed: {}", e))),
            Err(_) => {
                let _ = child.kill().await;
                None
            }
        };

        let stdout = stdout_pipe.finish().await;
        let stderr = stderr_pipe.finish().await;

        let mut combined = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        let Some(status) = status else {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&format!("(command killed after {}s timeout)", timeout_secs));
            return Ok(ToolResult::fail(combined));
        };

        let exit_code = status.code();
        if !status.success() {
            combined.push_str(&format!(
                "\n[exit code: {}]",
                exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            ));
        }

        let mut result = if status.success() {
            ToolResult::ok(combined)
        } else {
            ToolResult::fail(combined)
        };
        result.metadata.exit_code = exit_code;
        Ok(result)
    }
}
