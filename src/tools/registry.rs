//! Tool dispatch: containment, caching, stats, timeout, output ceiling.
//!
//! `dispatch` never returns a process error. Unknown tools, rejected
//! paths, execution failures and timeouts all come back as failed
//! [`ToolResult`]s so the model can react.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::Config;
use crate::transcript::ToolCall;

use super::{
    DoneTool, ListDirTool, ReadFileTool, ShellTool, Tool, ToolContext, ToolResult, ToolSpec,
    WriteFileTool,
};

/// Repeating the exact same failure this many times draws a warning.
const IDENTICAL_FAILURE_WARN: u32 = 3;

/// Per-tool counters, updated after every dispatch.
#[derive(Debug, Clone, Default)]
pub struct ToolStats {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub total_duration_ms: u64,
    /// Length of the current run of byte-identical failures.
    pub consecutive_identical_failures: u32,
    last_failure: Option<String>,
}

impl ToolStats {
    fn record(&mut self, tool: &str, result: &ToolResult) {
        self.invocations += 1;
        self.total_duration_ms += result.metadata.duration_ms;
        if result.success {
            self.successes += 1;
            self.consecutive_identical_failures = 0;
            self.last_failure = None;
        } else {
            self.failures += 1;
            if self.last_failure.as_deref() == Some(result.output.as_str()) {
                self.consecutive_identical_failures += 1;
            } else {
                self.consecutive_identical_failures = 1;
                self.last_failure = Some(result.output.clone());
            }
            if self.consecutive_identical_failures >= IDENTICAL_FAILURE_WARN {
                warn!(
                    tool,
                    repeats = self.consecutive_identical_failures,
                    "Tool failing repeatedly with identical output"
                );
            }
        }
    }
}

/// Cache key: digest of the tool name and the canonical argument JSON.
/// serde_json orders object keys, so equal arguments hash equally.
fn cache_key(name: &str, arguments: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0]);
    hasher.update(arguments.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Registration table plus the execution engine.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    cache: HashMap<String, ToolResult>,
    stats: HashMap<String, ToolStats>,
    call_timeout: Duration,
    max_output_bytes: usize,
}

impl ToolRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            tools: HashMap::new(),
            cache: HashMap::new(),
            stats: HashMap::new(),
            call_timeout: Duration::from_secs(config.tool_timeout_secs),
            max_output_bytes: config.max_tool_output_bytes,
        }
    }

    /// Registry preloaded with the standard tool set.
    pub fn with_default_tools(config: &Config) -> Self {
        let mut registry = Self::new(config);
        registry.register(Box::new(ShellTool::new(config.tool_timeout_secs)));
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(ListDirTool));
        registry.register(Box::new(DoneTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        debug!(tool = tool.name(), "Registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Specs for the gateway, sorted by name for a stable request shape.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn stats(&self, name: &str) -> Option<&ToolStats> {
        self.stats.get(name)
    }

    /// Execute one tool call.
    ///
    /// Order: lookup, path containment, cache, execution under timeout,
    /// output ceiling, stats. A rejected or failed call still shows up in
    /// the stats for its tool name.
    pub async fn dispatch(&mut self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let start = Instant::now();

        let Some(tool) = self.tools.get(&call.name) else {
            let result = ToolResult::fail(format!("Unknown tool: {}", call.name));
            self.record(&call.name, &result);
            return result;
        };

        // Containment comes before everything else that could touch disk.
        for key in tool.path_params() {
            if let Some(raw) = call.arguments.get(*key).and_then(|v| v.as_str()) {
                if let Err(err) = ctx.resolve(raw) {
                    warn!(tool = %call.name, path = raw, "Rejected path argument");
                    let mut result = ToolResult::fail(err.to_string());
                    result.metadata.duration_ms = start.elapsed().as_millis() as u64;
                    self.record(&call.name, &result);
                    return result;
                }
            }
        }

        let key = tool.cacheable().then(|| cache_key(&call.name, &call.arguments));
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key) {
                debug!(tool = %call.name, "Tool cache hit");
                let mut result = hit.clone();
                result.metadata.cache_hit = true;
                self.record_cache_hit(&call.name);
                return result;
            }
        }

        let timeout_secs = self.call_timeout.as_secs();
        let execution = tool.execute(call.arguments.clone(), ctx);
        let mut result = match tokio::time::timeout(self.call_timeout, execution).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => ToolResult::fail(err.to_string()),
            Err(_) => ToolResult::fail(format!(
                "Tool '{}' timed out after {}s",
                call.name, timeout_secs
            )),
        };
        result.metadata.duration_ms = start.elapsed().as_millis() as u64;

        if result.output.len() > self.max_output_bytes {
            let original_len = result.output.len();
            // Walk down to a char boundary before cutting; truncate panics
            // mid-character.
            let mut cut = self.max_output_bytes;
            while !result.output.is_char_boundary(cut) {
                cut -= 1;
            }
            result.output.truncate(cut);
            result.output.push_str(&format!(
                "\n...[truncated from {} to {} bytes]",
                original_len, cut
            ));
            result.metadata.truncated = true;
        }

        // A successful non-cacheable tool may have mutated the sandbox
        // (shell does not report what it touched), so every cached read
        // becomes suspect.
        if result.success && key.is_none() {
            self.cache.clear();
        }

        if let Some(key) = key {
            if result.success {
                self.cache.insert(key, result.clone());
            }
        }

        self.record(&call.name, &result);
        result
    }

    fn record(&mut self, name: &str, result: &ToolResult) {
        self.stats
            .entry(name.to_string())
            .or_default()
            .record(name, result);
    }

    fn record_cache_hit(&mut self, name: &str) {
        let stats = self.stats.entry(name.to_string()).or_default();
        stats.invocations += 1;
        stats.successes += 1;
        stats.cache_hits += 1;
    }
}
