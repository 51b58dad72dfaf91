//! Session configuration.
//!
//! One [`Config`] is built at startup (CLI flags over environment over
//! defaults) and passed into component constructors. There is no global
//! config state; everything that needs a knob receives it explicitly.

use std::path::PathBuf;

use crate::error::{AgentError, Result};
use crate::gateway::SamplingMode;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "TERMAGENT_";

/// All knobs for one agent session.
#[derive(Debug, Clone)]
pub struct Config {
    /// The natural-language task. Required.
    pub instruction: String,
    /// Root of the sandbox; every path argument must resolve inside it.
    pub workdir: PathBuf,
    pub model: String,
    /// OpenAI-compatible chat completions base URL.
    pub api_base: String,
    pub mode: SamplingMode,

    /// Hard ceiling on session spend in USD.
    pub cost_limit: f64,
    /// Hard ceiling on loop iterations.
    pub max_iterations: u32,
    /// Per-request output token cap sent to the provider.
    pub max_output_tokens: u32,

    // Context window sizing
    pub model_context_limit: usize,
    pub output_token_max: usize,
    pub compact_threshold: f64,
    pub prune_protect: usize,
    pub prune_minimum: usize,
    /// Per-message hard cap for tool results at append time.
    pub max_tool_result_bytes: usize,

    // Tool execution
    pub tool_timeout_secs: u64,
    /// Registry-level ceiling on a single tool's output.
    pub max_tool_output_bytes: usize,

    // Retry policy
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instruction: String::new(),
            workdir: PathBuf::from("."),
            model: "gpt-4o".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            mode: SamplingMode::Deliberative,
            cost_limit: 100.0,
            max_iterations: 350,
            max_output_tokens: 16_384,
            model_context_limit: 256_000,
            output_token_max: 32_000,
            compact_threshold: 0.85,
            prune_protect: 40_000,
            prune_minimum: 20_000,
            max_tool_result_bytes: 60_000,
            tool_timeout_secs: 60,
            max_tool_output_bytes: 100_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl Config {
    /// Apply `TERMAGENT_*` environment overrides. CLI flags are applied
    /// after this, so flags win over environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(format!("{}MODEL", ENV_PREFIX)) {
            self.model = v;
        }
        if let Ok(v) = std::env::var(format!("{}API_BASE", ENV_PREFIX)) {
            self.api_base = v;
        }
        if let Ok(v) = std::env::var(format!("{}COST_LIMIT", ENV_PREFIX)) {
            if let Ok(parsed) = v.parse() {
                self.cost_limit = parsed;
            }
        }
        if let Ok(v) = std::env::var(format!("{}MAX_ITERATIONS", ENV_PREFIX)) {
            if let Ok(parsed) = v.parse() {
                self.max_iterations = parsed;
            }
        }
    }

    /// The provider API key, from `TERMAGENT_API_KEY` with an
    /// `OPENAI_API_KEY` fallback. Never a CLI flag.
    pub fn api_key_from_env() -> Result<String> {
        std::env::var(format!("{}API_KEY", ENV_PREFIX))
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| {
                AgentError::Config(format!(
                    "no API key: set {}API_KEY or OPENAI_API_KEY",
                    ENV_PREFIX
                ))
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.instruction.trim().is_empty() {
            return Err(AgentError::Config("instruction must not be empty".into()));
        }
        if !self.workdir.is_dir() {
            return Err(AgentError::Config(format!(
                "workdir does not exist: {}",
                self.workdir.display()
            )));
        }
        if self.cost_limit <= 0.0 {
            return Err(AgentError::Config("cost limit must be positive".into()));
        }
        if self.max_iterations == 0 {
            return Err(AgentError::Config("max iterations must be positive".into()));
        }
        if self.output_token_max >= self.model_context_limit {
            return Err(AgentError::Config(
                "output reserve must be smaller than the context limit".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cost_limit, 100.0);
        assert_eq!(cfg.max_iterations, 350);
        assert_eq!(cfg.model_context_limit, 256_000);
        assert_eq!(cfg.output_token_max, 32_000);
        assert_eq!(cfg.compact_threshold, 0.85);
        assert_eq!(cfg.prune_protect, 40_000);
        assert_eq!(cfg.prune_minimum, 20_000);
        assert_eq!(cfg.tool_timeout_secs, 60);
    }

    #[test]
    fn test_validate_rejects_empty_instruction() {
        let mut cfg = Config::default();
        cfg.instruction = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_workdir() {
        let mut cfg = Config::default();
        cfg.instruction = "do it".to_string();
        cfg.workdir = PathBuf::from("/nonexistent/definitely/not/here");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let mut cfg = Config::default();
        cfg.instruction = "do it".to_string();
        cfg.cost_limit = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.instruction = "do it".to_string();
        cfg.max_iterations = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        let mut cfg = Config::default();
        cfg.instruction = "list the files".to_string();
        assert!(cfg.validate().is_ok());
    }
}
