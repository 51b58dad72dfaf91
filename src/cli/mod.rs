//! Command-line entry point.
//!
//! Parses flags, builds the [`Config`] (flags over environment over
//! defaults), wires the components together and runs one session. Logs go
//! to stderr; the JSONL event stream owns stdout.

use std::path::PathBuf;

use clap::Parser;

use crate::agent::AgentSession;
use crate::config::Config;
use crate::error::AgentError;
use crate::events::JsonlSink;
use crate::gateway::{Gateway, OpenAiCompatClient, RetryClient, SamplingMode};
use crate::tools::ToolRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "termagent",
    version,
    about = "Run an unattended LLM agent against a single task"
)]
pub struct Cli {
    /// The task to perform, in natural language
    #[arg(long)]
    pub instruction: String,

    /// Working directory the session is confined to
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Model identifier sent to the provider
    #[arg(long)]
    pub model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    pub api_base: Option<String>,

    /// Session spend ceiling in USD
    #[arg(long)]
    pub cost_limit: Option<f64>,

    /// Loop iteration ceiling
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Sampling preset
    #[arg(long, value_enum, default_value_t = SamplingMode::Deliberative)]
    pub mode: SamplingMode,
}

/// Parse arguments and run one session. Returns the process exit code.
pub async fn run() -> anyhow::Result<u8> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = build_config(cli)?;
    let api_key = Config::api_key_from_env()?;

    let transport = OpenAiCompatClient::new(config.api_base.clone(), api_key)?;
    let client = RetryClient::new(Box::new(transport))
        .with_max_retries(config.retry_max_attempts)
        .with_base_delay_ms(config.retry_base_delay_ms)
        .with_max_delay_ms(config.retry_max_delay_ms);
    let gateway = Gateway::new(Box::new(client), &config);
    let registry = ToolRegistry::with_default_tools(&config);
    let sink = Box::new(JsonlSink::new(std::io::stdout()));

    let mut session = AgentSession::new(config, gateway, registry, sink)?;
    let outcome = session.run().await;
    Ok(outcome.state.exit_code())
}

fn build_config(cli: Cli) -> crate::error::Result<Config> {
    let mut config = Config::default();
    config.apply_env_overrides();

    config.instruction = cli.instruction;
    config.workdir = cli.workdir.canonicalize().map_err(|e| {
        AgentError::Config(format!("workdir {}: {}", cli.workdir.display(), e))
    })?;
    config.mode = cli.mode;
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }
    if let Some(cost_limit) = cli.cost_limit {
        config.cost_limit = cost_limit;
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "termagent",
            "--instruction",
            "list the files",
            "--cost-limit",
            "5.0",
            "--max-iterations",
            "20",
            "--mode",
            "terse",
        ]);
        assert_eq!(cli.instruction, "list the files");
        assert_eq!(cli.cost_limit, Some(5.0));
        assert_eq!(cli.max_iterations, Some(20));
        assert_eq!(cli.mode, SamplingMode::Terse);
        assert_eq!(cli.workdir, PathBuf::from("."));
    }

    #[test]
    fn test_build_config_applies_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::parse_from([
            "termagent",
            "--instruction",
            "do the thing",
            "--workdir",
            dir.path().to_str().unwrap(),
            "--model",
            "other-model",
            "--cost-limit",
            "2.5",
        ]);
        let config = build_config(cli).unwrap();
        assert_eq!(config.instruction, "do the thing");
        assert_eq!(config.model, "other-model");
        assert_eq!(config.cost_limit, 2.5);
        assert_eq!(config.workdir, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_build_config_rejects_missing_workdir() {
        let cli = Cli::parse_from([
            "termagent",
            "--instruction",
            "x",
            "--workdir",
            "/definitely/not/a/dir",
        ]);
        assert!(build_config(cli).is_err());
    }
}
