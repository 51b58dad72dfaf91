//! LLM gateway.
//!
//! The single choke point between the agent loop and the provider. Enforces
//! the session cost ceiling before any network traffic, accrues usage and
//! cost into the budget after every request, and resolves provider quirks
//! (reasoning fields, in-band thinking, malformed tool arguments) so the
//! loop only ever sees normalized responses.

mod provider;
mod retry;
mod thinking;

pub use provider::{CompletionClient, OpenAiCompatClient, RawCompletion, RequestParams};
pub use retry::{compute_delay, delay_with_jitter, is_retryable, RetryClient};
pub use thinking::extract_thinking;

use serde::Serialize;
use tracing::debug;

use crate::budget::{BudgetState, TokenUsage};
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::tools::ToolSpec;
use crate::transcript::{Message, ToolCall};

/// USD per 1k input tokens.
pub const INPUT_COST_PER_1K: f64 = 0.0006;
/// USD per 1k output tokens.
pub const OUTPUT_COST_PER_1K: f64 = 0.0025;

/// Named sampling presets. Temperature and top-p are not independently
/// tunable; each mode is a fixed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SamplingMode {
    /// Exploratory reasoning: temperature 1.0, top-p 0.95.
    #[default]
    Deliberative,
    /// Focused output: temperature 0.6, top-p 0.95.
    Terse,
}

impl SamplingMode {
    pub fn sampling_params(self) -> (f32, f32) {
        match self {
            SamplingMode::Deliberative => (1.0, 0.95),
            SamplingMode::Terse => (0.6, 0.95),
        }
    }
}

/// A completed model turn, normalized for the loop.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub text: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Cumulative gateway statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct GatewayStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub requests: u64,
}

/// Cost of one request at the fixed per-token rates.
pub fn request_cost(usage: TokenUsage) -> f64 {
    usage.input_tokens as f64 / 1000.0 * INPUT_COST_PER_1K
        + usage.output_tokens as f64 / 1000.0 * OUTPUT_COST_PER_1K
}

pub struct Gateway {
    client: Box<dyn CompletionClient>,
    model: String,
    max_output_tokens: u32,
    mode: SamplingMode,
    cost_limit: f64,
    stats: GatewayStats,
}

impl Gateway {
    pub fn new(client: Box<dyn CompletionClient>, config: &Config) -> Self {
        Self {
            client,
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            mode: config.mode,
            cost_limit: config.cost_limit,
            stats: GatewayStats::default(),
        }
    }

    /// Run one model turn.
    ///
    /// Checks the cost ceiling against spend already accrued, so a breach
    /// surfaces on the call after the one that crossed the line and never
    /// costs another network request.
    pub async fn complete(
        &mut self,
        messages: &[Message],
        tools: &[ToolSpec],
        budget: &mut BudgetState,
    ) -> Result<GatewayResponse> {
        if budget.cost >= self.cost_limit {
            return Err(AgentError::CostLimitExceeded {
                used: budget.cost,
                limit: self.cost_limit,
            });
        }

        let (temperature, top_p) = self.mode.sampling_params();
        let params = RequestParams {
            model: self.model.clone(),
            max_tokens: self.max_output_tokens,
            temperature,
            top_p,
        };

        let raw = self.client.complete(messages, tools, &params).await?;

        let usage = raw.usage.unwrap_or_default();
        let cost = request_cost(usage);
        budget.record_request(usage, cost);
        self.record(usage, cost);

        // Prefer the dedicated reasoning field; fall back to in-band blocks.
        let (thinking, text) = match raw.reasoning {
            Some(reasoning) if !reasoning.trim().is_empty() => (Some(reasoning), raw.text),
            _ => extract_thinking(&raw.text),
        };

        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost = cost,
            tool_calls = raw.tool_calls.len(),
            finish_reason = raw.finish_reason.as_deref().unwrap_or(""),
            "Completed model turn"
        );

        Ok(GatewayResponse {
            text,
            thinking,
            tool_calls: raw.tool_calls,
            finish_reason: raw.finish_reason,
            usage,
        })
    }

    fn record(&mut self, usage: TokenUsage, cost: f64) {
        self.stats.input_tokens += usage.input_tokens;
        self.stats.output_tokens += usage.output_tokens;
        self.stats.cached_tokens += usage.cached_tokens;
        self.stats.total_tokens += usage.input_tokens + usage.output_tokens;
        self.stats.cost += cost;
        self.stats.requests += 1;
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Returns a canned completion and counts invocations.
    struct CannedClient {
        calls: Arc<AtomicU32>,
        completion: RawCompletion,
    }

    impl CannedClient {
        fn new(completion: RawCompletion) -> Self {
            Self {
                calls: Arc::new(AtomicU32::new(0)),
                completion,
            }
        }
    }

    #[async_trait]
    impl CompletionClient for CannedClient {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolSpec],
            _params: &RequestParams,
        ) -> crate::error::Result<RawCompletion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.completion.clone())
        }
    }

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            cached_tokens: 0,
        }
    }

    #[test]
    fn test_sampling_mode_pairs() {
        assert_eq!(SamplingMode::Deliberative.sampling_params(), (1.0, 0.95));
        assert_eq!(SamplingMode::Terse.sampling_params(), (0.6, 0.95));
    }

    #[test]
    fn test_request_cost_rates() {
        // 1000 input + 1000 output = 0.0006 + 0.0025
        let cost = request_cost(usage(1000, 1000));
        assert!((cost - 0.0031).abs() < 1e-9);
        assert_eq!(request_cost(TokenUsage::default()), 0.0);
    }

    #[tokio::test]
    async fn test_complete_accrues_budget_and_stats() {
        let completion = RawCompletion {
            text: "done".into(),
            usage: Some(usage(2000, 1000)),
            ..Default::default()
        };
        let mut gateway = Gateway::new(Box::new(CannedClient::new(completion)), &Config::default());
        let mut budget = BudgetState::new();

        gateway.complete(&[], &[], &mut budget).await.unwrap();
        gateway.complete(&[], &[], &mut budget).await.unwrap();

        assert_eq!(budget.input_tokens, 4000);
        assert_eq!(budget.output_tokens, 2000);
        assert_eq!(budget.requests, 2);
        let expected = 2.0 * (2.0 * INPUT_COST_PER_1K + 1.0 * OUTPUT_COST_PER_1K);
        assert!((budget.cost - expected).abs() < 1e-9);

        let stats = gateway.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.total_tokens, 6000);
        assert!((stats.cost - budget.cost).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_cost_ceiling_blocks_before_network() {
        let client = CannedClient::new(RawCompletion::default());
        let calls = client.calls.clone();
        let mut cfg = Config::default();
        cfg.cost_limit = 1.0;
        let mut gateway = Gateway::new(Box::new(client), &cfg);

        let mut budget = BudgetState::new();
        budget.record_request(TokenUsage::default(), 1.5); // already over

        let err = gateway.complete(&[], &[], &mut budget).await.unwrap_err();
        assert!(matches!(err, AgentError::CostLimitExceeded { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no network call expected");
    }

    #[tokio::test]
    async fn test_breach_surfaces_on_next_call() {
        // One expensive response pushes spend over the ceiling; the call
        // itself succeeds, the following one is refused.
        let completion = RawCompletion {
            text: "pricey".into(),
            usage: Some(usage(2_000_000, 0)), // 2M input = $1.20
            ..Default::default()
        };
        let mut cfg = Config::default();
        cfg.cost_limit = 1.0;
        let mut gateway = Gateway::new(Box::new(CannedClient::new(completion)), &cfg);
        let mut budget = BudgetState::new();

        assert!(gateway.complete(&[], &[], &mut budget).await.is_ok());
        assert!(budget.cost > 1.0);
        let err = gateway.complete(&[], &[], &mut budget).await.unwrap_err();
        assert!(matches!(err, AgentError::CostLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_reasoning_field_preferred_over_inband() {
        let completion = RawCompletion {
            text: "<think>inline</think>answer".into(),
            reasoning: Some("from the field".into()),
            ..Default::default()
        };
        let mut gateway = Gateway::new(Box::new(CannedClient::new(completion)), &Config::default());
        let mut budget = BudgetState::new();

        let resp = gateway.complete(&[], &[], &mut budget).await.unwrap();
        assert_eq!(resp.thinking.as_deref(), Some("from the field"));
        // In-band markers stay put when the field wins.
        assert_eq!(resp.text, "<think>inline</think>answer");
    }

    #[tokio::test]
    async fn test_inband_thinking_extracted_when_no_field() {
        let completion = RawCompletion {
            text: "<think>inline</think>answer".into(),
            ..Default::default()
        };
        let mut gateway = Gateway::new(Box::new(CannedClient::new(completion)), &Config::default());
        let mut budget = BudgetState::new();

        let resp = gateway.complete(&[], &[], &mut budget).await.unwrap();
        assert_eq!(resp.thinking.as_deref(), Some("inline"));
        assert_eq!(resp.text, "answer");
    }
}
