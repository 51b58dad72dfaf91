//! Session budget accounting.
//!
//! A single [`BudgetState`] lives for the whole session. The gateway adds
//! token usage and cost after every request; the agent loop adds iteration
//! and tool-call counts. All counters are monotonically non-decreasing.

use std::time::Instant;

use serde::Serialize;

/// Token usage reported by the provider for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
}

/// Cumulative session accounting. Mutated only by the loop and the gateway.
#[derive(Debug)]
pub struct BudgetState {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    /// Accrued spend in USD.
    pub cost: f64,
    /// Completed gateway requests, success or failure.
    pub requests: u64,
    /// Tool dispatch attempts, including rejected ones.
    pub tool_calls: u64,
    pub iterations: u32,
    started_at: Instant,
}

impl BudgetState {
    pub fn new() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            cost: 0.0,
            requests: 0,
            tool_calls: 0,
            iterations: 0,
            started_at: Instant::now(),
        }
    }

    /// Record one request's usage and its cost.
    pub fn record_request(&mut self, usage: TokenUsage, cost: f64) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.cached_tokens += usage.cached_tokens;
        self.cost += cost;
        self.requests += 1;
    }

    pub fn record_tool_call(&mut self) {
        self.tool_calls += 1;
    }

    pub fn record_iteration(&mut self) {
        self.iterations += 1;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Point-in-time copy for events and the final report.
    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cached_tokens: self.cached_tokens,
            total_tokens: self.total_tokens(),
            cost: self.cost,
            requests: self.requests,
            tool_calls: self.tool_calls,
            iterations: self.iterations,
        }
    }
}

impl Default for BudgetState {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable view of [`BudgetState`] for the event stream.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct BudgetSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub requests: u64,
    pub tool_calls: u64,
    pub iterations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_budget_is_zeroed() {
        let budget = BudgetState::new();
        assert_eq!(budget.total_tokens(), 0);
        assert_eq!(budget.cost, 0.0);
        assert_eq!(budget.requests, 0);
        assert_eq!(budget.tool_calls, 0);
        assert_eq!(budget.iterations, 0);
    }

    #[test]
    fn test_record_request_accumulates() {
        let mut budget = BudgetState::new();
        let usage = TokenUsage {
            input_tokens: 1000,
            output_tokens: 200,
            cached_tokens: 300,
        };
        budget.record_request(usage, 0.0011);
        budget.record_request(usage, 0.0011);

        assert_eq!(budget.input_tokens, 2000);
        assert_eq!(budget.output_tokens, 400);
        assert_eq!(budget.cached_tokens, 600);
        assert_eq!(budget.total_tokens(), 2400);
        assert_eq!(budget.requests, 2);
        assert!((budget.cost - 0.0022).abs() < 1e-9);
    }

    #[test]
    fn test_counters_are_monotone() {
        let mut budget = BudgetState::new();
        let mut last_tokens = 0;
        let mut last_cost = 0.0;
        for i in 0..10 {
            budget.record_request(
                TokenUsage {
                    input_tokens: i,
                    output_tokens: i,
                    cached_tokens: 0,
                },
                i as f64 * 0.001,
            );
            budget.record_tool_call();
            budget.record_iteration();
            assert!(budget.total_tokens() >= last_tokens);
            assert!(budget.cost >= last_cost);
            last_tokens = budget.total_tokens();
            last_cost = budget.cost;
        }
        assert_eq!(budget.tool_calls, 10);
        assert_eq!(budget.iterations, 10);
    }

    #[test]
    fn test_snapshot_matches_state() {
        let mut budget = BudgetState::new();
        budget.record_request(
            TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                cached_tokens: 1,
            },
            0.5,
        );
        budget.record_tool_call();
        let snap = budget.snapshot();
        assert_eq!(snap.input_tokens, 10);
        assert_eq!(snap.output_tokens, 5);
        assert_eq!(snap.total_tokens, 15);
        assert_eq!(snap.tool_calls, 1);
        assert_eq!(snap.requests, 1);
    }
}
