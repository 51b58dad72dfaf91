//! Token-accounted context window with two-phase compaction.
//!
//! The window owns the transcript. Reduction happens in two phases:
//!
//! - **Prune**: elide old tool-result content, protecting the most recent
//!   `prune_protect` tokens of tool output. Only runs when the recoverable
//!   amount is worth it (`prune_minimum`).
//! - **Summarize**: if pruning was not enough, replace the oldest contiguous
//!   block of assistant/tool turns with a single synthetic summary message.
//!
//! The system prompt and the user instruction are never pruned or
//! summarized away.

use tracing::{debug, info};

use super::{Message, Role};
use crate::config::Config;

/// How many trailing messages survive a summarization pass verbatim.
const KEEP_RECENT_ON_SUMMARY: usize = 8;

/// Per-line cap when rendering removed messages into the summary.
const SUMMARY_LINE_CHARS: usize = 120;

/// Estimate the token footprint of a single message.
///
/// Word count times 1.3, plus a flat 4 tokens of per-message overhead.
/// Tool call names and arguments count toward the footprint since they are
/// serialized into the request.
pub fn estimate_message_tokens(msg: &Message) -> usize {
    let mut words = msg.content.split_whitespace().count();
    if let Some(calls) = &msg.tool_calls {
        for call in calls {
            words += 1; // tool name
            words += call.arguments.to_string().split_whitespace().count();
        }
    }
    (words as f64 * 1.3 + 4.0) as usize
}

fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// What a `compact` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Tool results whose content was elided in the prune phase.
    pub elided_results: usize,
    /// Messages replaced by the synthetic summary, if any.
    pub summarized_messages: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// Owns the conversation transcript and keeps it inside the model's
/// context budget. The agent loop appends through this type and never
/// touches messages directly.
#[derive(Debug)]
pub struct ContextWindow {
    messages: Vec<Message>,
    context_limit: usize,
    output_reserve: usize,
    compact_threshold: f64,
    prune_protect: usize,
    prune_minimum: usize,
    max_result_bytes: usize,
}

impl ContextWindow {
    pub fn new(config: &Config) -> Self {
        Self {
            messages: Vec::new(),
            context_limit: config.model_context_limit,
            output_reserve: config.output_token_max,
            compact_threshold: config.compact_threshold,
            prune_protect: config.prune_protect,
            prune_minimum: config.prune_minimum,
            max_result_bytes: config.max_tool_result_bytes,
        }
    }

    /// Append a message, applying the per-message hard cap to tool results.
    ///
    /// The cap is independent of compaction: a single oversized tool result
    /// is cut at append time so it can never dominate the window.
    pub fn append(&mut self, mut msg: Message) {
        if msg.role == Role::Tool && msg.content.len() > self.max_result_bytes {
            let original_len = msg.content.len();
            // Walk down to a char boundary before cutting; truncate panics
            // mid-character.
            let mut cut = self.max_result_bytes;
            while !msg.content.is_char_boundary(cut) {
                cut -= 1;
            }
            msg.content.truncate(cut);
            msg.content.push_str(&format!(
                "\n...[truncated from {} to {} bytes]",
                original_len, cut
            ));
        }
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Estimated token footprint of the whole transcript.
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.messages)
    }

    /// Tokens available for the transcript after reserving output headroom.
    pub fn usable_budget(&self) -> usize {
        self.context_limit.saturating_sub(self.output_reserve)
    }

    fn compact_target(&self) -> usize {
        (self.usable_budget() as f64 * self.compact_threshold) as usize
    }

    /// Whether the transcript has grown past the compaction threshold.
    pub fn should_compact(&self) -> bool {
        self.estimated_tokens() > self.compact_target()
    }

    /// Snapshot the transcript for a model request.
    ///
    /// Pure: two calls with no intervening `append` return identical lists.
    pub fn prepare_for_request(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Run the two-phase reduction. Safe to call when below threshold
    /// (it does nothing useful but harms nothing).
    pub fn compact(&mut self) -> CompactionReport {
        let tokens_before = self.estimated_tokens();
        let mut report = CompactionReport {
            tokens_before,
            tokens_after: tokens_before,
            ..Default::default()
        };

        report.elided_results = self.prune_tool_results();
        report.tokens_after = self.estimated_tokens();

        if report.tokens_after > self.compact_target() {
            report.summarized_messages = self.summarize_oldest_block();
            report.tokens_after = self.estimated_tokens();
        }

        info!(
            tokens_before = report.tokens_before,
            tokens_after = report.tokens_after,
            elided = report.elided_results,
            summarized = report.summarized_messages,
            "Compacted context window"
        );
        report
    }

    /// Phase 1: elide old tool-result content, newest first protected.
    ///
    /// Walks tool results from the end of the transcript backwards,
    /// accumulating their token footprint. Results past the `prune_protect`
    /// protection budget are candidates. Candidates are only elided when
    /// their combined footprint reaches `prune_minimum`, so a pass that
    /// would barely help leaves the transcript untouched.
    fn prune_tool_results(&mut self) -> usize {
        let mut protected = 0usize;
        let mut candidates: Vec<usize> = Vec::new();
        let mut recoverable = 0usize;

        for idx in (0..self.messages.len()).rev() {
            let msg = &self.messages[idx];
            if msg.role != Role::Tool || msg.content.starts_with("[elided") {
                continue;
            }
            let tokens = estimate_message_tokens(msg);
            if protected < self.prune_protect {
                protected += tokens;
            } else {
                candidates.push(idx);
                recoverable += tokens;
            }
        }

        if recoverable < self.prune_minimum {
            debug!(
                recoverable,
                minimum = self.prune_minimum,
                "Skipping prune, not enough to recover"
            );
            return 0;
        }

        for &idx in &candidates {
            let tokens = estimate_message_tokens(&self.messages[idx]);
            self.messages[idx].content = format!("[elided {} tokens of tool output]", tokens);
        }
        candidates.len()
    }

    /// Phase 2: replace the oldest contiguous block of assistant/tool turns
    /// with one synthetic summary message at the block's position.
    ///
    /// The leading system prompt and user instruction survive, as do the
    /// most recent turns. Relative order of survivors is unchanged.
    fn summarize_oldest_block(&mut self) -> usize {
        let prefix = self.protected_prefix_len();
        let tail_start = self.messages.len().saturating_sub(KEEP_RECENT_ON_SUMMARY);
        if tail_start <= prefix {
            return 0;
        }

        let removed: Vec<Message> = self.messages.drain(prefix..tail_start).collect();
        if removed.is_empty() {
            return 0;
        }

        let summary = Message::system(format!(
            "[Conversation Summary]\nEarlier turns, oldest first:\n{}",
            render_summary(&removed)
        ));
        self.messages.insert(prefix, summary);
        removed.len()
    }

    /// Length of the never-pruned leading run: system messages plus the
    /// initial user instruction.
    fn protected_prefix_len(&self) -> usize {
        let mut len = 0;
        while self.messages.get(len).map(|m| m.role) == Some(Role::System) {
            len += 1;
        }
        if self.messages.get(len).map(|m| m.role) == Some(Role::User) {
            len += 1;
        }
        len
    }
}

fn render_summary(removed: &[Message]) -> String {
    let mut lines = Vec::with_capacity(removed.len());
    for msg in removed {
        // Already-elided results carry nothing worth repeating.
        if msg.role == Role::Tool && msg.content.starts_with("[elided") {
            continue;
        }
        let line = match (&msg.role, msg.has_tool_calls()) {
            (Role::Assistant, true) => {
                let names: Vec<&str> = msg
                    .tool_calls
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect();
                format!("assistant called: {}", names.join(", "))
            }
            (Role::Assistant, false) => format!("assistant: {}", first_line(&msg.content)),
            (Role::Tool, _) => format!("tool result: {}", first_line(&msg.content)),
            (Role::User, _) => format!("user: {}", first_line(&msg.content)),
            (Role::System, _) => format!("note: {}", first_line(&msg.content)),
        };
        lines.push(line);
    }
    lines.join("\n")
}

fn first_line(content: &str) -> String {
    let line = content.lines().next().unwrap_or("");
    let mut out: String = line.chars().take(SUMMARY_LINE_CHARS).collect();
    if line.chars().count() > SUMMARY_LINE_CHARS {
        out.push_str("...");
    }
    out
}
