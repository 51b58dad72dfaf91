//! Session state machine.
//!
//! ```text
//! RUNNING ──> COMPACTING ──> RUNNING
//!    │
//!    ├──> DONE             (done tool, or two text-only turns)
//!    ├──> BUDGET_EXCEEDED  (iteration or cost ceiling)
//!    └──> FATAL            (unrecoverable provider error)
//! ```
//!
//! Exactly one `SessionEnd` event is emitted per session, whatever path
//! the loop takes to a terminal state.

use std::fmt;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::budget::{BudgetSnapshot, BudgetState};
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::events::{Event, EventSink};
use crate::gateway::{Gateway, GatewayResponse};
use crate::tools::{ToolContext, ToolRegistry, DONE_TOOL_NAME};
use crate::transcript::{ContextWindow, Message};

/// Text-only turns in a row before the session is treated as finished.
const IMPLICIT_FINALITY_TURNS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// Transient: the window is being reduced before the next request.
    Compacting,
    Done,
    BudgetExceeded,
    Fatal,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::BudgetExceeded | SessionState::Fatal
        )
    }

    /// Process exit code for the binary.
    pub fn exit_code(self) -> u8 {
        match self {
            SessionState::Done => 0,
            SessionState::BudgetExceeded => 2,
            _ => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Running => "running",
            SessionState::Compacting => "compacting",
            SessionState::Done => "done",
            SessionState::BudgetExceeded => "budget_exceeded",
            SessionState::Fatal => "fatal",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished session reports back to the caller.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub budget: BudgetSnapshot,
    /// The model's own completion summary, when it gave one.
    pub summary: Option<String>,
}

/// One agent run: owns the window, the budget, the gateway and the
/// registry for the lifetime of a single task.
pub struct AgentSession {
    id: Uuid,
    config: Config,
    gateway: Gateway,
    registry: ToolRegistry,
    window: ContextWindow,
    budget: BudgetState,
    state: SessionState,
    sink: Box<dyn EventSink>,
    ctx: ToolContext,
    text_only_turns: u32,
    summary: Option<String>,
}

impl AgentSession {
    pub fn new(
        config: Config,
        gateway: Gateway,
        registry: ToolRegistry,
        sink: Box<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let ctx = ToolContext::new(&config.workdir);
        let mut window = ContextWindow::new(&config);
        window.append(Message::system(build_system_prompt(&config, &registry)));
        window.append(Message::user(config.instruction.clone()));

        Ok(Self {
            id: Uuid::new_v4(),
            config,
            gateway,
            registry,
            window,
            budget: BudgetState::new(),
            state: SessionState::Running,
            sink,
            ctx,
            text_only_turns: 0,
            summary: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn budget(&self) -> BudgetSnapshot {
        self.budget.snapshot()
    }

    /// The transcript as recorded so far.
    pub fn transcript(&self) -> &[Message] {
        self.window.messages()
    }

    /// Run the loop to a terminal state.
    pub async fn run(&mut self) -> SessionOutcome {
        self.sink.emit(&Event::SessionStart {
            session_id: self.id.to_string(),
            instruction: self.config.instruction.clone(),
            model: self.config.model.clone(),
            workdir: self.config.workdir.display().to_string(),
            timestamp: chrono::Utc::now(),
        });
        info!(session_id = %self.id, model = %self.config.model, "Session started");

        while !self.state.is_terminal() {
            self.step().await;
            self.sink.emit(&Event::Turn {
                iteration: self.budget.iterations,
                budget: self.budget.snapshot(),
            });
        }

        let outcome = SessionOutcome {
            state: self.state,
            budget: self.budget.snapshot(),
            summary: self.summary.clone(),
        };
        self.sink.emit(&Event::SessionEnd {
            session_id: self.id.to_string(),
            state: self.state.as_str().to_string(),
            budget: outcome.budget,
            elapsed_secs: self.budget.elapsed_secs(),
            timestamp: chrono::Utc::now(),
        });
        info!(
            session_id = %self.id,
            state = %self.state,
            iterations = self.budget.iterations,
            cost = self.budget.cost,
            "Session ended"
        );
        outcome
    }

    async fn step(&mut self) {
        self.budget.record_iteration();
        if self.budget.iterations > self.config.max_iterations {
            warn!(
                max_iterations = self.config.max_iterations,
                "Iteration ceiling reached"
            );
            self.emit_error("iteration ceiling reached");
            self.state = SessionState::BudgetExceeded;
            return;
        }

        if self.window.should_compact() {
            self.state = SessionState::Compacting;
            let report = self.window.compact();
            debug!(
                tokens_before = report.tokens_before,
                tokens_after = report.tokens_after,
                "Compaction pass"
            );
            self.state = SessionState::Running;
        }

        let messages = self.window.prepare_for_request();
        let specs = self.registry.specs();
        let mut response = match self.gateway.complete(&messages, &specs, &mut self.budget).await {
            Ok(response) => response,
            Err(AgentError::CostLimitExceeded { used, limit }) => {
                warn!(used, limit, "Cost ceiling reached");
                self.emit_error(&format!(
                    "cost ceiling reached: ${:.4} of ${:.2}",
                    used, limit
                ));
                self.state = SessionState::BudgetExceeded;
                return;
            }
            Err(err) => {
                error!(error = %err, "Unrecoverable provider error");
                self.emit_error(&err.to_string());
                self.state = SessionState::Fatal;
                return;
            }
        };

        for call in &mut response.tool_calls {
            call.turn = self.budget.iterations;
        }
        self.record_assistant_turn(&response);

        if response.tool_calls.is_empty() {
            self.text_only_turns += 1;
            if self.text_only_turns >= IMPLICIT_FINALITY_TURNS {
                info!("Two text-only turns, treating the task as finished");
                if self.summary.is_none() && !response.text.trim().is_empty() {
                    self.summary = Some(response.text.clone());
                }
                self.state = SessionState::Done;
            }
            return;
        }
        self.text_only_turns = 0;

        // Dispatch sequentially, in request order.
        for call in &response.tool_calls {
            self.budget.record_tool_call();

            if call.name == DONE_TOOL_NAME {
                let summary = call
                    .arguments
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                self.sink.emit(&Event::ToolDispatch {
                    iteration: self.budget.iterations,
                    tool: call.name.clone(),
                    call_id: call.id.clone(),
                    success: true,
                    duration_ms: 0,
                    cache_hit: false,
                });
                self.window.append(Message::tool_result(
                    &call.id,
                    summary.as_deref().unwrap_or("Task complete."),
                ));
                self.summary = summary;
                self.state = SessionState::Done;
                return;
            }

            let result = self.registry.dispatch(call, &self.ctx).await;
            self.sink.emit(&Event::ToolDispatch {
                iteration: self.budget.iterations,
                tool: call.name.clone(),
                call_id: call.id.clone(),
                success: result.success,
                duration_ms: result.metadata.duration_ms,
                cache_hit: result.metadata.cache_hit,
            });
            self.window
                .append(Message::tool_result(&call.id, result.output));
        }
    }

    fn record_assistant_turn(&mut self, response: &GatewayResponse) {
        let mut msg = if response.tool_calls.is_empty() {
            Message::assistant(&response.text)
        } else {
            Message::assistant_with_tools(&response.text, response.tool_calls.clone())
        };
        if let Some(thinking) = &response.thinking {
            msg = msg.with_thinking(thinking);
        }
        self.window.append(msg);
    }

    fn emit_error(&mut self, message: &str) {
        self.sink.emit(&Event::Error {
            message: message.to_string(),
        });
    }
}

fn build_system_prompt(config: &Config, registry: &ToolRegistry) -> String {
    format!(
        "You are an autonomous terminal agent working unattended on one task.\n\
         Working directory: {workdir} (all paths are confined to it).\n\
         Platform: {os}.\n\n\
         Available tools: {tools}.\n\n\
         Work in small verifiable steps. Use tools to inspect before you change \
         anything. When the task is finished and verified, call the `{done}` tool \
         with a short summary. Do not call `{done}` before the work is actually done.",
        workdir = config.workdir.display(),
        os = std::env::consts::OS,
        tools = registry.names().join(", "),
        done = DONE_TOOL_NAME,
    )
}
