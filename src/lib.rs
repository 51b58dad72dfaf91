//! termagent — an unattended LLM task agent core.
//!
//! Invoked once per task, the agent drives a model in a turn loop,
//! executes its tool calls inside a sandboxed working directory, and
//! stops on completion or budget exhaustion.
//!
//! The moving parts:
//!
//! - [`gateway`] — provider transport, retry, cost ceiling, accounting
//! - [`tools`] — tool trait, registry, containment, caching, stats
//! - [`transcript`] — message types and the compacting context window
//! - [`agent`] — the session state machine tying it together
//! - [`events`] — the JSONL event stream on stdout

pub mod agent;
pub mod budget;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod tools;
pub mod transcript;

pub use error::{AgentError, ProviderError, Result};
