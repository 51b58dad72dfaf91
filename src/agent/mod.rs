//! Agent loop.
//!
//! Drives the session state machine: one iteration per model turn,
//! dispatching requested tool calls and feeding results back until the
//! model declares completion or a budget runs out.

mod session;

pub use session::{AgentSession, SessionOutcome, SessionState};
