//! Session event stream.
//!
//! The binary emits one JSON object per line on stdout; logs go to stderr
//! so the two streams never interleave. Tests plug in a buffering sink.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::budget::BudgetSnapshot;

/// Everything a session reports to the outside world.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SessionStart {
        session_id: String,
        instruction: String,
        model: String,
        workdir: String,
        timestamp: DateTime<Utc>,
    },
    /// One loop iteration completed, with the accounting as of its end.
    Turn {
        iteration: u32,
        budget: BudgetSnapshot,
    },
    ToolDispatch {
        iteration: u32,
        tool: String,
        call_id: String,
        success: bool,
        duration_ms: u64,
        cache_hit: bool,
    },
    Error {
        message: String,
    },
    /// Terminal event. Exactly one per session.
    SessionEnd {
        session_id: String,
        state: String,
        budget: BudgetSnapshot,
        elapsed_secs: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Destination for session events.
pub trait EventSink: Send {
    fn emit(&mut self, event: &Event);
}

/// Writes events as JSON lines. The binary uses this over stdout.
pub struct JsonlSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> EventSink for JsonlSink<W> {
    fn emit(&mut self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(line) => {
                if let Err(e) = writeln!(self.writer, "{}", line) {
                    warn!(error = %e, "Failed to write event");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize event"),
        }
    }
}

/// Collects events in memory. Test sink.
#[derive(Default)]
pub struct MemorySink {
    pub events: Vec<Event>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetState;

    #[test]
    fn test_jsonl_sink_writes_one_line_per_event() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonlSink::new(&mut buf);
            sink.emit(&Event::Error {
                message: "boom".into(),
            });
            sink.emit(&Event::Turn {
                iteration: 1,
                budget: BudgetState::new().snapshot(),
            });
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "error");
        assert_eq!(first["message"], "boom");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "turn");
        assert_eq!(second["iteration"], 1);
        assert_eq!(second["budget"]["requests"], 0);
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemorySink::new();
        sink.emit(&Event::Error {
            message: "one".into(),
        });
        sink.emit(&Event::Error {
            message: "two".into(),
        });
        assert_eq!(sink.events.len(), 2);
    }

    #[test]
    fn test_event_tag_names() {
        let event = Event::ToolDispatch {
            iteration: 3,
            tool: "shell".into(),
            call_id: "c1".into(),
            success: true,
            duration_ms: 12,
            cache_hit: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "tool_dispatch");
        assert_eq!(json["tool"], "shell");
    }
}
