//! Subprocess lifecycle events

use serde::{Deserialize, Serialize};

/// What was run. Secrets written to stdin are never part of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
}

impl ProcessDescriptor {
    /// Render as a single shell-like line for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Process events emitted by the supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// Process spawned
    Started {
        descriptor: ProcessDescriptor,
        pid: Option<u32>,
    },

    /// Process exited on its own
    Completed {
        descriptor: ProcessDescriptor,
        /// `None` when the process was ended by a signal
        exit_code: Option<i32>,
        duration_ms: u64,
    },

    /// Process could not be started or awaited
    Failed {
        descriptor: ProcessDescriptor,
        error_message: String,
        duration_ms: u64,
    },

    /// Deadline elapsed and the process group was killed
    TimedOut {
        descriptor: ProcessDescriptor,
        timeout_seconds: u64,
    },

    /// Process group killed for a reason other than the deadline
    Terminated {
        descriptor: ProcessDescriptor,
        reason: String,
    },

    /// Leftover processes from an earlier run were killed
    StaleProcessesTerminated { name: String, count: usize },
}
