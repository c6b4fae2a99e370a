//! Outcome of one state-machine step.

use std::fmt;

use crate::error::AbortReason;

/// A motion that reached its goal. The actuator is already stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    PositionReached { steps: i64 },
    ForceReached { force: f32 },
    Homed,
    BreakDetected { previous: f32, current: f32 },
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::PositionReached { steps } => write!(f, "Position reached ({steps} steps)."),
            Completion::ForceReached { force } => write!(f, "Force reached ({force:.2} N)."),
            Completion::Homed => f.write_str("Homing complete."),
            Completion::BreakDetected { previous, current } => {
                write!(f, "Break detected ({previous:.2} N -> {current:.2} N).")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RigStatus {
    /// Nothing commanded.
    Idle,
    /// A motion is in progress.
    Running,
    Complete(Completion),
    /// Motion halted by a safety rule; the rig is idle again.
    Aborted(AbortReason),
}

impl RigStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RigStatus::Complete(_) | RigStatus::Aborted(_))
    }
}
