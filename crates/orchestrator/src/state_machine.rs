use std::fmt;

use crate::error::{OrchestratorError, Result};

/// Lifecycle of one session, indexed by the invocation being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Running(usize),
    /// Output exhausted, worker being reaped.
    Draining(usize),
    /// Moving on to the invocation with this index.
    Advancing(usize),
    Terminal,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => f.write_str("idle"),
            SessionPhase::Running(i) => write!(f, "running({})", i),
            SessionPhase::Draining(i) => write!(f, "draining({})", i),
            SessionPhase::Advancing(i) => write!(f, "advancing({})", i),
            SessionPhase::Terminal => f.write_str("terminal"),
        }
    }
}

pub struct SessionStateMachine;

impl SessionStateMachine {
    pub fn validate_transition(from: &SessionPhase, to: &SessionPhase) -> Result<()> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    pub fn can_transition(from: &SessionPhase, to: &SessionPhase) -> bool {
        use SessionPhase::*;

        match (*from, *to) {
            (Idle, Running(0)) => true,
            (Running(i), Draining(j)) => i == j,
            (Draining(i), Advancing(j)) => j == i + 1,
            (Advancing(i), Running(j)) => i == j,
            (Terminal, _) => false,
            (_, Terminal) => true,
            _ => false,
        }
    }
}
