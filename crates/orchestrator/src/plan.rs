//! Job plan resolution.
//!
//! Turns an inbound search request into the ordered list of worker
//! invocations a session runs, together with the policy that decides how
//! their completion events are merged.

use std::fmt;
use std::path::{Path, PathBuf};

use events::Position;
use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// Matches requested per phase when the client does not say otherwise.
pub const DEFAULT_MATCH_COUNT: u32 = 1;

/// One worker execution: binary, positional arguments and the phase tag
/// stamped onto the events it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    binary: PathBuf,
    args: Vec<String>,
    position: Position,
}

impl InvocationSpec {
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>, position: Position) -> Self {
        Self {
            binary: binary.into(),
            args,
            position,
        }
    }

    /// `[pattern, count, position]`
    fn single(binary: &Path, pattern: &str, count: u32, position: Position) -> Self {
        Self::new(
            binary,
            vec![
                pattern.to_string(),
                count.to_string(),
                position.as_str().to_string(),
            ],
            position,
        )
    }

    /// `[prefix, suffix, "both", count]`
    fn combined(binary: &Path, prefix: &str, suffix: &str, count: u32) -> Self {
        Self::new(
            binary,
            vec![
                prefix.to_string(),
                suffix.to_string(),
                Position::Both.as_str().to_string(),
                count.to_string(),
            ],
            Position::Both,
        )
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn position(&self) -> Position {
        self.position
    }
}

impl fmt::Display for InvocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How worker completion events become the session's terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// The worker's own completion is forwarded.
    Single,
    /// Per-phase completions are hidden; one synthetic completion is sent
    /// once every phase has reported a match.
    RaceToTwo,
    /// A single worker enforces both constraints itself.
    Combined,
}

impl CompletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionPolicy::Single => "single",
            CompletionPolicy::RaceToTwo => "race-to-two",
            CompletionPolicy::Combined => "combined",
        }
    }
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search parameters as received from a client.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    /// Informational only.
    pub chain: String,
    pub pattern: String,
    /// Raw position parameter; unrecognised values mean prefix.
    pub position: Option<String>,
    /// Secondary pattern for `position = both`.
    pub suffix: Option<String>,
    pub count: Option<u32>,
    /// Legacy mode: search `pattern` as prefix, then as suffix, in two
    /// independent worker runs.
    pub dual: bool,
}

/// Ordered worker invocations plus their completion policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    invocations: Vec<InvocationSpec>,
    policy: CompletionPolicy,
    position: Position,
}

impl JobPlan {
    /// Build a plan from explicit invocations.
    pub fn new(
        invocations: Vec<InvocationSpec>,
        policy: CompletionPolicy,
        position: Position,
    ) -> Self {
        Self {
            invocations,
            policy,
            position,
        }
    }

    /// Resolve a request into a plan that runs `binary`.
    pub fn resolve(request: &JobRequest, binary: &Path) -> Result<Self> {
        let pattern = request.pattern.trim();
        if pattern.is_empty() {
            return Err(OrchestratorError::invalid_request("pattern must not be empty"));
        }

        if request.dual {
            if let Some(count) = request.count {
                debug!(count, "Ignoring count for dual search");
            }
            // Each phase stops at its first match so the plan finishes at
            // exactly one match per phase.
            return Ok(Self {
                invocations: vec![
                    InvocationSpec::single(binary, pattern, DEFAULT_MATCH_COUNT, Position::Prefix),
                    InvocationSpec::single(binary, pattern, DEFAULT_MATCH_COUNT, Position::Suffix),
                ],
                policy: CompletionPolicy::RaceToTwo,
                position: Position::Both,
            });
        }

        let count = request.count.unwrap_or(DEFAULT_MATCH_COUNT);
        if count == 0 {
            return Err(OrchestratorError::invalid_request(
                "count must be at least 1",
            ));
        }

        let position = Position::from_param(request.position.as_deref());
        match position {
            Position::Both => {
                let suffix = request
                    .suffix
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        OrchestratorError::invalid_request(
                            "suffix is required when position is both",
                        )
                    })?;

                Ok(Self {
                    invocations: vec![InvocationSpec::combined(binary, pattern, suffix, count)],
                    policy: CompletionPolicy::Combined,
                    position,
                })
            }
            Position::Prefix | Position::Suffix => Ok(Self {
                invocations: vec![InvocationSpec::single(binary, pattern, count, position)],
                policy: CompletionPolicy::Single,
                position,
            }),
        }
    }

    pub fn invocations(&self) -> &[InvocationSpec] {
        &self.invocations
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Position tag of the plan as a whole, used on session-level events.
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn phase_count(&self) -> usize {
        self.invocations.len()
    }
}
