//! Job orchestration for vanity address searches
//!
//! Resolves client requests into worker invocations, runs the workers as
//! child processes and merges their output into a single event stream per
//! client session.

pub mod error;
pub mod plan;
pub mod resources;
pub mod session;
pub mod state_machine;
pub mod translator;
pub mod worker;

pub use error::{OrchestratorError, Result};
pub use plan::{CompletionPolicy, InvocationSpec, JobPlan, JobRequest, DEFAULT_MATCH_COUNT};
pub use session::{SessionController, SessionOutcome, SessionReport, SessionState};
pub use state_machine::{SessionPhase, SessionStateMachine};
pub use translator::EventTranslator;
pub use worker::{WorkerExit, WorkerProcess};
