//! Session controller.
//!
//! Runs a [`JobPlan`] for one client connection: starts each worker in
//! turn, translates its output, applies the plan's merge policy and pushes
//! the resulting events into the client's channel. Phases run strictly one
//! after another; the next worker starts only once the previous one has
//! been reaped.
//!
//! The outbound channel doubles as the cancellation signal. When the
//! receiving side is dropped the active worker is killed and reaped and no
//! further events are produced.

use std::fmt;

use events::{Position, WorkerEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::plan::{CompletionPolicy, InvocationSpec, JobPlan};
use crate::state_machine::{SessionPhase, SessionStateMachine};
use crate::translator::EventTranslator;
use crate::worker::WorkerProcess;

pub const CONNECTED_MESSAGE: &str = "Starting search...";
pub const DONE_MESSAGE: &str = "Done";
pub const BOTH_FOUND_MESSAGE: &str = "Both addresses found";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A `complete` event was the last thing sent.
    Completed,
    /// An `error` event was the last thing sent.
    Failed,
    /// The plan ran out without every phase finding a match.
    Incomplete,
    /// The client went away before the plan finished.
    Disconnected,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Failed => "failed",
            SessionOutcome::Incomplete => "incomplete",
            SessionOutcome::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary returned once a session is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    pub found_count: usize,
    pub events_sent: usize,
}

/// Mutable state owned by a single session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Only ever incremented, once per forwarded `found` event.
    pub found_count: usize,
    pub current_invocation: usize,
    /// Set once a `complete` or `error` event has been sent.
    pub terminal: bool,
    phase: SessionPhase,
}

impl SessionState {
    fn new() -> Self {
        Self {
            found_count: 0,
            current_invocation: 0,
            terminal: false,
            phase: SessionPhase::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }
}

enum PhaseEnd {
    Continue,
    Stop(SessionOutcome),
}

pub struct SessionController {
    session_id: Uuid,
    plan: JobPlan,
    sink: mpsc::Sender<WorkerEvent>,
    state: SessionState,
    outcome: Option<SessionOutcome>,
    events_sent: usize,
}

impl SessionController {
    pub fn new(plan: JobPlan, sink: mpsc::Sender<WorkerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            plan,
            sink,
            state: SessionState::new(),
            outcome: None,
            events_sent: 0,
        }
    }

    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the plan to completion, failure or client disconnect.
    pub async fn run(mut self) -> SessionReport {
        let span = info_span!(
            "session",
            session_id = %self.session_id,
            policy = %self.plan.policy(),
            position = %self.plan.position(),
        );

        async move {
            let outcome = match self.drive().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Session aborted");
                    if !self.state.terminal && !self.emit(WorkerEvent::error(e.to_string())).await {
                        SessionOutcome::Disconnected
                    } else {
                        SessionOutcome::Failed
                    }
                }
            };

            info!(
                outcome = %outcome,
                found_count = self.state.found_count,
                events_sent = self.events_sent,
                "Session finished"
            );

            SessionReport {
                session_id: self.session_id,
                outcome,
                found_count: self.state.found_count,
                events_sent: self.events_sent,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> Result<SessionOutcome> {
        info!(phases = self.plan.phase_count(), "Session started");

        let greeting = WorkerEvent::connected(CONNECTED_MESSAGE, self.plan.position());
        if !self.emit(greeting).await {
            self.transition(SessionPhase::Terminal)?;
            return Ok(SessionOutcome::Disconnected);
        }

        let invocations = self.plan.invocations().to_vec();
        for (index, spec) in invocations.iter().enumerate() {
            if index > 0 {
                self.transition(SessionPhase::Advancing(index))?;
            }
            self.transition(SessionPhase::Running(index))?;
            self.state.current_invocation = index;

            if let PhaseEnd::Stop(outcome) = self.run_phase(index, spec).await? {
                self.transition(SessionPhase::Terminal)?;
                return Ok(outcome);
            }
        }

        self.transition(SessionPhase::Terminal)?;
        Ok(self.finish().await)
    }

    async fn run_phase(&mut self, index: usize, spec: &InvocationSpec) -> Result<PhaseEnd> {
        let translator = EventTranslator::new(spec.position());

        let mut worker = match WorkerProcess::spawn(spec).await {
            Ok(worker) => worker,
            Err(e) => {
                error!(phase = index, error = %e, "Worker launch failed");
                return Ok(self.fail(client_message(&e)).await);
            }
        };

        loop {
            let next = tokio::select! {
                line = worker.next_line() => Some(line),
                _ = self.sink.closed() => None,
            };

            let Some(line) = next else {
                info!(phase = index, "Client disconnected - stopping worker");
                stop_worker(&mut worker).await;
                return Ok(PhaseEnd::Stop(SessionOutcome::Disconnected));
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(phase = index, error = %e, "Failed to read worker output");
                    break;
                }
            };

            let Some(event) = translator.translate(&line) else {
                continue;
            };

            if self.state.terminal {
                debug!(
                    phase = index,
                    kind = event.kind(),
                    "Discarding worker output after terminal event"
                );
                continue;
            }

            let Some(event) = self.merge(event) else {
                continue;
            };

            let worker_error = matches!(event, WorkerEvent::Error(_));
            if !self.emit(event).await {
                info!(phase = index, "Client disconnected - stopping worker");
                stop_worker(&mut worker).await;
                return Ok(PhaseEnd::Stop(SessionOutcome::Disconnected));
            }

            if worker_error {
                warn!(phase = index, "Worker reported an error - abandoning plan");
                stop_worker(&mut worker).await;
                return Ok(PhaseEnd::Stop(SessionOutcome::Failed));
            }
        }

        self.transition(SessionPhase::Draining(index))?;

        let exit = tokio::select! {
            exit = worker.wait() => Some(exit),
            _ = self.sink.closed() => None,
        };

        let Some(exit) = exit else {
            info!(phase = index, "Client disconnected while worker was exiting");
            stop_worker(&mut worker).await;
            return Ok(PhaseEnd::Stop(SessionOutcome::Disconnected));
        };

        match exit {
            Ok(exit) if exit.success() => {
                debug!(phase = index, "Worker exited cleanly");
            }
            Ok(exit) => {
                warn!(
                    phase = index,
                    status = %exit.describe(),
                    stderr = ?exit.stderr_tail,
                    "Worker exited abnormally"
                );
                if !self.state.terminal {
                    let failure = OrchestratorError::WorkerFailure(exit.describe());
                    return Ok(self.fail(client_message(&failure)).await);
                }
            }
            Err(e) => {
                error!(phase = index, error = %e, "Failed to reap worker");
                if !self.state.terminal {
                    let failure = OrchestratorError::WorkerFailure(e.to_string());
                    return Ok(self.fail(client_message(&failure)).await);
                }
            }
        }

        if self.state.terminal {
            return Ok(PhaseEnd::Stop(
                self.outcome.unwrap_or(SessionOutcome::Completed),
            ));
        }

        Ok(PhaseEnd::Continue)
    }

    /// Apply the merge policy to a translated event. `None` means the event
    /// is not forwarded.
    fn merge(&mut self, event: WorkerEvent) -> Option<WorkerEvent> {
        match &event {
            WorkerEvent::Connected(_) => {
                debug!("Folding worker greeting into the session greeting");
                return None;
            }
            WorkerEvent::Progress(progress) => {
                trace!(attempts = progress.attempts, "Worker progress");
            }
            WorkerEvent::Found(found) => {
                self.state.found_count += 1;
                info!(
                    address = %found.address,
                    attempts = found.attempts,
                    position = ?found.position,
                    found_count = self.state.found_count,
                    "Address found"
                );
            }
            WorkerEvent::Complete(_) if self.plan.policy() == CompletionPolicy::RaceToTwo => {
                if self.every_phase_found() {
                    return Some(WorkerEvent::complete(BOTH_FOUND_MESSAGE, Position::Both));
                }
                debug!(
                    found_count = self.state.found_count,
                    "Suppressing per-phase completion"
                );
                return None;
            }
            _ => {}
        }

        Some(event)
    }

    /// Decide the terminal event once every invocation has run.
    async fn finish(&mut self) -> SessionOutcome {
        if self.state.terminal {
            return self.outcome.unwrap_or(SessionOutcome::Completed);
        }

        let completion = match self.plan.policy() {
            CompletionPolicy::RaceToTwo => {
                if !self.every_phase_found() {
                    info!(
                        found_count = self.state.found_count,
                        phases = self.plan.phase_count(),
                        "Plan finished without a match in every phase"
                    );
                    return SessionOutcome::Incomplete;
                }
                WorkerEvent::complete(BOTH_FOUND_MESSAGE, Position::Both)
            }
            CompletionPolicy::Single | CompletionPolicy::Combined => {
                debug!("Worker ended without a terminal record - synthesizing completion");
                WorkerEvent::complete(DONE_MESSAGE, self.plan.position())
            }
        };

        if self.emit(completion).await {
            SessionOutcome::Completed
        } else {
            SessionOutcome::Disconnected
        }
    }

    /// Emit an error event as the session's terminal event.
    async fn fail(&mut self, message: String) -> PhaseEnd {
        if self.emit(WorkerEvent::error(message)).await {
            PhaseEnd::Stop(SessionOutcome::Failed)
        } else {
            PhaseEnd::Stop(SessionOutcome::Disconnected)
        }
    }

    /// Send one event to the client. Returns `false` if the client is gone.
    async fn emit(&mut self, event: WorkerEvent) -> bool {
        let outcome = match &event {
            WorkerEvent::Complete(_) => Some(SessionOutcome::Completed),
            WorkerEvent::Error(_) => Some(SessionOutcome::Failed),
            _ => None,
        };

        if self.sink.send(event).await.is_err() {
            debug!("Client stream closed");
            return false;
        }

        self.events_sent += 1;
        if outcome.is_some() {
            self.state.terminal = true;
            self.outcome = outcome;
        }
        true
    }

    fn every_phase_found(&self) -> bool {
        self.state.found_count >= self.plan.phase_count()
    }

    fn transition(&mut self, to: SessionPhase) -> Result<()> {
        SessionStateMachine::validate_transition(&self.state.phase, &to)?;
        debug!(from = %self.state.phase, to = %to, "Session transition");
        self.state.phase = to;
        Ok(())
    }
}

/// Client-facing text for a failure. Paths and OS details stay in the log.
fn client_message(err: &OrchestratorError) -> String {
    match err {
        OrchestratorError::Launch { source, .. } => {
            format!("Failed to start search worker: {}", source.kind())
        }
        OrchestratorError::WorkerFailure(reason) => {
            format!("Search worker failed ({})", reason)
        }
        other => other.to_string(),
    }
}

async fn stop_worker(worker: &mut WorkerProcess) {
    match worker.terminate().await {
        Ok(exit) => debug!(pid = ?worker.pid(), status = %exit.describe(), "Worker stopped"),
        Err(e) => warn!(pid = ?worker.pid(), error = %e, "Failed to stop worker"),
    }
}
