//! Event translation for worker output.
//!
//! Decodes raw stdout lines into [`WorkerEvent`]s for one phase. Lines that
//! cannot be decoded are logged and dropped; they never reach the client.

use events::{Position, WorkerEvent};
use tracing::warn;

use crate::error::Result;

/// Translates the output of the worker running one phase.
#[derive(Debug, Clone, Copy)]
pub struct EventTranslator {
    position: Position,
}

impl EventTranslator {
    pub fn new(position: Position) -> Self {
        Self { position }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Decode a line, stamping `found` and `complete` events with this
    /// phase's position.
    pub fn decode(&self, line: &str) -> Result<WorkerEvent> {
        let mut event = WorkerEvent::decode(line)?;
        if matches!(event, WorkerEvent::Found(_) | WorkerEvent::Complete(_)) {
            event.tag_position(self.position);
        }
        Ok(event)
    }

    /// Like [`decode`](Self::decode), but malformed lines are logged and
    /// skipped. Blank lines are skipped silently.
    pub fn translate(&self, line: &str) -> Option<WorkerEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match self.decode(line) {
            Ok(event) => Some(event),
            Err(e) => {
                // The raw line may carry key material; only its size is logged.
                warn!(
                    position = %self.position,
                    error = %e,
                    line_len = line.len(),
                    "Dropping malformed worker output"
                );
                None
            }
        }
    }
}
