use std::path::Path;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ServerConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    session_slots: Option<Arc<Semaphore>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let session_slots = config
            .max_sessions
            .map(|limit| Arc::new(Semaphore::new(limit)));

        Self {
            config: Arc::new(config),
            session_slots,
        }
    }

    pub fn worker_binary(&self) -> &Path {
        &self.config.worker_binary
    }

    pub fn web_dir(&self) -> Option<&Path> {
        self.config.web_dir.as_deref()
    }

    /// Reserve a session slot. The slot is released when the returned permit
    /// is dropped; `None` means sessions are not capped.
    pub fn acquire_session(&self) -> Result<Option<OwnedSemaphorePermit>, AppError> {
        let Some(slots) = &self.session_slots else {
            return Ok(None);
        };

        Arc::clone(slots)
            .try_acquire_owned()
            .map(Some)
            .map_err(|_| {
                tracing::warn!("Session limit reached, rejecting request");
                AppError::ServiceUnavailable("Too many searches running, try again later".to_string())
            })
    }

    /// Sessions that could still be started, if capped.
    pub fn available_sessions(&self) -> Option<usize> {
        self.session_slots
            .as_ref()
            .map(|slots| slots.available_permits())
    }
}
