//! RAII resource guards for automatic cleanup.
//!
//! - [`ProcessGuard`] - Worker process reaping and kill-on-drop

mod process_guard;

pub use process_guard::ProcessGuard;
