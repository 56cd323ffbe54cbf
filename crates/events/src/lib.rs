//! Event vocabulary for vanity search sessions
//!
//! This crate defines the records a search worker prints on stdout and the
//! events a session forwards to its streaming client.

mod error;
mod types;

pub use error::DecodeError;
pub use types::*;
