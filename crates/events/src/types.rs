//! Event types exchanged between search workers and streaming clients

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::DecodeError;

/// Which end of the address a search phase constrains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Prefix,
    Suffix,
    Both,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Prefix => "prefix",
            Position::Suffix => "suffix",
            Position::Both => "both",
        }
    }

    /// Lenient parse used for request parameters: anything unrecognised,
    /// including a missing value, is a prefix search.
    pub fn from_param(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(Position::Prefix),
            "suffix" => Ok(Position::Suffix),
            "both" => Ok(Position::Both),
            other => Err(format!("unknown position: {}", other)),
        }
    }
}

/// Stream opened; the search is starting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// Periodic attempt counter from a running worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub attempts: u64,
    /// Matches found so far when the worker searches for several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<u64>,
    /// One-based index of the match currently searched for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub searching_for: Option<u64>,
}

/// A matching address.
///
/// Only the public address and counters are kept. Key material the worker
/// prints alongside a match is discarded while decoding.
///
/// `position` is never read from worker output; the session fills it in
/// from the phase that produced the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundEvent {
    pub address: String,
    #[serde(default)]
    pub attempts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_attempts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_found: Option<u64>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub message: String,
}

const GENERIC_WORKER_ERROR: &str = "worker reported an error";

/// Every event a session can put on the client stream.
///
/// Records with a `type` this build does not know are kept as raw JSON in
/// [`WorkerEvent::Other`] and relayed unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerEvent {
    Connected(ConnectedEvent),
    Progress(ProgressEvent),
    Found(FoundEvent),
    Complete(CompleteEvent),
    Error(ErrorEvent),
    #[serde(untagged)]
    Other(Value),
}

impl WorkerEvent {
    /// Decode one line of worker output.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_value(value)
    }

    /// Classify an already parsed record by its `type` field.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => return Err(DecodeError::InvalidType),
            None => return Err(DecodeError::MissingType),
        };

        let shape = |source| DecodeError::Shape {
            kind: kind.clone(),
            source,
        };

        let event = match kind.as_str() {
            "connected" => WorkerEvent::Connected(serde_json::from_value(value).map_err(shape)?),
            "progress" => WorkerEvent::Progress(serde_json::from_value(value).map_err(shape)?),
            "found" => WorkerEvent::Found(serde_json::from_value(value).map_err(shape)?),
            "complete" => WorkerEvent::Complete(serde_json::from_value(value).map_err(shape)?),
            "error" => {
                let mut error: ErrorEvent = serde_json::from_value(value).map_err(shape)?;
                if error.message.trim().is_empty() {
                    error.message = GENERIC_WORKER_ERROR.to_string();
                }
                WorkerEvent::Error(error)
            }
            _ => WorkerEvent::Other(strip_key_material(value)),
        };

        Ok(event)
    }

    pub fn connected(message: impl Into<String>, position: Position) -> Self {
        WorkerEvent::Connected(ConnectedEvent {
            message: Some(message.into()),
            position: Some(position),
        })
    }

    pub fn complete(message: impl Into<String>, position: Position) -> Self {
        WorkerEvent::Complete(CompleteEvent {
            message: Some(message.into()),
            position: Some(position),
            ..Default::default()
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        WorkerEvent::Error(ErrorEvent {
            message: message.into(),
        })
    }

    /// The `type` label as it appears on the wire.
    pub fn kind(&self) -> &str {
        match self {
            WorkerEvent::Connected(_) => "connected",
            WorkerEvent::Progress(_) => "progress",
            WorkerEvent::Found(_) => "found",
            WorkerEvent::Complete(_) => "complete",
            WorkerEvent::Error(_) => "error",
            WorkerEvent::Other(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    /// `Complete` and `Error` end a session's output.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::Complete(_) | WorkerEvent::Error(_))
    }

    /// Overwrite the position of events that carry one.
    pub fn tag_position(&mut self, position: Position) {
        match self {
            WorkerEvent::Connected(event) => event.position = Some(position),
            WorkerEvent::Found(event) => event.position = Some(position),
            WorkerEvent::Complete(event) => event.position = Some(position),
            _ => {}
        }
    }

    /// Serialize to the JSON text placed in an SSE `data:` field.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Fields holding key material are never relayed, whatever the record type.
const KEY_MATERIAL_FIELDS: &[&str] = &["private_key", "secret_key", "keypair", "mnemonic"];

fn strip_key_material(mut value: Value) -> Value {
    if let Value::Object(fields) = &mut value {
        for field in KEY_MATERIAL_FIELDS {
            fields.remove(*field);
        }
    }
    value
}
