use thiserror::Error;

/// Why a line of worker output could not be turned into an event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("record has no type field")]
    MissingType,

    #[error("record type field is not a string")]
    InvalidType,

    #[error("malformed {kind} record: {source}")]
    Shape {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
