//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A framed message failed to parse as the expected wire type
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A message failed to serialize for the wire
    #[error("encode error: {0}")]
    Encode(String),
}

impl ProtocolError {
    pub(crate) fn malformed(err: serde_json::Error) -> Self {
        Self::MalformedFrame(err.to_string())
    }

    pub(crate) fn encode(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
