//! # Probelink Protocol
//!
//! Wire message types and the byte-stream framer shared by the probelink
//! agent and relay.

#![warn(missing_docs)]

/// Brace-depth stream framing
pub mod framer;

/// Wire message types
pub mod message;

/// Error types for protocol operations
pub mod error;

pub use error::ProtocolError;
pub use framer::{StreamFramer, MAX_BUFFER};
pub use message::{
    decode_frame, encode_line, AgentMessage, DeviceInfo, LogRecord, LogSeverity, ObserverEvent,
    ObserverRequest, RelayCommand,
};
