//! Wire message types
//!
//! Three surfaces share these shapes: agent -> relay (framed JSON over TCP),
//! relay -> agent (same transport), and relay <-> observer (one JSON object
//! per WebSocket message). Field names are fixed by the wire format, hence
//! the camelCase renames.

use crate::ProtocolError;
use serde::{Deserialize, Serialize};

/// Log severity category, a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSeverity {
    /// Informational output
    Log,
    /// Recoverable anomaly
    Warning,
    /// Operation failure
    Error,
    /// Runtime fault with a captured cause
    Exception,
}

/// One observed log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Severity category (wire name `type`)
    #[serde(rename = "type")]
    pub severity: LogSeverity,
    /// Message text
    pub message: String,
    /// Stack or context text, empty when absent
    #[serde(default)]
    pub stack_trace: String,
    /// Producer-side timestamp string
    pub timestamp: String,
}

impl LogRecord {
    /// Create a record with the given severity and message
    pub fn new(
        severity: LogSeverity,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            stack_trace: stack_trace.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Declared metadata for one agent process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable install fingerprint; not guaranteed globally unique
    pub id: String,
    /// Host name
    pub device_name: String,
    /// Hardware model string
    pub device_model: String,
    /// Operating system description
    pub operating_system: String,
    /// Processor architecture
    pub processor_type: String,
    /// Total system memory in MiB, 0 when unknown
    pub system_memory_size: u64,
    /// Graphics device, `none` for headless processes
    pub graphics_device_name: String,
    /// Agent build version
    pub agent_version: String,
    /// Platform identifier
    pub platform: String,
    /// Announcement timestamp
    pub timestamp: String,
}

/// Messages an agent sends to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Device announcement; sent on connect and on every heartbeat
    DeviceInfo(DeviceInfo),
    /// One captured log event
    Log(LogRecord),
}

/// Commands the relay writes to an agent session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RelayCommand {
    /// Compile and run a source snippet on the agent
    ExecuteCode {
        /// Snippet source text
        code: String,
    },
}

/// Inbound messages from an observer session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverRequest {
    /// Set the session's selected agent; existence is not validated
    SelectDevice {
        /// Target device identifier
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    /// Forward a snippet to the session's selected agent
    ExecuteCode {
        /// Device identifier as sent by the observer UI. Routing uses the
        /// session's current selection; this field is accepted but ignored.
        #[serde(rename = "deviceId", default)]
        device_id: Option<String>,
        /// Snippet source text
        code: String,
    },
}

/// Outbound messages to an observer session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverEvent {
    /// Full device-list snapshot; sent on connect and on every registry
    /// mutation
    DeviceListUpdated {
        /// Current registry contents
        devices: Vec<DeviceInfo>,
    },
    /// Log event forwarded from a selected agent
    Log {
        /// Originating device identifier
        #[serde(rename = "deviceId")]
        device_id: String,
        /// The forwarded record
        data: LogRecord,
    },
}

/// Encode a wire message as a newline-terminated JSON line for the TCP
/// transport. The trailing newline is cosmetic for the framer but matches
/// what peers emit.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(message).map_err(ProtocolError::encode)?;
    line.push(b'\n');
    Ok(line)
}

/// Decode a framed message body
pub fn decode_frame<'a, T: Deserialize<'a>>(frame: &'a [u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(frame).map_err(ProtocolError::malformed)
}
