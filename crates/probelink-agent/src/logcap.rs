//! Log capture and local retention.
//!
//! [`LogCapture`] is a cheap clone-anywhere handle. Records pushed through
//! it land on an unbounded channel whose sole consumer is the connection
//! manager, which forwards them to the relay while a session is up and
//! discards them otherwise.
//!
//! [`LogBuffer`] is the retention half of the surface: embedding hosts that
//! ship an inspection window keep one and feed it from their own capture
//! tap. Nothing in the agent binary reads it.

use std::collections::VecDeque;

use probelink_proto::{LogRecord, LogSeverity};
use tokio::sync::mpsc;

use crate::device;

/// Maximum number of records [`LogBuffer`] retains before evicting the
/// oldest entry.
pub const MAX_RETAINED: usize = 1000;

/// Creates a capture handle and the receiving end of its channel.
pub fn log_channel() -> (LogCapture, mpsc::UnboundedReceiver<LogRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LogCapture { tx }, rx)
}

/// Handle for emitting log records into the outbound stream.
#[derive(Debug, Clone)]
pub struct LogCapture {
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl LogCapture {
    /// Emits an informational record.
    pub fn log(&self, message: impl Into<String>) {
        self.emit(LogSeverity::Log, message.into(), String::new());
    }

    /// Emits a warning record.
    pub fn warning(&self, message: impl Into<String>) {
        self.emit(LogSeverity::Warning, message.into(), String::new());
    }

    /// Emits an error record.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogSeverity::Error, message.into(), String::new());
    }

    /// Emits an exception record with an optional stack trace.
    pub fn exception(&self, message: impl Into<String>, stack_trace: impl Into<String>) {
        self.emit(LogSeverity::Exception, message.into(), stack_trace.into());
    }

    fn emit(&self, severity: LogSeverity, message: String, stack_trace: String) {
        let record = LogRecord::new(severity, message, stack_trace, device::timestamp_millis());
        // Receiver dropped means the agent is shutting down.
        let _ = self.tx.send(record);
    }
}

/// Bounded FIFO of recent records, for local inspection.
///
/// Holds at most [`MAX_RETAINED`] entries; pushing beyond that evicts the
/// oldest record first.
#[derive(Debug, Default)]
pub struct LogBuffer {
    entries: VecDeque<LogRecord>,
}

impl LogBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, evicting the oldest one at capacity.
    pub fn push(&mut self, record: LogRecord) {
        if self.entries.len() == MAX_RETAINED {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Iterates records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.entries.iter()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all retained records.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
