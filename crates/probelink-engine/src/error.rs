//! Error types for engine operations

use thiserror::Error;

/// Errors produced by snippet compilation and execution
#[derive(Debug, Error)]
pub enum EngineError {
    /// The underlying runtime could not be constructed
    #[error("engine initialization failed: {0}")]
    Init(String),

    /// Compilation failed; one diagnostic per entry. Failed units are never
    /// cached, so a retry with the same source recompiles.
    #[error("compilation failed: {}", .0.join("; "))]
    Compile(Vec<String>),

    /// A runtime fault while invoking the entry point; carries the innermost
    /// cause. The host process and the unit cache are unaffected.
    #[error("execution fault: {0}")]
    Execution(String),
}
