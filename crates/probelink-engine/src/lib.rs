//! # Probelink Engine
//!
//! Turns source-text snippets into memoized, invokable units and runs them
//! against an injected name-to-value execution context. Snippets are WAT
//! function bodies assembled with `wat` and executed by `wasmtime`; the
//! context is exposed as mutable imported globals the snippet may read and
//! write freely.

#![warn(missing_docs)]

/// Execution context passed into every invocation
pub mod context;

/// Compile-cache-execute engine
pub mod engine;

/// Error types for engine operations
pub mod error;

pub use context::{ContextProvider, ExecutionContext};
pub use engine::{EngineConfig, ScriptEngine, ENTRY_POINT};
pub use error::EngineError;
