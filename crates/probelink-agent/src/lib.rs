//! # Probelink Agent
//!
//! The on-target half of probelink. The agent keeps a persistent TCP
//! connection to the relay, announces its device identity, streams every
//! captured log record upstream, and executes code snippets pushed down
//! by observers.
//!
//! ## Architecture
//!
//! - [`connection`] — connection lifecycle: connect with timeout,
//!   heartbeat re-announcements, automatic reconnect with a fixed delay.
//! - [`dispatch`] — single-consumer task queue feeding the script engine.
//! - [`logcap`] — log capture handle; everything sent through it is
//!   forwarded to the relay while a session is up.
//! - [`device`] — stable device fingerprint and hardware description.

#![warn(missing_docs)]

pub mod connection;
pub mod device;
pub mod dispatch;
pub mod logcap;
