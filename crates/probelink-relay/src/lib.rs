//! # Probelink Relay
//!
//! The hub between on-target agents and observers. Agents connect over
//! plain TCP and stream framed JSON; observers connect over WebSocket and
//! pick which agent's output they see. The relay keeps a live device
//! registry, fans log records out to the observers watching the producing
//! device, and routes execute commands the other way.
//!
//! - [`registry`] — connected-device bookkeeping.
//! - [`state`] — shared routing state: registry plus observer sessions.
//! - [`tcp`] — the agent-facing TCP listener.
//! - [`gateway`] — the observer-facing axum WebSocket and REST surface.
//! - [`config`] — environment-driven configuration.

#![warn(missing_docs)]

pub mod config;
pub mod gateway;
pub mod registry;
pub mod state;
pub mod tcp;

pub use config::Config;
pub use state::RelayState;
