//! Environment-driven configuration.

use std::env;

/// Relay listen configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the agent-facing TCP listener.
    pub tcp_port: u16,
    /// Port for the observer-facing HTTP/WebSocket server.
    pub http_port: u16,
}

impl Config {
    /// Reads configuration from the environment, falling back to defaults
    /// for unset or unparseable values.
    pub fn from_env() -> Self {
        Self {
            tcp_port: env::var("PROBELINK_TCP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8002),
            http_port: env::var("PROBELINK_HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcp_port: 8002,
            http_port: 3001,
        }
    }
}
