//! Probelink relay binary.
//!
//! Runs the agent-facing TCP listener and the observer-facing HTTP server
//! side by side over one shared [`RelayState`].

use anyhow::{Context, Result};
use probelink_relay::{gateway, tcp, Config, RelayState};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let state = RelayState::new();

    let agent_listener = TcpListener::bind(("0.0.0.0", config.tcp_port))
        .await
        .with_context(|| format!("binding agent listener on port {}", config.tcp_port))?;
    info!(port = config.tcp_port, "agent TCP listener bound");

    let tcp_state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = tcp::serve(tcp_state, agent_listener).await {
            error!("agent listener failed: {err}");
        }
    });

    let app = gateway::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());
    let http_listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("binding http listener on port {}", config.http_port))?;
    info!(port = config.http_port, "observer HTTP server bound");

    axum::serve(http_listener, app)
        .await
        .context("http server failed")?;
    Ok(())
}
