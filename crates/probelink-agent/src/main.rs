//! Probelink agent binary.
//!
//! Wires the script engine, the executor, and the connection manager
//! together, then runs until Ctrl-C.

use std::time::{Duration, Instant};

use anyhow::Result;
use probelink_agent::connection::{ConnectionConfig, ConnectionManager, TcpConnector};
use probelink_agent::device;
use probelink_agent::dispatch::ExecutorTurn;
use probelink_agent::logcap::log_channel;
use probelink_engine::{ContextProvider, ExecutionContext, ScriptEngine};
use tracing::{error, info};

/// Process-level facts exposed to snippets as context bindings.
struct ProcessStatsProvider {
    started: Instant,
}

impl ContextProvider for ProcessStatsProvider {
    fn scan(&self) -> Vec<(String, i64)> {
        vec![
            ("pid".to_string(), i64::from(std::process::id())),
            (
                "uptime_secs".to_string(),
                self.started.elapsed().as_secs() as i64,
            ),
        ]
    }
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ConnectionConfig {
        server_addr: std::env::var("PROBELINK_SERVER")
            .unwrap_or_else(|_| "127.0.0.1:8002".to_string()),
        heartbeat_interval: env_duration_secs("PROBELINK_HEARTBEAT_SECS", 30),
        ..ConnectionConfig::default()
    };

    let engine = ScriptEngine::new()?;
    let mut context = ExecutionContext::with_provider(Box::new(ProcessStatsProvider {
        started: Instant::now(),
    }));
    context.rescan();

    let (capture, log_rx) = log_channel();
    let (tasks, executor) = ExecutorTurn::new(engine, context, capture.clone());
    tokio::spawn(executor.run());

    let info = device::collect(env!("CARGO_PKG_VERSION"));
    info!(device_id = %info.id, device_name = %info.device_name, "starting probelink agent");

    let (mut manager, _state) =
        ConnectionManager::new(TcpConnector, config, info, tasks, capture, log_rx);
    let shutdown = manager.shutdown_sender();
    let manager_handle = tokio::spawn(manager.run());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    if let Some(trigger) = shutdown {
        let _ = trigger.send(());
    }
    if let Err(err) = manager_handle.await? {
        error!("connection manager failed: {err}");
    }
    Ok(())
}
