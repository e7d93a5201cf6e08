//! Connection lifecycle towards the relay.
//!
//! The manager owns one session at a time: connect with a timeout, announce
//! device info, then pump logs out and commands in until the link breaks or
//! shutdown is requested. A broken link moves through `Reconnecting` and a
//! fixed delay before the next attempt. Log records produced while no
//! session is up are discarded.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use probelink_proto::{
    decode_frame, encode_line, AgentMessage, DeviceInfo, LogRecord, RelayCommand, StreamFramer,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::device;
use crate::dispatch::TaskQueue;
use crate::logcap::LogCapture;

/// Lifecycle states observable through the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no attempt in progress.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Session established.
    Connected,
    /// Session lost, waiting to retry.
    Reconnecting,
}

/// Tunables for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Relay address, `host:port`.
    pub server_addr: String,
    /// Ceiling on a single connection attempt.
    pub connect_timeout: Duration,
    /// Fixed delay between attempts after a failure.
    pub reconnect_delay: Duration,
    /// Period between device info re-announcements.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8002".to_string(),
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Dials the relay and yields a split transport.
///
/// The seam exists so session behavior is testable over in-memory pipes.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Inbound half of the transport.
    type Reader: AsyncRead + Unpin + Send;
    /// Outbound half of the transport.
    type Writer: AsyncWrite + Unpin + Send;

    /// Attempts one connection to `addr`.
    async fn connect(&self, addr: &str) -> std::io::Result<(Self::Reader, Self::Writer)>;
}

/// Production connector over plain TCP.
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Reader = tokio::net::tcp::OwnedReadHalf;
    type Writer = tokio::net::tcp::OwnedWriteHalf;

    async fn connect(&self, addr: &str) -> std::io::Result<(Self::Reader, Self::Writer)> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream.into_split())
    }
}

enum SessionEnd {
    Shutdown,
    IoError,
}

/// Drives the connect / session / reconnect loop.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: ConnectionConfig,
    info: DeviceInfo,
    tasks: TaskQueue,
    logs: mpsc::UnboundedReceiver<LogRecord>,
    // Held so the log channel never closes while the manager runs.
    _capture: LogCapture,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager and a watch handle over its state.
    pub fn new(
        connector: C,
        config: ConnectionConfig,
        info: DeviceInfo,
        tasks: TaskQueue,
        capture: LogCapture,
        logs: mpsc::UnboundedReceiver<LogRecord>,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            Self {
                connector,
                config,
                info,
                tasks,
                logs,
                _capture: capture,
                state_tx,
                shutdown_tx: Some(shutdown_tx),
                shutdown_rx: Some(shutdown_rx),
            },
            state_rx,
        )
    }

    /// Takes the shutdown trigger. Only available once.
    pub fn shutdown_sender(&mut self) -> Option<oneshot::Sender<()>> {
        self.shutdown_tx.take()
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    /// Runs until shutdown is signalled.
    pub async fn run(mut self) -> Result<()> {
        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .context("connection manager already started")?;
        info!(server = %self.config.server_addr, "starting connection manager");

        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = timeout(
                self.config.connect_timeout,
                self.connector.connect(&self.config.server_addr),
            )
            .await;

            match attempt {
                Ok(Ok((reader, writer))) => {
                    info!(server = %self.config.server_addr, "connected to relay");
                    self.set_state(ConnectionState::Connected);
                    match self.run_session(reader, writer, &mut shutdown_rx).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::IoError => self.set_state(ConnectionState::Reconnecting),
                    }
                }
                Ok(Err(err)) => {
                    warn!("connection attempt failed: {err}");
                    self.set_state(ConnectionState::Reconnecting);
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "connection attempt timed out"
                    );
                    self.set_state(ConnectionState::Reconnecting);
                }
            }

            // Wait out the retry delay, discarding records captured while
            // disconnected so a long outage cannot replay stale logs.
            let delay = sleep(self.config.reconnect_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        self.set_state(ConnectionState::Disconnected);
                        info!("connection manager stopped");
                        return Ok(());
                    }
                    _ = &mut delay => break,
                    _ = self.logs.recv() => {}
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("connection manager stopped");
        Ok(())
    }

    async fn run_session<R, W>(
        &mut self,
        mut reader: R,
        mut writer: W,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> SessionEnd
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        // Anything captured before this session is stale.
        while self.logs.try_recv().is_ok() {}

        if let Err(err) = send(&mut writer, &AgentMessage::DeviceInfo(self.fresh_info())).await {
            warn!("failed to announce device info: {err}");
            return SessionEnd::IoError;
        }

        let mut framer = StreamFramer::new();
        let period = self.config.heartbeat_interval;
        // Skip the immediate first tick; device info was just announced.
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut buf = [0u8; 4096];

        loop {
            tokio::select! {
                _ = &mut *shutdown_rx => {
                    return SessionEnd::Shutdown;
                }

                _ = heartbeat.tick() => {
                    debug!("heartbeat: re-announcing device info");
                    if let Err(err) = send(&mut writer, &AgentMessage::DeviceInfo(self.fresh_info())).await {
                        warn!("heartbeat send failed: {err}");
                        return SessionEnd::IoError;
                    }
                    // Provider bindings go stale between heartbeats; refresh
                    // them on the same cadence.
                    self.tasks.rescan();
                }

                record = self.logs.recv() => {
                    // The manager's own capture clone keeps the channel open.
                    let Some(record) = record else { return SessionEnd::Shutdown };
                    if let Err(err) = send(&mut writer, &AgentMessage::Log(record)).await {
                        warn!("log forward failed: {err}");
                        return SessionEnd::IoError;
                    }
                }

                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            info!("relay closed the connection");
                            return SessionEnd::IoError;
                        }
                        Ok(n) => {
                            framer.feed(&buf[..n]);
                            while let Some(frame) = framer.next_frame() {
                                self.dispatch_frame(&frame);
                            }
                            if framer.take_overflow() {
                                warn!("inbound buffer exceeded ceiling, discarded");
                            }
                        }
                        Err(err) => {
                            warn!("read error: {err}");
                            return SessionEnd::IoError;
                        }
                    }
                }
            }
        }
    }

    fn dispatch_frame(&self, frame: &[u8]) {
        match decode_frame::<RelayCommand>(frame) {
            Ok(RelayCommand::ExecuteCode { code }) => {
                debug!(bytes = code.len(), "queueing execute command");
                self.tasks.execute(code);
            }
            Err(err) => warn!("dropping malformed command frame: {err}"),
        }
    }

    fn fresh_info(&self) -> DeviceInfo {
        let mut info = self.info.clone();
        info.timestamp = device::timestamp_seconds();
        info
    }
}

async fn send<W>(writer: &mut W, message: &AgentMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_line(message)?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
