//! Agent-facing TCP listener.
//!
//! Each accepted connection runs one agent session: the read side feeds the
//! stream framer and turns frames into registry updates and log fan-out,
//! while a writer task drains the session's command channel back to the
//! agent as newline-terminated JSON.

use anyhow::Result;
use probelink_proto::{decode_frame, encode_line, AgentMessage, RelayCommand, StreamFramer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::RelayState;

/// Accepts agent connections until the listener fails.
pub async fn serve(state: RelayState, listener: TcpListener) -> Result<()> {
    info!(addr = %listener.local_addr()?, "agent listener ready");
    loop {
        let (stream, addr) = listener.accept().await?;
        info!(%addr, "agent connected");
        let state = state.clone();
        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            run_agent_session(state, reader, writer).await;
            info!(%addr, "agent session ended");
        });
    }
}

/// Runs one agent session over an arbitrary transport.
///
/// Returns when the agent disconnects or the transport errors; the device
/// is deregistered on the way out if it ever announced itself.
pub async fn run_agent_session<R, W>(state: RelayState, mut reader: R, writer: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<RelayCommand>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(command) = cmd_rx.recv().await {
            let line = match encode_line(&command) {
                Ok(line) => line,
                Err(err) => {
                    warn!("command encode failed: {err}");
                    continue;
                }
            };
            if writer.write_all(&line).await.is_err() || writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut framer = StreamFramer::new();
    let mut registered: Option<String> = None;
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                framer.feed(&buf[..n]);
                while let Some(frame) = framer.next_frame() {
                    match decode_frame::<AgentMessage>(&frame) {
                        Ok(AgentMessage::DeviceInfo(info)) => {
                            registered = Some(info.id.clone());
                            state.register_device(info, cmd_tx.clone()).await;
                        }
                        Ok(AgentMessage::Log(record)) => match &registered {
                            Some(device_id) => state.forward_log(device_id, record).await,
                            None => debug!("log before device announcement, dropped"),
                        },
                        Err(err) => warn!("malformed agent frame: {err}"),
                    }
                }
                if framer.take_overflow() {
                    warn!("agent stream exceeded buffer ceiling, discarded");
                }
            }
            Err(err) => {
                warn!("agent read error: {err}");
                break;
            }
        }
    }

    writer_task.abort();
    if let Some(device_id) = registered {
        state.remove_device(&device_id).await;
    }
}
