//! Shared routing state.
//!
//! [`RelayState`] is the single value cloned into every agent session and
//! observer session: the device registry on one side and the observer map
//! on the other. Fan-out and command routing meet here.

use std::sync::Arc;

use dashmap::DashMap;
use probelink_proto::{DeviceInfo, LogRecord, ObserverEvent, ObserverRequest, RelayCommand};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::registry::DeviceRegistry;

/// One observer session: its outbound event channel and its current
/// device selection.
#[derive(Clone)]
struct Observer {
    tx: mpsc::UnboundedSender<ObserverEvent>,
    selected: Arc<RwLock<Option<String>>>,
}

/// State shared by every session the relay serves.
#[derive(Clone, Default)]
pub struct RelayState {
    /// Connected-device registry.
    pub registry: DeviceRegistry,
    observers: Arc<DashMap<Uuid, Observer>>,
}

impl RelayState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or refreshes) a device, then broadcasts the new device
    /// list to every observer.
    pub async fn register_device(
        &self,
        info: DeviceInfo,
        commands: mpsc::UnboundedSender<RelayCommand>,
    ) {
        let device_id = info.id.clone();
        let device_name = info.device_name.clone();
        if self.registry.upsert(info, commands).await {
            info!(%device_id, %device_name, "device registered");
        } else {
            debug!(%device_id, "device announcement refreshed");
        }
        self.broadcast_device_list().await;
    }

    /// Drops a device and, if it was registered, broadcasts the shrunken
    /// device list.
    pub async fn remove_device(&self, device_id: &str) {
        if self.registry.remove(device_id).await {
            info!(%device_id, "device removed");
            self.broadcast_device_list().await;
        }
    }

    /// Sends the full registry snapshot to every observer.
    pub async fn broadcast_device_list(&self) {
        let devices = self.registry.snapshot().await;
        for entry in self.observers.iter() {
            let _ = entry.value().tx.send(ObserverEvent::DeviceListUpdated {
                devices: devices.clone(),
            });
        }
    }

    /// Forwards a log record to every observer currently watching
    /// `device_id`. Observers with no selection, or a different one, see
    /// nothing.
    pub async fn forward_log(&self, device_id: &str, record: LogRecord) {
        // Collect channels before touching the selection locks so no
        // DashMap guard is held across an await.
        let sessions: Vec<(mpsc::UnboundedSender<ObserverEvent>, Arc<RwLock<Option<String>>>)> =
            self.observers
                .iter()
                .map(|entry| (entry.value().tx.clone(), entry.value().selected.clone()))
                .collect();

        for (tx, selected) in sessions {
            let watching = selected.read().await.as_deref() == Some(device_id);
            if watching {
                let _ = tx.send(ObserverEvent::Log {
                    device_id: device_id.to_string(),
                    data: record.clone(),
                });
            }
        }
    }

    /// Attaches a new observer session and immediately sends it the
    /// current device list. Returns the session id and the event stream.
    pub async fn attach_observer(&self) -> (Uuid, mpsc::UnboundedReceiver<ObserverEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let devices = self.registry.snapshot().await;
        let _ = tx.send(ObserverEvent::DeviceListUpdated { devices });
        self.observers.insert(
            id,
            Observer {
                tx,
                selected: Arc::new(RwLock::new(None)),
            },
        );
        info!(observer = %id, "observer attached");
        (id, rx)
    }

    /// Detaches an observer session.
    pub fn detach_observer(&self, id: Uuid) {
        if self.observers.remove(&id).is_some() {
            info!(observer = %id, "observer detached");
        }
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Applies one observer request to the session that sent it.
    ///
    /// Selection is not validated against the registry; an execute with no
    /// usable target is dropped without an error reply.
    pub async fn handle_observer_request(&self, observer_id: Uuid, request: ObserverRequest) {
        match request {
            ObserverRequest::SelectDevice { device_id } => {
                let Some(selected) = self
                    .observers
                    .get(&observer_id)
                    .map(|entry| entry.selected.clone())
                else {
                    return;
                };
                debug!(observer = %observer_id, %device_id, "observer selected device");
                *selected.write().await = Some(device_id);
            }
            ObserverRequest::ExecuteCode { device_id: _, code } => {
                // Routing follows the session's selection, not the field
                // echoed by the observer UI.
                let Some(selected) = self
                    .observers
                    .get(&observer_id)
                    .map(|entry| entry.selected.clone())
                else {
                    return;
                };
                let target = selected.read().await.clone();
                let Some(target) = target else {
                    warn!(observer = %observer_id, "execute with no device selected, dropped");
                    return;
                };
                match self.registry.command_sender(&target).await {
                    Some(sender) => {
                        debug!(device_id = %target, bytes = code.len(), "routing execute command");
                        let _ = sender.send(RelayCommand::ExecuteCode { code });
                    }
                    None => {
                        warn!(device_id = %target, "execute for unknown device, dropped");
                    }
                }
            }
        }
    }
}
