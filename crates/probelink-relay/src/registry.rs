//! Connected-device bookkeeping.
//!
//! One entry per registered device id. A reconnecting agent reuses its id,
//! so an upsert may replace a stale entry whose session is already gone.

use std::collections::HashMap;
use std::sync::Arc;

use probelink_proto::{DeviceInfo, RelayCommand};
use tokio::sync::{mpsc, RwLock};

/// Registry entry for one live agent session.
#[derive(Debug, Clone)]
struct DeviceEntry {
    info: DeviceInfo,
    commands: mpsc::UnboundedSender<RelayCommand>,
}

/// Shared map of device id to live session.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, DeviceEntry>>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a device. Returns `true` when the id was not
    /// previously registered.
    pub async fn upsert(
        &self,
        info: DeviceInfo,
        commands: mpsc::UnboundedSender<RelayCommand>,
    ) -> bool {
        let mut devices = self.devices.write().await;
        devices
            .insert(info.id.clone(), DeviceEntry { info, commands })
            .is_none()
    }

    /// Removes a device. Returns `true` when an entry was present.
    pub async fn remove(&self, device_id: &str) -> bool {
        self.devices.write().await.remove(device_id).is_some()
    }

    /// Snapshot of every registered device, ordered by device name for
    /// stable presentation.
    pub async fn snapshot(&self) -> Vec<DeviceInfo> {
        let devices = self.devices.read().await;
        let mut infos: Vec<DeviceInfo> = devices.values().map(|e| e.info.clone()).collect();
        infos.sort_by(|a, b| a.device_name.cmp(&b.device_name).then(a.id.cmp(&b.id)));
        infos
    }

    /// Command channel for a device, if it is registered.
    pub async fn command_sender(
        &self,
        device_id: &str,
    ) -> Option<mpsc::UnboundedSender<RelayCommand>> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|e| e.commands.clone())
    }

    /// Number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether no device is registered.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, name: &str) -> DeviceInfo {
        DeviceInfo {
            id: id.to_string(),
            device_name: name.to_string(),
            device_model: "model".to_string(),
            operating_system: "linux".to_string(),
            processor_type: "x86_64".to_string(),
            system_memory_size: 0,
            graphics_device_name: "none".to_string(),
            agent_version: "0.1.0".to_string(),
            platform: "linux".to_string(),
            timestamp: "t0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_reports_new_vs_refresh() {
        let registry = DeviceRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(registry.upsert(info("a", "host-a"), tx.clone()).await);
        assert!(!registry.upsert(info("a", "host-a"), tx).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_name_ordered() {
        let registry = DeviceRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.upsert(info("2", "zebra"), tx.clone()).await;
        registry.upsert(info("1", "alpha"), tx).await;

        let names: Vec<String> = registry
            .snapshot()
            .await
            .into_iter()
            .map(|d| d.device_name)
            .collect();
        assert_eq!(names, vec!["alpha", "zebra"]);
    }

    #[tokio::test]
    async fn test_command_sender_routes_to_entry() {
        let registry = DeviceRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.upsert(info("a", "host-a"), tx).await;

        let sender = registry.command_sender("a").await.unwrap();
        sender
            .send(RelayCommand::ExecuteCode { code: "x".into() })
            .unwrap();
        assert!(rx.try_recv().is_ok());

        assert!(registry.command_sender("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = DeviceRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.upsert(info("a", "host-a"), tx).await;
        assert!(registry.remove("a").await);
        assert!(!registry.remove("a").await);
        assert!(registry.is_empty().await);
    }
}
