//! Device registry and the discovery boundary types.
//!
//! UPnP/SSDP discovery itself is an external collaborator; it hands this
//! crate a presentation URL and an AVTransport handle per MediaRenderer
//! candidate. The registry indexes the devices that survive their initial
//! sync, keyed by vendor device id, for UDP event demultiplexing.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use event_broker::Broker;

use crate::device::Device;
use crate::model::StateDelta;

/// Opaque handle to a device's AVTransport service.
///
/// Transport operations are not part of this crate; the handle is carried
/// per device for collaborators that speak AVTransport themselves.
#[derive(Debug, Clone)]
pub struct AvTransportHandle {
    control_url: Url,
}

impl AvTransportHandle {
    pub fn new(control_url: Url) -> Self {
        Self { control_url }
    }

    pub fn control_url(&self) -> &Url {
        &self.control_url
    }
}

/// One UPnP MediaRenderer root-device candidate, as produced by discovery.
#[derive(Debug, Clone)]
pub struct RootDeviceCandidate {
    /// The device's presentation URL; the Extended Control base is
    /// derived from it
    pub presentation_url: Url,
    /// AVTransport handle for this device
    pub av_transport: AvTransportHandle,
}

/// Index of available devices by vendor device id.
///
/// Written once while discovery runs, read-only afterwards.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Arc<Device>>,
}

impl DeviceRegistry {
    /// Build a registry by syncing every candidate.
    ///
    /// Candidates whose initial sync fails are logged and skipped; the
    /// rest are indexed by device id.
    pub async fn from_candidates(
        candidates: Vec<RootDeviceCandidate>,
        event_port: u16,
        broker: &Broker<StateDelta>,
    ) -> Self {
        let mut devices = HashMap::new();
        for candidate in candidates {
            match Device::new(candidate, event_port, broker.clone()).await {
                Ok(device) => {
                    tracing::info!(id = %device.id(), model = %device.model(), "musiccast device available");
                    devices.insert(device.id().to_owned(), Arc::new(device));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping device that failed initial sync");
                }
            }
        }
        Self { devices }
    }

    /// Look up a device by id.
    pub fn get(&self, device_id: &str) -> Option<&Arc<Device>> {
        self.devices.get(device_id)
    }

    /// Iterate over all registered devices.
    pub fn devices(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no device survived discovery.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = DeviceRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_av_transport_handle_is_opaque_but_inspectable() {
        let url = Url::parse("http://192.168.1.50:8080/AVTransport/ctrl").unwrap();
        let handle = AvTransportHandle::new(url.clone());
        assert_eq!(handle.control_url(), &url);
    }
}
