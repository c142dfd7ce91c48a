//! UDP event listener.
//!
//! MusicCast devices push sparse JSON events to the UDP port named by the
//! `X-AppPort` header of earlier HTTP requests. The listener decodes each
//! datagram, routes it to the owning device via the registry and hands it
//! to that device's reconciler. Bad datagrams and recoverable
//! reconciliation errors are logged and dropped; the loop never
//! terminates on them.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::registry::DeviceRegistry;

/// Largest datagram we accept; vendor events fit comfortably in one MTU.
const RECV_BUFFER_SIZE: usize = 1500;

/// UDP listener for inbound device events.
pub struct EventListener {
    socket: UdpSocket,
}

impl EventListener {
    /// Bind the listener on `0.0.0.0:{port}`.
    ///
    /// The port must match the `event_port` the devices were constructed
    /// with, or they will push events somewhere nobody listens.
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        Ok(Self { socket })
    }

    /// The locally bound port (useful when binding port 0 in tests).
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Receive and dispatch datagrams forever.
    pub async fn run(self, registry: Arc<DeviceRegistry>) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let len = match self.socket.recv_from(&mut buf).await {
                Ok((len, _)) => len,
                Err(e) => {
                    tracing::warn!(error = %e, "udp receive failed");
                    continue;
                }
            };

            let event: Map<String, Value> = match serde_json::from_slice(&buf[..len]) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping non-JSON datagram");
                    continue;
                }
            };

            let Some(device_id) = event.get("device_id").and_then(Value::as_str) else {
                tracing::debug!("dropping datagram without device_id");
                continue;
            };
            let Some(device) = registry.get(device_id).cloned() else {
                tracing::debug!(device_id, "dropping event for unknown device");
                continue;
            };

            if let Err(e) = device.apply_event(event).await {
                tracing::warn!(device = %device.id(), error = %e, "event reconciliation reported an error");
            }
        }
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self, registry: Arc<DeviceRegistry>) -> JoinHandle<()> {
        tokio::spawn(self.run(registry))
    }
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("local_addr", &self.socket.local_addr().ok())
            .finish()
    }
}
