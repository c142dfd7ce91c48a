//! # musiccast-client
//!
//! Client for the MusicCast family of audio-streaming receivers. Control
//! traffic goes over the vendor's "Extended Control" HTTP surface; state
//! changes arrive as sparse JSON datagrams on a UDP port the device learns
//! from the `X-AppPort` request header.
//!
//! Each [`Device`] caches its own `Status` and `Playback` records. Inbound
//! events are reconciled against that cache under the device's lock --
//! inline fields are merged, `*_updated` flags trigger a refetch of the
//! affected record -- and the resulting minimal diff is published to an
//! [`event_broker::Broker`] keyed by device id.

mod control;
mod device;
mod error;
mod listener;
mod model;
mod registry;

pub use control::{ExtendedControlClient, APP_NAME, DEFAULT_EVENT_PORT};
pub use device::Device;
pub use error::{MusicCastError, Result};
pub use listener::EventListener;
pub use model::{
    Playback, PlaybackDelta, PlaybackState, Power, Repeat, Shuffle, StateDelta, Status,
    StatusDelta,
};
pub use registry::{AvTransportHandle, DeviceRegistry, RootDeviceCandidate};
