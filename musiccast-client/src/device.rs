//! Per-device state cache and event reconciliation.

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use event_broker::{Broker, Subscription};

use crate::control::ExtendedControlClient;
use crate::error::{MusicCastError, Result};
use crate::model::{Playback, StateDelta, Status};
use crate::registry::{AvTransportHandle, RootDeviceCandidate};

#[derive(Debug, Clone, Default)]
struct DeviceState {
    status: Status,
    playback: Playback,
}

/// A single MusicCast receiver.
///
/// Identity is immutable after the initial sync; `Status` and `Playback`
/// live behind one async mutex so that reconciliations -- including any
/// refetch GETs and the diff publish -- are serialized per device.
pub struct Device {
    id: String,
    model: String,
    network_name: String,
    control: ExtendedControlClient,
    av_transport: AvTransportHandle,
    broker: Broker<StateDelta>,
    state: Mutex<DeviceState>,
}

impl Device {
    /// Create a device from a discovery candidate and hydrate its state.
    ///
    /// Issues, in order: `system/getDeviceInfo`, `system/getNetworkStatus`,
    /// `main/getStatus`, `netusb/getPlayInfo`. `event_port` must match the
    /// UDP listener's port -- the device pushes events to whatever port the
    /// `X-AppPort` header named.
    pub async fn new(
        candidate: RootDeviceCandidate,
        event_port: u16,
        broker: Broker<StateDelta>,
    ) -> Result<Self> {
        let control = ExtendedControlClient::new(&candidate.presentation_url, event_port)?;

        let info = control.get("system/getDeviceInfo").await?;
        let id = string_field(&info, "device_id")?;
        let model = string_field(&info, "model_name")?;

        let network = control.get("system/getNetworkStatus").await?;
        let network_name = string_field(&network, "network_name")?;

        let status = fetch_status(&control).await?;
        let playback = fetch_playback(&control).await?;

        Ok(Self {
            id,
            model,
            network_name,
            control,
            av_transport: candidate.av_transport,
            broker,
            state: Mutex::new(DeviceState { status, playback }),
        })
    }

    /// Vendor device id; also the broker topic for this device.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Model name reported by `system/getDeviceInfo`.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Network name reported by `system/getNetworkStatus`.
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// The device's AVTransport handle.
    pub fn av_transport(&self) -> &AvTransportHandle {
        &self.av_transport
    }

    /// Snapshot of the cached main-zone status.
    pub async fn status(&self) -> Status {
        self.state.lock().await.status.clone()
    }

    /// Snapshot of the cached playback info.
    pub async fn playback(&self) -> Playback {
        self.state.lock().await.playback.clone()
    }

    /// Subscribe to this device's state-change diffs.
    pub fn subscribe(&self) -> Subscription<StateDelta> {
        self.broker.subscribe(&self.id)
    }

    /// Begin playback of the current track.
    pub async fn play(&self) -> Result<()> {
        self.control.set_playback("play").await
    }

    /// Pause playback of the current track.
    pub async fn pause(&self) -> Result<()> {
        self.control.set_playback("pause").await
    }

    /// Toggle between play and pause.
    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.control.set_playback("play_pause").await
    }

    /// Skip to the next track.
    pub async fn next(&self) -> Result<()> {
        self.control.set_playback("next").await
    }

    /// Skip to the previous track.
    pub async fn previous(&self) -> Result<()> {
        self.control.set_playback("previous").await
    }

    /// Set the main-zone volume.
    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        self.control.set_volume(volume).await
    }

    /// Raise the volume by `step`.
    pub async fn increase_volume(&self, step: u8) -> Result<()> {
        self.control.step_volume("up", step).await
    }

    /// Lower the volume by `step`.
    pub async fn decrease_volume(&self, step: u8) -> Result<()> {
        self.control.step_volume("down", step).await
    }

    /// Mute or unmute the main zone.
    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.control.set_mute(mute).await
    }

    /// Reconcile one inbound event against the cached state.
    ///
    /// Under the device's lock: verify `device_id`, consume the
    /// `main`/`netusb` sub-maps (refetch flags trigger a GET of the
    /// affected record, remaining fields merge by name), then publish the
    /// structural diff to the broker if anything changed. Unconsumed
    /// top-level keys surface as `UnhandledEventFragment` *after* the diff
    /// has been applied and published.
    pub async fn apply_event(&self, mut event: Map<String, Value>) -> Result<Option<StateDelta>> {
        match event.remove("device_id") {
            Some(Value::String(id)) if id == self.id => {}
            other => {
                return Err(MusicCastError::UnmatchedDeviceId {
                    expected: self.id.clone(),
                    received: other.as_ref().and_then(Value::as_str).map(str::to_owned),
                })
            }
        }

        let mut state = self.state.lock().await;
        let old = state.clone();

        if let Some(main) = event.remove("main") {
            match main {
                Value::Object(mut main) => {
                    if flag_set(main.remove("status_updated")) {
                        state.status = fetch_status(&self.control).await?;
                    }
                    main.remove("signal_info_updated");
                    for (key, value) in &main {
                        if !state.status.merge_field(key, value) {
                            tracing::warn!(device = %self.id, field = %key, "dropping unrecognized status field");
                        }
                    }
                }
                other => {
                    // Not a sub-map; leave it for the fragment check.
                    event.insert("main".to_string(), other);
                }
            }
        }

        if let Some(netusb) = event.remove("netusb") {
            match netusb {
                Value::Object(mut netusb) => {
                    if flag_set(netusb.remove("play_info_updated")) {
                        state.playback = fetch_playback(&self.control).await?;
                    }
                    netusb.remove("recent_updated");
                    if let Some(Value::Object(mut play_queue)) = netusb.remove("play_queue") {
                        // Only the change flag is meaningful; the queue
                        // itself is not mirrored locally.
                        play_queue.remove("updated");
                    }
                    for (key, value) in &netusb {
                        if !state.playback.merge_field(key, value) {
                            tracing::warn!(device = %self.id, field = %key, "dropping unrecognized playback field");
                        }
                    }
                }
                other => {
                    event.insert("netusb".to_string(), other);
                }
            }
        }

        let delta = StateDelta {
            main: state.status.diff(&old.status),
            netusb: state.playback.diff(&old.playback),
        };
        let delta = if delta.is_empty() {
            None
        } else {
            self.broker.publish(&self.id, delta.clone()).await;
            Some(delta)
        };

        if !event.is_empty() {
            return Err(MusicCastError::UnhandledEventFragment(
                event.keys().cloned().collect(),
            ));
        }

        Ok(delta)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("network_name", &self.network_name)
            .finish()
    }
}

fn flag_set(value: Option<Value>) -> bool {
    value == Some(Value::Bool(true))
}

fn string_field(reply: &Map<String, Value>, name: &str) -> Result<String> {
    reply
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| MusicCastError::Envelope(format!("reply is missing {name}")))
}

async fn fetch_status(control: &ExtendedControlClient) -> Result<Status> {
    let reply = control.get("main/getStatus").await?;
    serde_json::from_value(Value::Object(reply))
        .map_err(|e| MusicCastError::Envelope(format!("invalid status reply: {e}")))
}

async fn fetch_playback(control: &ExtendedControlClient) -> Result<Playback> {
    let reply = control.get("netusb/getPlayInfo").await?;
    serde_json::from_value(Value::Object(reply))
        .map_err(|e| MusicCastError::Envelope(format!("invalid play info reply: {e}")))
}
