//! Strongly-typed device state records and their sparse deltas.
//!
//! Field names match the vendor's wire names, so the records deserialize
//! straight out of Extended Control replies and UDP event fragments.
//! Every record has a hand-written delta type: all-`Option` mirrors whose
//! populated fields are exactly the ones that changed. A [`StateDelta`]
//! serializes to the sparse map consumers see on the broker, keyed by the
//! event sub-map names (`main`, `netusb`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Power state of the main zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Power {
    On,
    Off,
    #[default]
    Standby,
}

/// Transport state reported by the network/USB source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Play,
    Pause,
    #[default]
    Stop,
    FastReverse,
    FastForward,
}

/// Repeat mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    #[default]
    Off,
    One,
    All,
}

/// Shuffle mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Shuffle {
    #[default]
    Off,
    On,
    Songs,
    Albums,
}

/// Main-zone status, seeded by `main/getStatus` and updated from the
/// `main` sub-map of UDP events.
///
/// `volume` ranges over `0..=max_volume` on a well-behaved device, but
/// inbound state is stored as received, without clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Status {
    pub input: String,
    pub power: Power,
    pub sleep: u8,
    pub volume: u8,
    pub mute: bool,
    pub max_volume: u8,
}

/// Playback info, seeded by `netusb/getPlayInfo` and updated from the
/// `netusb` sub-map of UDP events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Playback {
    pub input: String,
    pub playback: PlaybackState,
    pub repeat: Repeat,
    pub shuffle: Shuffle,
    pub play_time: i32,
    pub total_time: i32,
    pub artist: String,
    pub album: String,
    pub albumart_url: String,
    pub track: String,
}

/// Sparse mirror of [`Status`]: populated fields are the changed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatusDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<Power>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_volume: Option<u8>,
}

/// Sparse mirror of [`Playback`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlaybackDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback: Option<PlaybackState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Repeat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shuffle: Option<Shuffle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_time: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub albumart_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

/// The diff published to the broker after one reconciliation, keyed the
/// way the vendor keys its event sub-maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StateDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<StatusDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netusb: Option<PlaybackDelta>,
}

impl StateDelta {
    /// True when no field changed in either record.
    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.netusb.is_none()
    }
}

fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
    (old != new).then(|| new.clone())
}

impl Status {
    /// Fields of `self` that differ from `old`, or `None` if nothing did.
    pub fn diff(&self, old: &Status) -> Option<StatusDelta> {
        let delta = StatusDelta {
            input: changed(&old.input, &self.input),
            power: changed(&old.power, &self.power),
            sleep: changed(&old.sleep, &self.sleep),
            volume: changed(&old.volume, &self.volume),
            mute: changed(&old.mute, &self.mute),
            max_volume: changed(&old.max_volume, &self.max_volume),
        };
        (delta != StatusDelta::default()).then_some(delta)
    }

    /// Overwrite one field from an untyped event value.
    ///
    /// Returns `false` when the key is unknown or the value does not fit
    /// the field's type; the caller drops such fields.
    pub(crate) fn merge_field(&mut self, key: &str, value: &Value) -> bool {
        match key {
            "input" => assign_string(&mut self.input, value),
            "power" => assign_parsed(&mut self.power, value),
            "sleep" => assign_u8(&mut self.sleep, value),
            "volume" => assign_u8(&mut self.volume, value),
            "mute" => assign_bool(&mut self.mute, value),
            "max_volume" => assign_u8(&mut self.max_volume, value),
            _ => false,
        }
    }
}

impl Playback {
    /// Fields of `self` that differ from `old`, or `None` if nothing did.
    pub fn diff(&self, old: &Playback) -> Option<PlaybackDelta> {
        let delta = PlaybackDelta {
            input: changed(&old.input, &self.input),
            playback: changed(&old.playback, &self.playback),
            repeat: changed(&old.repeat, &self.repeat),
            shuffle: changed(&old.shuffle, &self.shuffle),
            play_time: changed(&old.play_time, &self.play_time),
            total_time: changed(&old.total_time, &self.total_time),
            artist: changed(&old.artist, &self.artist),
            album: changed(&old.album, &self.album),
            albumart_url: changed(&old.albumart_url, &self.albumart_url),
            track: changed(&old.track, &self.track),
        };
        (delta != PlaybackDelta::default()).then_some(delta)
    }

    /// Overwrite one field from an untyped event value.
    pub(crate) fn merge_field(&mut self, key: &str, value: &Value) -> bool {
        match key {
            "input" => assign_string(&mut self.input, value),
            "playback" => assign_parsed(&mut self.playback, value),
            "repeat" => assign_parsed(&mut self.repeat, value),
            "shuffle" => assign_parsed(&mut self.shuffle, value),
            "play_time" => assign_i32(&mut self.play_time, value),
            "total_time" => assign_i32(&mut self.total_time, value),
            "artist" => assign_string(&mut self.artist, value),
            "album" => assign_string(&mut self.album, value),
            "albumart_url" => assign_string(&mut self.albumart_url, value),
            "track" => assign_string(&mut self.track, value),
            _ => false,
        }
    }
}

fn assign_string(slot: &mut String, value: &Value) -> bool {
    match value.as_str() {
        Some(s) => {
            *slot = s.to_owned();
            true
        }
        None => false,
    }
}

fn assign_bool(slot: &mut bool, value: &Value) -> bool {
    match value.as_bool() {
        Some(b) => {
            *slot = b;
            true
        }
        None => false,
    }
}

fn assign_u8(slot: &mut u8, value: &Value) -> bool {
    match value.as_u64().and_then(|n| u8::try_from(n).ok()) {
        Some(n) => {
            *slot = n;
            true
        }
        None => false,
    }
}

fn assign_i32(slot: &mut i32, value: &Value) -> bool {
    match value.as_i64().and_then(|n| i32::try_from(n).ok()) {
        Some(n) => {
            *slot = n;
            true
        }
        None => false,
    }
}

fn assign_parsed<T: serde::de::DeserializeOwned>(slot: &mut T, value: &Value) -> bool {
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}
