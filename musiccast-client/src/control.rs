//! Extended Control HTTP client.
//!
//! All vendor calls are GETs with query parameters against
//! `{presentation_url}/YamahaExtendedControl/v1/`. Replies are JSON
//! envelopes carrying a `response_code` field next to the requested data;
//! zero means success.

use serde_json::{Map, Value};
use url::Url;

use crate::error::{MusicCastError, Result};

/// `X-AppName` header value sent with every request.
pub const APP_NAME: &str = "MusicCast/1.50";

/// Default UDP event port, advertised to the device via `X-AppPort`.
pub const DEFAULT_EVENT_PORT: u16 = 41100;

/// HTTP client bound to one device's Extended Control endpoint.
///
/// `event_port` is advertised on every request through the `X-AppPort`
/// header; the device pushes its UDP events to that port, so it must
/// match the port the [`EventListener`](crate::EventListener) is bound to.
#[derive(Debug, Clone)]
pub struct ExtendedControlClient {
    base_url: Url,
    http: reqwest::Client,
    event_port: u16,
}

impl ExtendedControlClient {
    /// Derive the Extended Control base URL from a device's presentation
    /// URL and build the client.
    pub fn new(presentation_url: &Url, event_port: u16) -> Result<Self> {
        let base_url = join_segments(presentation_url, &["YamahaExtendedControl", "v1"])?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url,
            http,
            event_port,
        })
    }

    /// The derived Extended Control base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET an API path like `main/getStatus` and decode the envelope.
    pub async fn get(&self, path: &str) -> Result<Map<String, Value>> {
        self.get_with_query(path, &[]).await
    }

    /// GET an API path with query parameters and decode the envelope.
    ///
    /// Returns the reply object with `response_code` checked and removed;
    /// a non-zero code surfaces as [`MusicCastError::ControlError`].
    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Map<String, Value>> {
        let segments: Vec<&str> = path.split('/').collect();
        let url = join_segments(&self.base_url, &segments)?;

        let mut request = self
            .http
            .get(url)
            .header("X-AppName", APP_NAME)
            .header("X-AppPort", self.event_port.to_string());
        if !query.is_empty() {
            request = request.query(query);
        }

        let mut body: Map<String, Value> = request.send().await?.json().await?;
        match body.remove("response_code").and_then(|code| code.as_i64()) {
            Some(0) => Ok(body),
            Some(code) => Err(MusicCastError::ControlError(code)),
            None => Err(MusicCastError::Envelope(format!(
                "reply to {path} has no response_code"
            ))),
        }
    }

    /// `netusb/setPlayback?playback={action}`.
    pub async fn set_playback(&self, action: &str) -> Result<()> {
        self.get_with_query("netusb/setPlayback", &[("playback", action.to_string())])
            .await?;
        Ok(())
    }

    /// `main/setVolume?volume={volume}`.
    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        self.get_with_query("main/setVolume", &[("volume", volume.to_string())])
            .await?;
        Ok(())
    }

    /// `main/setVolume?volume={up|down}&step={step}`.
    pub async fn step_volume(&self, direction: &str, step: u8) -> Result<()> {
        self.get_with_query(
            "main/setVolume",
            &[
                ("volume", direction.to_string()),
                ("step", step.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    /// `main/setMute?enable={mute}`.
    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.get_with_query("main/setMute", &[("enable", mute.to_string())])
            .await?;
        Ok(())
    }
}

/// Append path segments to a URL, tolerating bases with or without a
/// trailing slash.
fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| MusicCastError::Url(format!("{base} cannot be a base URL")))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}
