//! Framed-WebSocket session client.
//!
//! The protocol is half-duplex for synchronous calls: at most one request
//! is outstanding, and its response comes back through a single-slot queue
//! filled by the reader task. Push event tables never enter that queue --
//! the slot's element type cannot represent them -- they are decoded in the
//! reader and published straight to the broker, keyed by entity UUID.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use event_broker::Broker;

use crate::error::{MiniserverError, Result};
use crate::events::{
    decode_daytimer_table, decode_text_table, decode_value_table, decode_weather_table, EventTable,
    PushEvent,
};
use crate::frame::{FrameHeader, MessageKind, FRAME_MAGIC, HEADER_LEN};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything the reader may hand to a waiting caller.
///
/// Event tables are deliberately unrepresentable here; they bypass the
/// slot entirely.
#[derive(Debug)]
enum ResponseFrame {
    /// Decoded `{"LL":{...}}` envelope
    Envelope {
        control: String,
        value: serde_json::Value,
    },
    /// Raw binary-file payload
    Binary(Vec<u8>),
}

/// Client for a single Miniserver session.
///
/// `connect` opens the socket and starts the reader; the client is not
/// usable for control traffic until [`authenticate`](Self::authenticate)
/// has completed. Push notifications start flowing after
/// [`enable_status_update`](Self::enable_status_update) and are published
/// to the broker handle given at construction, one message per decoded
/// event-table entry, keyed by the entity's UUID string.
pub struct MiniserverClient {
    writer: Mutex<SplitSink<WsStream, Message>>,
    slot: Mutex<mpsc::Receiver<Result<ResponseFrame>>>,
    reader: JoinHandle<()>,
    closed: AtomicBool,
}

impl MiniserverClient {
    /// Connect to `ws://{host}/ws/rfc6455` with the `remotecontrol`
    /// subprotocol and start the reader task.
    pub async fn connect(host: &str, broker: Broker<PushEvent>) -> Result<Self> {
        let mut request = format!("ws://{host}/ws/rfc6455").into_client_request()?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static("remotecontrol"),
        );

        let (socket, _) = connect_async(request).await?;
        let (writer, stream) = socket.split();

        let (slot_tx, slot_rx) = mpsc::channel(1);
        let reader = tokio::spawn(run_reader(stream, slot_tx, broker));

        Ok(Self {
            writer: Mutex::new(writer),
            slot: Mutex::new(slot_rx),
            reader,
            closed: AtomicBool::new(false),
        })
    }

    /// Authenticate the session with the given credentials.
    ///
    /// Fetches the session key via `jdev/sys/getkey`, computes
    /// `hex(hmac_sha1(key, "user:pass"))` and submits it with
    /// `authenticate/<digest>`. A non-success code from the server is
    /// surfaced verbatim as [`MiniserverError::ControlError`]; local
    /// digest failures map to [`MiniserverError::AuthFailed`]. The session
    /// stays usable for another attempt either way.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        let key = self.command("jdev/sys/getkey").await?;
        let key = key
            .as_str()
            .ok_or_else(|| MiniserverError::AuthFailed("session key is not a string".into()))?;
        let key = hex::decode(key)
            .map_err(|e| MiniserverError::AuthFailed(format!("session key is not hex: {e}")))?;

        let mut mac = Hmac::<Sha1>::new_from_slice(&key)
            .map_err(|e| MiniserverError::AuthFailed(e.to_string()))?;
        mac.update(format!("{username}:{password}").as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());

        self.command(&format!("authenticate/{digest}")).await?;
        Ok(())
    }

    /// Fetch and decode the server's structure file (`data/LoxApp3.json`).
    pub async fn lox_app3(&self) -> Result<serde_json::Value> {
        match self.call("data/LoxApp3.json").await? {
            ResponseFrame::Binary(data) => serde_json::from_slice(&data).map_err(|e| {
                MiniserverError::UnexpectedResponse(format!("structure file is not JSON: {e}"))
            }),
            ResponseFrame::Envelope { .. } => Err(MiniserverError::UnexpectedResponse(
                "expected a binary structure file, got an envelope".into(),
            )),
        }
    }

    /// Ask the server to start pushing binary status updates.
    pub async fn enable_status_update(&self) -> Result<()> {
        self.command("jdev/sps/enablebinstatusupdate").await?;
        Ok(())
    }

    /// Issue `jdev/sps/io/{uuid}/{verb}` against a single entity.
    pub async fn control_command(&self, uuid: &str, verb: &str) -> Result<serde_json::Value> {
        self.command(&format!("jdev/sps/io/{uuid}/{verb}")).await
    }

    /// Send a plain synchronous command and return the envelope value.
    pub async fn command(&self, cmd: &str) -> Result<serde_json::Value> {
        match self.call(cmd).await? {
            ResponseFrame::Envelope { value, .. } => Ok(value),
            ResponseFrame::Binary(_) => Err(MiniserverError::UnexpectedResponse(format!(
                "binary payload in response to {cmd}"
            ))),
        }
    }

    /// Close the session: refuse new requests, resolve the in-flight one
    /// with `SessionClosed`, and close the transport.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.writer.lock().await.send(Message::Close(None)).await;
        // Aborting the reader drops the slot sender, which resolves any
        // in-flight caller with SessionClosed.
        self.reader.abort();
    }

    /// Send one command and wait for its response on the slot.
    async fn call(&self, cmd: &str) -> Result<ResponseFrame> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MiniserverError::SessionClosed);
        }

        // Holding the slot for the whole exchange serializes requests.
        let mut slot = self.slot.lock().await;
        self.writer
            .lock()
            .await
            .send(Message::Text(cmd.to_string()))
            .await?;

        let response = match slot.recv().await {
            Some(response) => response?,
            None => return Err(MiniserverError::SessionClosed),
        };

        // Binary-file responses carry no control echo; they match any
        // `data/...` request. Envelopes must echo the request, though the
        // server may strip the `jdev/` prefix.
        match &response {
            ResponseFrame::Binary(_) if cmd.starts_with("data") => Ok(response),
            ResponseFrame::Binary(_) => Err(MiniserverError::UnexpectedResponse(format!(
                "binary payload in response to {cmd}"
            ))),
            ResponseFrame::Envelope { control, .. }
                if cmd.starts_with("data") || cmd.ends_with(control.as_str()) =>
            {
                Ok(response)
            }
            ResponseFrame::Envelope { control, .. } => {
                Err(MiniserverError::UnexpectedResponse(format!(
                    "response control {control:?} does not match command {cmd:?}"
                )))
            }
        }
    }
}

impl Drop for MiniserverClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for MiniserverClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniserverClient")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Reader task: frame the incoming stream forever, routing responses to
/// the slot and push events to the broker.
///
/// Parse failures are logged and dropped; only transport failures (or the
/// client going away) end the task.
async fn run_reader(
    mut stream: SplitStream<WsStream>,
    slot: mpsc::Sender<Result<ResponseFrame>>,
    broker: Broker<PushEvent>,
) {
    loop {
        let (header, payload) = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(MiniserverError::Transport(e)) => {
                tracing::warn!(error = %e, "miniserver transport failed, ending session");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed miniserver frame");
                continue;
            }
        };

        match header.message_kind() {
            Some(MessageKind::Text) => {
                if slot.send(decode_envelope(&payload)).await.is_err() {
                    return;
                }
            }
            Some(MessageKind::BinaryFile) => {
                if slot.send(Ok(ResponseFrame::Binary(payload))).await.is_err() {
                    return;
                }
            }
            Some(MessageKind::ValueEvent) => {
                publish_table(&broker, decode_value_table(&payload)).await;
            }
            Some(MessageKind::TextEvent) => {
                publish_table(&broker, decode_text_table(&payload)).await;
            }
            Some(MessageKind::DaytimerEvent) => {
                publish_table(&broker, decode_daytimer_table(&payload)).await;
            }
            Some(MessageKind::WeatherEvent) => {
                publish_table(&broker, decode_weather_table(&payload)).await;
            }
            Some(MessageKind::OutOfService) => {
                tracing::warn!("miniserver signalled out-of-service");
            }
            Some(MessageKind::KeepAlive) => {
                tracing::trace!("miniserver keep-alive");
            }
            None => {
                tracing::debug!(kind = header.kind, "ignoring unknown message kind");
            }
        }
    }
}

async fn publish_table(broker: &Broker<PushEvent>, table: Result<EventTable>) {
    match table {
        Ok(entries) => {
            for (uuid, event) in entries {
                broker.publish(&uuid, event).await;
            }
        }
        Err(e) => tracing::warn!(error = %e, "dropping undecodable event table"),
    }
}

/// Read one logical message: a binary header frame, then the payload frame.
///
/// A binary-file header may be followed by a second 8-byte `0x03` frame;
/// that frame is the true header and the payload follows in a third frame.
/// This has only ever been observed for kind 1 (binary-file), and the
/// detection requires it.
async fn read_frame(stream: &mut SplitStream<WsStream>) -> Result<(FrameHeader, Vec<u8>)> {
    let header = match next_message(stream).await? {
        Message::Binary(bytes) => FrameHeader::decode(&bytes)?,
        _ => {
            return Err(MiniserverError::MalformedFrame(
                "header frame is not binary".into(),
            ))
        }
    };

    let (mut header, mut payload, mut is_text) = match next_message(stream).await? {
        Message::Binary(data) => (header, data, false),
        Message::Text(text) => (header, text.into_bytes(), true),
        _ => {
            return Err(MiniserverError::MalformedFrame(
                "unexpected payload frame type".into(),
            ))
        }
    };

    if header.message_kind() == Some(MessageKind::BinaryFile)
        && payload.len() == HEADER_LEN
        && payload.first() == Some(&FRAME_MAGIC)
    {
        header = FrameHeader::decode(&payload)?;
        (payload, is_text) = match next_message(stream).await? {
            Message::Binary(data) => (data, false),
            Message::Text(text) => (text.into_bytes(), true),
            _ => {
                return Err(MiniserverError::MalformedFrame(
                    "unexpected payload frame type".into(),
                ))
            }
        };
    }

    if payload.len() != header.length as usize {
        return Err(MiniserverError::MalformedFrame(format!(
            "payload is {} bytes, header declared {}",
            payload.len(),
            header.length
        )));
    }
    if is_text && header.message_kind() != Some(MessageKind::Text) {
        return Err(MiniserverError::MalformedFrame(format!(
            "text-framed payload with message kind {}",
            header.kind
        )));
    }

    Ok((header, payload))
}

/// Next data-bearing message, skipping control frames.
async fn next_message(stream: &mut SplitStream<WsStream>) -> Result<Message> {
    loop {
        match stream.next().await {
            None => return Err(tungstenite::Error::ConnectionClosed.into()),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Ok(Message::Close(_))) => return Err(tungstenite::Error::ConnectionClosed.into()),
            Some(Ok(message)) => return Ok(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "LL")]
    ll: EnvelopeBody,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBody {
    control: String,
    #[serde(rename = "Code", alias = "code")]
    code: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Decode a `{"LL":{"control":...,"Code":"200","value":...}}` envelope.
fn decode_envelope(payload: &[u8]) -> Result<ResponseFrame> {
    let envelope: Envelope = serde_json::from_slice(payload)
        .map_err(|e| MiniserverError::UnexpectedResponse(format!("invalid envelope: {e}")))?;
    let body = envelope.ll;
    if body.code != "200" {
        return Err(MiniserverError::ControlError(body.code));
    }
    Ok(ResponseFrame::Envelope {
        control: body.control,
        value: body.value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_envelope_success() {
        let payload =
            br#"{"LL":{"control":"dev/sys/getkey","value":"abcd","Code":"200"}}"#;
        match decode_envelope(payload).unwrap() {
            ResponseFrame::Envelope { control, value } => {
                assert_eq!(control, "dev/sys/getkey");
                assert_eq!(value, serde_json::json!("abcd"));
            }
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_envelope_surfaces_code_verbatim() {
        let payload = br#"{"LL":{"control":"authenticate/xyz","value":null,"Code":"401"}}"#;
        match decode_envelope(payload) {
            Err(MiniserverError::ControlError(code)) => assert_eq!(code, "401"),
            other => panic!("expected ControlError, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_envelope_accepts_lowercase_code_key() {
        let payload = br#"{"LL":{"control":"jdev/sps/io/x/on","value":1,"code":"200"}}"#;
        assert!(decode_envelope(payload).is_ok());
    }

    #[test]
    fn test_decode_envelope_rejects_garbage() {
        assert!(matches!(
            decode_envelope(b"not json"),
            Err(MiniserverError::UnexpectedResponse(_))
        ));
    }
}
