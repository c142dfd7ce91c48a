//! # miniserver-client
//!
//! Client for the Miniserver framed-WebSocket protocol. Every payload on
//! the socket is preceded by an out-of-band 8-byte binary header naming the
//! payload's message kind and length; push notifications arrive as binary
//! "event tables" in four distinct formats, while synchronous commands are
//! answered with a JSON envelope or a raw binary file.
//!
//! [`MiniserverClient`] owns the socket and a background reader task. The
//! reader decodes every push event table and publishes its entries to an
//! [`event_broker::Broker`] keyed by entity UUID; command responses travel
//! to the caller through a single-slot response queue, which keeps the
//! protocol's one-outstanding-request discipline without extra locking.

mod client;
mod error;
mod events;
mod frame;

pub use client::MiniserverClient;
pub use error::{MiniserverError, Result};
pub use events::{
    decode_daytimer_table, decode_text_table, decode_value_table, decode_weather_table,
    DaytimerEntry, DaytimerEvent, PushEvent, WeatherEntry, WeatherEvent,
};
pub use frame::{decode_uuid, encode_uuid, FrameHeader, MessageKind, FRAME_MAGIC, HEADER_LEN};
