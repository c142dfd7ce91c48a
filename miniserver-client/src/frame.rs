//! Frame header and UUID wire codecs.
//!
//! The Miniserver prepends every payload with an 8-byte header:
//! byte 0 is the `0x03` magic, byte 1 the message-kind id, bytes 2-3 are
//! reserved, bytes 4-7 the little-endian payload length. Entity UUIDs
//! travel as 16 bytes in the mixed-endian GUID layout (u32-LE, u16-LE,
//! u16-LE, then 8 raw bytes).

use crate::error::{MiniserverError, Result};

/// First byte of every frame header.
pub const FRAME_MAGIC: u8 = 0x03;

/// Frame headers are always exactly 8 bytes.
pub const HEADER_LEN: usize = 8;

/// Message kinds carried in byte 1 of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// JSON envelope response (`{"LL":{...}}`)
    Text,
    /// Raw binary payload, e.g. the structure file
    BinaryFile,
    /// Value event table
    ValueEvent,
    /// Text event table
    TextEvent,
    /// Daytimer event table
    DaytimerEvent,
    /// Server is going down for maintenance
    OutOfService,
    /// Periodic keep-alive
    KeepAlive,
    /// Weather event table
    WeatherEvent,
}

impl MessageKind {
    /// Map a wire id to a known message kind.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Text),
            1 => Some(Self::BinaryFile),
            2 => Some(Self::ValueEvent),
            3 => Some(Self::TextEvent),
            4 => Some(Self::DaytimerEvent),
            5 => Some(Self::OutOfService),
            6 => Some(Self::KeepAlive),
            7 => Some(Self::WeatherEvent),
            _ => None,
        }
    }

    /// The kind's wire id.
    pub fn id(self) -> u8 {
        match self {
            Self::Text => 0,
            Self::BinaryFile => 1,
            Self::ValueEvent => 2,
            Self::TextEvent => 3,
            Self::DaytimerEvent => 4,
            Self::OutOfService => 5,
            Self::KeepAlive => 6,
            Self::WeatherEvent => 7,
        }
    }
}

/// Decoded out-of-band frame header.
///
/// `kind` is kept as the raw wire id so that payloads of unknown kinds can
/// still be consumed (and ignored) instead of desynchronizing the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw message-kind id (byte 1)
    pub kind: u8,
    /// Payload length in bytes (bytes 4-7, little-endian)
    pub length: u32,
}

impl FrameHeader {
    /// Decode an 8-byte header.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_LEN {
            return Err(MiniserverError::MalformedFrame(format!(
                "header is {} bytes, expected {HEADER_LEN}",
                bytes.len()
            )));
        }
        if bytes[0] != FRAME_MAGIC {
            return Err(MiniserverError::MalformedFrame(format!(
                "header starts with {:#04x}, expected {FRAME_MAGIC:#04x}",
                bytes[0]
            )));
        }
        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self {
            kind: bytes[1],
            length,
        })
    }

    /// Encode the header into its 8-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = FRAME_MAGIC;
        buf[1] = self.kind;
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// The known message kind, if the id is one we understand.
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_id(self.kind)
    }
}

/// Render a 16-byte wire UUID as its hexadecimal string form.
///
/// The wire layout is three little-endian integers (u32, u16, u16)
/// followed by 8 raw bytes; the string form groups them as
/// `xxxxxxxx-xxxx-xxxx-xxxxxxxxxxxxxxxx`.
pub fn decode_uuid(bytes: &[u8]) -> Result<String> {
    if bytes.len() != 16 {
        return Err(MiniserverError::MalformedEventTable(format!(
            "uuid is {} bytes, expected 16",
            bytes.len()
        )));
    }
    let data1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let data2 = u16::from_le_bytes([bytes[4], bytes[5]]);
    let data3 = u16::from_le_bytes([bytes[6], bytes[7]]);
    Ok(format!(
        "{data1:08x}-{data2:04x}-{data3:04x}-{}",
        hex::encode(&bytes[8..16])
    ))
}

/// Convert a UUID string back into its 16-byte wire form.
///
/// Exact inverse of [`decode_uuid`]: round-trips any 16 bytes.
pub fn encode_uuid(uuid: &str) -> Result<[u8; 16]> {
    let invalid = || MiniserverError::InvalidUuid(uuid.to_string());

    let mut groups = uuid.split('-');
    let data1 = groups.next().ok_or_else(invalid)?;
    let data2 = groups.next().ok_or_else(invalid)?;
    let data3 = groups.next().ok_or_else(invalid)?;
    let tail = groups.next().ok_or_else(invalid)?;
    if groups.next().is_some()
        || data1.len() != 8
        || data2.len() != 4
        || data3.len() != 4
        || tail.len() != 16
    {
        return Err(invalid());
    }

    let data1 = u32::from_str_radix(data1, 16).map_err(|_| invalid())?;
    let data2 = u16::from_str_radix(data2, 16).map_err(|_| invalid())?;
    let data3 = u16::from_str_radix(data3, 16).map_err(|_| invalid())?;
    let tail = hex::decode(tail).map_err(|_| invalid())?;

    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&data1.to_le_bytes());
    bytes[4..6].copy_from_slice(&data2.to_le_bytes());
    bytes[6..8].copy_from_slice(&data3.to_le_bytes());
    bytes[8..16].copy_from_slice(&tail);
    Ok(bytes)
}
