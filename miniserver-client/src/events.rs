//! Event-table decoders.
//!
//! Push notifications arrive as "event tables": back-to-back entries with
//! no outer count, parsed until the buffer is exhausted. All integers and
//! floats are little-endian. A short read inside any entry fails the whole
//! table; the entries decoded so far are discarded, since the next push
//! re-delivers current values anyway.

use serde::{Deserialize, Serialize};

use crate::error::{MiniserverError, Result};
use crate::frame::decode_uuid;

/// One switching window of a daytimer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaytimerEntry {
    pub mode: i32,
    pub from: i32,
    pub to: i32,
    pub need_activate: i32,
    pub value: f64,
}

/// Daytimer state pushed for a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaytimerEvent {
    pub default_value: f64,
    pub entries: Vec<DaytimerEntry>,
}

/// One forecast slot of a weather push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherEntry {
    pub timestamp: i32,
    pub weather_type: i32,
    pub wind_direction: i32,
    pub solar_radiation: i32,
    pub relative_humidity: i32,
    pub temperature: f64,
    pub perceived_temperature: f64,
    pub dew_point: f64,
    pub precipitation: f64,
    pub wind_speed: f64,
    pub barometric_pressure: f64,
}

/// Weather state pushed for a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherEvent {
    pub last_update: u32,
    pub entries: Vec<WeatherEntry>,
}

/// A typed state change for one entity UUID, as published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PushEvent {
    /// Analog/digital value update
    Value(f64),
    /// Text update with the entity's icon UUID
    Text { icon_uuid: String, text: String },
    /// Daytimer schedule update
    Daytimer(DaytimerEvent),
    /// Weather forecast update
    Weather(WeatherEvent),
}

/// Decoded table: `(uuid, event)` pairs in wire order.
pub type EventTable = Vec<(String, PushEvent)>;

const UUID_LEN: usize = 16;
const VALUE_ENTRY_LEN: usize = 24;
const TEXT_FIXED_LEN: usize = 36;
const DAYTIMER_HEAD_LEN: usize = 28;
const DAYTIMER_ENTRY_LEN: usize = 24;
const WEATHER_HEAD_LEN: usize = 24;
const WEATHER_ENTRY_LEN: usize = 68;

// The callers below slice with explicit bounds checks before handing
// byte ranges to these helpers, so the fixed-size conversions hold.
fn f64_le(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    f64::from_le_bytes(buf)
}

fn i32_le(bytes: &[u8]) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    i32::from_le_bytes(buf)
}

fn u32_le(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Decode a value table: 24-byte entries of UUID followed by an f64.
pub fn decode_value_table(payload: &[u8]) -> Result<EventTable> {
    if payload.len() % VALUE_ENTRY_LEN != 0 {
        return Err(MiniserverError::MalformedEventTable(format!(
            "value table length {} is not a multiple of {VALUE_ENTRY_LEN}",
            payload.len()
        )));
    }

    let mut table = Vec::with_capacity(payload.len() / VALUE_ENTRY_LEN);
    for entry in payload.chunks_exact(VALUE_ENTRY_LEN) {
        let uuid = decode_uuid(&entry[..UUID_LEN])?;
        let value = f64_le(&entry[UUID_LEN..VALUE_ENTRY_LEN]);
        table.push((uuid, PushEvent::Value(value)));
    }
    Ok(table)
}

/// Decode a text table.
///
/// Each entry is UUID, icon UUID, a u32 text length and the text bytes;
/// the next entry starts `36 + len + (len % 4)` bytes in. A declared
/// length that overruns the buffer fails the table with
/// [`MiniserverError::TruncatedTextEvent`].
pub fn decode_text_table(payload: &[u8]) -> Result<EventTable> {
    let mut table = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let entry = &payload[offset..];
        if entry.len() < TEXT_FIXED_LEN {
            return Err(MiniserverError::MalformedEventTable(format!(
                "text entry at offset {offset} is {} bytes, expected at least {TEXT_FIXED_LEN}",
                entry.len()
            )));
        }
        let uuid = decode_uuid(&entry[..UUID_LEN])?;
        let icon_uuid = decode_uuid(&entry[UUID_LEN..2 * UUID_LEN])?;
        let text_len = u32_le(&entry[32..TEXT_FIXED_LEN]) as usize;
        if TEXT_FIXED_LEN + text_len > entry.len() {
            return Err(MiniserverError::TruncatedTextEvent {
                declared: text_len as u32,
                remaining: entry.len() - TEXT_FIXED_LEN,
            });
        }
        let text =
            String::from_utf8_lossy(&entry[TEXT_FIXED_LEN..TEXT_FIXED_LEN + text_len]).into_owned();
        table.push((uuid, PushEvent::Text { icon_uuid, text }));
        offset += TEXT_FIXED_LEN + text_len + (text_len % 4);
    }
    Ok(table)
}

/// Decode a daytimer table: UUID, f64 default, i32 entry count, then
/// 24-byte entries.
pub fn decode_daytimer_table(payload: &[u8]) -> Result<EventTable> {
    let mut table = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let event = &payload[offset..];
        if event.len() < DAYTIMER_HEAD_LEN {
            return Err(MiniserverError::MalformedEventTable(format!(
                "daytimer event at offset {offset} is {} bytes, expected at least {DAYTIMER_HEAD_LEN}",
                event.len()
            )));
        }
        let uuid = decode_uuid(&event[..UUID_LEN])?;
        let default_value = f64_le(&event[16..24]);
        let count = i32_le(&event[24..DAYTIMER_HEAD_LEN]);
        let Ok(count) = usize::try_from(count) else {
            return Err(MiniserverError::MalformedEventTable(format!(
                "daytimer event declares {count} entries"
            )));
        };
        let body_len = DAYTIMER_HEAD_LEN + count * DAYTIMER_ENTRY_LEN;
        if body_len > event.len() {
            return Err(MiniserverError::MalformedEventTable(format!(
                "daytimer event declares {count} entries but only {} bytes remain",
                event.len() - DAYTIMER_HEAD_LEN
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for entry in event[DAYTIMER_HEAD_LEN..body_len].chunks_exact(DAYTIMER_ENTRY_LEN) {
            entries.push(DaytimerEntry {
                mode: i32_le(&entry[..4]),
                from: i32_le(&entry[4..8]),
                to: i32_le(&entry[8..12]),
                need_activate: i32_le(&entry[12..16]),
                value: f64_le(&entry[16..24]),
            });
        }
        table.push((
            uuid,
            PushEvent::Daytimer(DaytimerEvent {
                default_value,
                entries,
            }),
        ));
        offset += body_len;
    }
    Ok(table)
}

/// Decode a weather table: UUID, u32 last-update, i32 entry count, then
/// 68-byte entries of five i32 and six f64 scalars.
pub fn decode_weather_table(payload: &[u8]) -> Result<EventTable> {
    let mut table = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let event = &payload[offset..];
        if event.len() < WEATHER_HEAD_LEN {
            return Err(MiniserverError::MalformedEventTable(format!(
                "weather event at offset {offset} is {} bytes, expected at least {WEATHER_HEAD_LEN}",
                event.len()
            )));
        }
        let uuid = decode_uuid(&event[..UUID_LEN])?;
        let last_update = u32_le(&event[16..20]);
        let count = i32_le(&event[20..WEATHER_HEAD_LEN]);
        let Ok(count) = usize::try_from(count) else {
            return Err(MiniserverError::MalformedEventTable(format!(
                "weather event declares {count} entries"
            )));
        };
        let body_len = WEATHER_HEAD_LEN + count * WEATHER_ENTRY_LEN;
        if body_len > event.len() {
            return Err(MiniserverError::MalformedEventTable(format!(
                "weather event declares {count} entries but only {} bytes remain",
                event.len() - WEATHER_HEAD_LEN
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for entry in event[WEATHER_HEAD_LEN..body_len].chunks_exact(WEATHER_ENTRY_LEN) {
            entries.push(WeatherEntry {
                timestamp: i32_le(&entry[..4]),
                weather_type: i32_le(&entry[4..8]),
                wind_direction: i32_le(&entry[8..12]),
                solar_radiation: i32_le(&entry[12..16]),
                relative_humidity: i32_le(&entry[16..20]),
                temperature: f64_le(&entry[20..28]),
                perceived_temperature: f64_le(&entry[28..36]),
                dew_point: f64_le(&entry[36..44]),
                precipitation: f64_le(&entry[44..52]),
                wind_speed: f64_le(&entry[52..60]),
                barometric_pressure: f64_le(&entry[60..68]),
            });
        }
        table.push((
            uuid,
            PushEvent::Weather(WeatherEvent {
                last_update,
                entries,
            }),
        ));
        offset += body_len;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_uuid;

    const UUID: &str = "73676e10-a902-41e6-ffff20df2fc4e78a";
    const ICON_UUID: &str = "00000000-0000-0000-00000000000000ff";

    fn uuid_bytes(uuid: &str) -> Vec<u8> {
        encode_uuid(uuid).unwrap().to_vec()
    }

    fn value_entry(uuid: &str, value: f64) -> Vec<u8> {
        let mut entry = uuid_bytes(uuid);
        entry.extend_from_slice(&value.to_le_bytes());
        entry
    }

    fn text_entry(uuid: &str, text: &str, padded: bool) -> Vec<u8> {
        let mut entry = uuid_bytes(uuid);
        entry.extend_from_slice(&uuid_bytes(ICON_UUID));
        entry.extend_from_slice(&(text.len() as u32).to_le_bytes());
        entry.extend_from_slice(text.as_bytes());
        if padded {
            entry.extend(std::iter::repeat(0u8).take(text.len() % 4));
        }
        entry
    }

    #[test]
    fn test_empty_value_table() {
        assert!(decode_value_table(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_value_table_single_entry() {
        let table = decode_value_table(&value_entry(UUID, 1.0)).unwrap();
        assert_eq!(table, vec![(UUID.to_string(), PushEvent::Value(1.0))]);
    }

    #[test]
    fn test_value_table_preserves_wire_order() {
        let mut payload = value_entry(UUID, 1.0);
        payload.extend(value_entry(ICON_UUID, -2.5));
        let table = decode_value_table(&payload).unwrap();
        assert_eq!(table[0], (UUID.to_string(), PushEvent::Value(1.0)));
        assert_eq!(table[1], (ICON_UUID.to_string(), PushEvent::Value(-2.5)));
    }

    #[test]
    fn test_value_table_rejects_ragged_length() {
        let payload = value_entry(UUID, 1.0);
        assert!(matches!(
            decode_value_table(&payload[..23]),
            Err(MiniserverError::MalformedEventTable(_))
        ));
    }

    #[test]
    fn test_text_entry_advance_includes_padding() {
        // "hello" is 5 bytes, so the next entry starts at 36 + 5 + 1 = 42.
        let mut payload = text_entry(UUID, "hello", true);
        assert_eq!(payload.len(), 42);
        payload.extend(text_entry(ICON_UUID, "", false));

        let table = decode_text_table(&payload).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table[0].1,
            PushEvent::Text {
                icon_uuid: ICON_UUID.to_string(),
                text: "hello".to_string(),
            }
        );
        assert_eq!(table[1].0, ICON_UUID);
    }

    #[test]
    fn test_text_entry_without_trailing_padding() {
        // A lone final entry may omit its padding bytes; the cursor simply
        // runs off the end of the buffer.
        let payload = text_entry(UUID, "hello", false);
        assert_eq!(payload.len(), 41);
        let table = decode_text_table(&payload).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_text_is_valid_and_advances_36_bytes() {
        let mut payload = text_entry(UUID, "", false);
        assert_eq!(payload.len(), 36);
        payload.extend(text_entry(ICON_UUID, "x", false));
        let table = decode_text_table(&payload).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table[0].1,
            PushEvent::Text {
                icon_uuid: ICON_UUID.to_string(),
                text: String::new(),
            }
        );
    }

    #[test]
    fn test_overlong_text_length_fails_the_table() {
        let mut payload = uuid_bytes(UUID);
        payload.extend_from_slice(&uuid_bytes(ICON_UUID));
        payload.extend_from_slice(&100u32.to_le_bytes());
        payload.extend_from_slice(b"short");

        match decode_text_table(&payload) {
            Err(MiniserverError::TruncatedTextEvent {
                declared,
                remaining,
            }) => {
                assert_eq!(declared, 100);
                assert_eq!(remaining, 5);
            }
            other => panic!("expected TruncatedTextEvent, got {other:?}"),
        }
    }

    #[test]
    fn test_daytimer_table() {
        let mut payload = uuid_bytes(UUID);
        payload.extend_from_slice(&0.5f64.to_le_bytes());
        payload.extend_from_slice(&2i32.to_le_bytes());
        for (mode, value) in [(1i32, 20.0f64), (2, 18.5)] {
            payload.extend_from_slice(&mode.to_le_bytes());
            payload.extend_from_slice(&360i32.to_le_bytes());
            payload.extend_from_slice(&720i32.to_le_bytes());
            payload.extend_from_slice(&0i32.to_le_bytes());
            payload.extend_from_slice(&value.to_le_bytes());
        }

        let table = decode_daytimer_table(&payload).unwrap();
        assert_eq!(table.len(), 1);
        let (uuid, event) = &table[0];
        assert_eq!(uuid, UUID);
        match event {
            PushEvent::Daytimer(event) => {
                assert_eq!(event.default_value, 0.5);
                assert_eq!(event.entries.len(), 2);
                assert_eq!(
                    event.entries[0],
                    DaytimerEntry {
                        mode: 1,
                        from: 360,
                        to: 720,
                        need_activate: 0,
                        value: 20.0,
                    }
                );
                assert_eq!(event.entries[1].value, 18.5);
            }
            other => panic!("expected daytimer event, got {other:?}"),
        }
    }

    #[test]
    fn test_daytimer_rejects_negative_entry_count() {
        let mut payload = uuid_bytes(UUID);
        payload.extend_from_slice(&0.0f64.to_le_bytes());
        payload.extend_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            decode_daytimer_table(&payload),
            Err(MiniserverError::MalformedEventTable(_))
        ));
    }

    #[test]
    fn test_daytimer_rejects_short_entry_body() {
        let mut payload = uuid_bytes(UUID);
        payload.extend_from_slice(&0.0f64.to_le_bytes());
        payload.extend_from_slice(&3i32.to_le_bytes());
        payload.extend_from_slice(&[0u8; 24]);
        assert!(matches!(
            decode_daytimer_table(&payload),
            Err(MiniserverError::MalformedEventTable(_))
        ));
    }

    #[test]
    fn test_weather_table() {
        let mut payload = uuid_bytes(UUID);
        payload.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        payload.extend_from_slice(&1i32.to_le_bytes());
        for scalar in [1_700_000_100i32, 3, 180, 450, 62] {
            payload.extend_from_slice(&scalar.to_le_bytes());
        }
        for scalar in [21.5f64, 20.9, 11.2, 0.0, 3.4, 1013.2] {
            payload.extend_from_slice(&scalar.to_le_bytes());
        }

        let table = decode_weather_table(&payload).unwrap();
        assert_eq!(table.len(), 1);
        match &table[0].1 {
            PushEvent::Weather(event) => {
                assert_eq!(event.last_update, 1_700_000_000);
                assert_eq!(
                    event.entries[0],
                    WeatherEntry {
                        timestamp: 1_700_000_100,
                        weather_type: 3,
                        wind_direction: 180,
                        solar_radiation: 450,
                        relative_humidity: 62,
                        temperature: 21.5,
                        perceived_temperature: 20.9,
                        dew_point: 11.2,
                        precipitation: 0.0,
                        wind_speed: 3.4,
                        barometric_pressure: 1013.2,
                    }
                );
            }
            other => panic!("expected weather event, got {other:?}"),
        }
    }

    #[test]
    fn test_weather_rejects_truncated_entry() {
        let mut payload = uuid_bytes(UUID);
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&1i32.to_le_bytes());
        payload.extend_from_slice(&[0u8; 67]);
        assert!(matches!(
            decode_weather_table(&payload),
            Err(MiniserverError::MalformedEventTable(_))
        ));
    }
}
