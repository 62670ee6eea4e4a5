//! `application/vnd.amazon.eventstream` framing.
//!
//! Each message is:
//!
//! ```text
//! total_len: u32 | headers_len: u32 | prelude_crc: u32 | headers | payload | message_crc: u32
//! ```
//!
//! All integers are big-endian. `prelude_crc` covers the first eight bytes,
//! `message_crc` covers everything before it. Both are CRC-32 (IEEE).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

const PRELUDE_LEN: usize = 12;
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + 4;
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut k = 0;
        while k < 8 {
            crc = if crc & 1 == 1 {
                0xEDB8_8320 ^ (crc >> 1)
            } else {
                crc >> 1
            };
            k += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-32 (IEEE 802.3)
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}

/// Framing error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("event stream prelude checksum mismatch")]
    PreludeChecksum,
    #[error("event stream message checksum mismatch")]
    MessageChecksum,
    #[error("invalid event stream message length {0}")]
    InvalidLength(usize),
    #[error("malformed event stream header: {0}")]
    Header(String),
}

/// Header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Bytes),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

/// One decoded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    /// Headers, in wire order
    pub headers: Vec<(String, HeaderValue)>,
    /// Raw payload
    pub payload: Bytes,
}

impl EventMessage {
    /// String header by name
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(key, value)| match value {
            HeaderValue::String(s) if key == name => Some(s.as_str()),
            _ => None,
        })
    }

    /// `:message-type` (`event` or `exception`)
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.header_str(":message-type")
    }

    /// `:event-type`
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.header_str(":event-type")
    }

    /// `:exception-type`
    #[must_use]
    pub fn exception_type(&self) -> Option<&str> {
        self.header_str(":exception-type")
    }
}

/// Incremental decoder; feed bytes as they arrive
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: BytesMut,
}

impl EventStreamDecoder {
    /// Empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes not yet consumed
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete message, `None` while one is still incomplete
    pub fn next_message(&mut self) -> Result<Option<EventMessage>, FrameError> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = read_u32(&self.buffer, 0) as usize;
        let headers_len = read_u32(&self.buffer, 4) as usize;
        if crc32(&self.buffer[..8]) != read_u32(&self.buffer, 8) {
            return Err(FrameError::PreludeChecksum);
        }
        if !(MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&total_len)
            || headers_len > total_len - MIN_MESSAGE_LEN
        {
            return Err(FrameError::InvalidLength(total_len));
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let frame = self.buffer.split_to(total_len).freeze();
        if crc32(&frame[..total_len - 4]) != read_u32(&frame, total_len - 4) {
            return Err(FrameError::MessageChecksum);
        }

        let headers = parse_headers(frame.slice(PRELUDE_LEN..PRELUDE_LEN + headers_len))?;
        let payload = frame.slice(PRELUDE_LEN + headers_len..total_len - 4);
        Ok(Some(EventMessage { headers, payload }))
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn take(buf: &mut Bytes, len: usize, what: &str) -> Result<Bytes, FrameError> {
    if buf.remaining() < len {
        return Err(FrameError::Header(format!("truncated {what}")));
    }
    Ok(buf.split_to(len))
}

fn parse_headers(mut buf: Bytes) -> Result<Vec<(String, HeaderValue)>, FrameError> {
    let mut headers = Vec::new();
    while buf.has_remaining() {
        let name_len = take(&mut buf, 1, "header name length")?.get_u8() as usize;
        let name = take(&mut buf, name_len, "header name")?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| FrameError::Header("header name is not UTF-8".to_string()))?;

        let value_type = take(&mut buf, 1, "header type")?.get_u8();
        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(take(&mut buf, 1, "byte")?.get_i8()),
            3 => HeaderValue::Short(take(&mut buf, 2, "short")?.get_i16()),
            4 => HeaderValue::Int(take(&mut buf, 4, "int")?.get_i32()),
            5 => HeaderValue::Long(take(&mut buf, 8, "long")?.get_i64()),
            6 => {
                let len = take(&mut buf, 2, "bytes length")?.get_u16() as usize;
                HeaderValue::Bytes(take(&mut buf, len, "bytes")?)
            }
            7 => {
                let len = take(&mut buf, 2, "string length")?.get_u16() as usize;
                let raw = take(&mut buf, len, "string")?;
                HeaderValue::String(String::from_utf8(raw.to_vec()).map_err(|_| {
                    FrameError::Header(format!("header '{name}' is not UTF-8"))
                })?)
            }
            8 => HeaderValue::Timestamp(take(&mut buf, 8, "timestamp")?.get_i64()),
            9 => {
                let mut uuid = [0u8; 16];
                take(&mut buf, 16, "uuid")?.copy_to_slice(&mut uuid);
                HeaderValue::Uuid(uuid)
            }
            other => {
                return Err(FrameError::Header(format!(
                    "unknown header type {other} for '{name}'"
                )))
            }
        };
        headers.push((name, value));
    }
    Ok(headers)
}

/// Encode a message with string headers
#[must_use]
pub fn encode_message(headers: &[(&str, &str)], payload: &[u8]) -> Bytes {
    let mut header_bytes = BytesMut::new();
    for (name, value) in headers {
        header_bytes.put_u8(name.len() as u8);
        header_bytes.put_slice(name.as_bytes());
        header_bytes.put_u8(7);
        header_bytes.put_u16(value.len() as u16);
        header_bytes.put_slice(value.as_bytes());
    }

    let total_len = MIN_MESSAGE_LEN + header_bytes.len() + payload.len();
    let mut out = BytesMut::with_capacity(total_len);
    out.put_u32(total_len as u32);
    out.put_u32(header_bytes.len() as u32);
    let prelude_crc = crc32(&out[..8]);
    out.put_u32(prelude_crc);
    out.put_slice(&header_bytes);
    out.put_slice(payload);
    let message_crc = crc32(&out);
    out.put_u32(message_crc);
    out.freeze()
}

/// Encode a normal event with JSON payload
#[must_use]
pub fn encode_event(event_type: &str, payload: &[u8]) -> Bytes {
    encode_message(
        &[
            (":message-type", "event"),
            (":event-type", event_type),
            (":content-type", "application/json"),
        ],
        payload,
    )
}

/// Encode an exception frame
#[must_use]
pub fn encode_exception(exception_type: &str, payload: &[u8]) -> Bytes {
    encode_message(
        &[
            (":message-type", "exception"),
            (":exception-type", exception_type),
            (":content-type", "application/json"),
        ],
        payload,
    )
}
