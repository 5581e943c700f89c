//! The binary packet protocol: a length-prefixed, kind-tagged wire format
//! carrying logs, status, events, and fatal suite errors between runners
//! and the orchestrator.
//!
//! Wire layout (all multi-byte integers little-endian unless noted):
//!
//! ```text
//! byte 0        : kind (high 4 bits) | reserved (low 4 bits, zero)
//! bytes 1..15   : suite_id, 14 raw UTF-8 bytes, NUL-padded
//! bytes 15..29  : runner_id, 14 raw UTF-8 bytes, NUL-padded
//! u32le len     : timestamp byte length
//! bytes         : timestamp UTF-8 (ISO-8601)
//! ...           : kind-specific payload
//! ```

mod payload;

use bytes::{Buf, BufMut, BytesMut};
pub use payload::{ErrorPayload, EventsPayload, LogInvocation, LogPayload, Payload, StatusPayload, StatusType};

/// Fixed width, in bytes, of the `suite_id`/`runner_id` header fields.
pub const ID_FIELD_LEN: usize = 14;

/// Recognized packet kinds, carried in the header's high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Log = 1,
    Error = 2,
    Status = 3,
    Events = 4,
}

impl Kind {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Log),
            2 => Some(Self::Error),
            3 => Some(Self::Status),
            4 => Some(Self::Events),
            _ => None,
        }
    }
}

/// Errors raised by [`encode`]/[`decode`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unrecognized packet kind {0}")]
    UnknownKind(u8),
    #[error("packet truncated: needed {needed} more byte(s)")]
    Truncated { needed: usize },
    #[error("string field exceeded its declared length")]
    StringOverLength,
    #[error("id field `{field}` is not valid UTF-8")]
    InvalidId { field: &'static str },
    #[error("payload field is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// A fully decoded packet: header fields plus the kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: Kind,
    pub suite_id: String,
    pub runner_id: String,
    pub timestamp: String,
    pub payload: Payload,
}

fn pad_id(id: &str) -> Result<[u8; ID_FIELD_LEN], ProtocolError> {
    let bytes = id.as_bytes();
    if bytes.len() > ID_FIELD_LEN {
        return Err(ProtocolError::StringOverLength);
    }
    let mut out = [0u8; ID_FIELD_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn unpad_id(bytes: &[u8], field: &'static str) -> Result<String, ProtocolError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec()).map_err(|_| ProtocolError::InvalidId { field })
}

pub(crate) fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub(crate) fn take_string(buf: &mut impl Buf) -> Result<String, ProtocolError> {
    let len = take_len(buf)? as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::Truncated { needed: len - buf.remaining() });
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    Ok(String::from_utf8(bytes)?)
}

pub(crate) fn take_len(buf: &mut impl Buf) -> Result<u32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated { needed: 4 - buf.remaining() });
    }
    Ok(buf.get_u32_le())
}

/// Encode a packet. Rejects unknown kinds (there are none at the type
/// level, but mismatched `kind`/`payload` pairs are rejected).
pub fn encode(
    kind: Kind,
    suite_id: &str,
    runner_id: &str,
    timestamp: &str,
    payload: &Payload,
) -> Result<Vec<u8>, ProtocolError> {
    payload.validate_kind(kind)?;

    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8((kind as u8) << 4);
    buf.put_slice(&pad_id(suite_id)?);
    buf.put_slice(&pad_id(runner_id)?);
    put_string(&mut buf, timestamp);
    payload.encode_into(&mut buf);
    Ok(buf.to_vec())
}

/// Decode a packet from a byte slice.
pub fn decode(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    let mut buf = bytes;
    if buf.remaining() < 1 + 2 * ID_FIELD_LEN {
        return Err(ProtocolError::Truncated {
            needed: 1 + 2 * ID_FIELD_LEN - buf.remaining(),
        });
    }
    let header_byte = buf.get_u8();
    let kind = Kind::from_u8(header_byte >> 4).ok_or(ProtocolError::UnknownKind(header_byte >> 4))?;

    let mut suite_id_bytes = [0u8; ID_FIELD_LEN];
    buf.copy_to_slice(&mut suite_id_bytes);
    let suite_id = unpad_id(&suite_id_bytes, "suite_id")?;

    let mut runner_id_bytes = [0u8; ID_FIELD_LEN];
    buf.copy_to_slice(&mut runner_id_bytes);
    let runner_id = unpad_id(&runner_id_bytes, "runner_id")?;

    let timestamp = take_string(&mut buf)?;
    let payload = Payload::decode(kind, &mut buf)?;

    Ok(Packet { kind, suite_id, runner_id, timestamp, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_status() {
        let payload = Payload::Status(StatusPayload {
            r#type: StatusType::StartSuite,
            todo: false,
            skipped: false,
            duration: 0,
            ancestry: "A,B".into(),
            description: "S".into(),
        });
        let bytes = encode(
            Kind::Status,
            "abcdefghijklmn",
            "runner000000aa",
            "2024-01-01T00:00:00.000Z",
            &payload,
        )
        .unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.kind, Kind::Status);
        assert_eq!(decoded.suite_id, "abcdefghijklmn");
        assert_eq!(decoded.runner_id, "runner000000aa");
        assert_eq!(decoded.timestamp, "2024-01-01T00:00:00.000Z");
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut bytes = vec![0xF0u8];
        bytes.extend_from_slice(&[0u8; 2 * ID_FIELD_LEN]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(ProtocolError::UnknownKind(15))));
    }

    #[test]
    fn rejects_truncated_payload() {
        let payload = Payload::Log(LogPayload {
            level: 1,
            message: "hi".into(),
            ancestry: "a,b".into(),
            invocation: LogInvocation { line: 1, column: 1, source: "f.ts".into() },
        });
        let mut bytes = encode(Kind::Log, "s", "r", "t", &payload).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn id_fields_are_nul_padded_not_length_prefixed() {
        let payload = Payload::Error(payload::ErrorPayload { error: "{}".into() });
        let bytes = encode(Kind::Error, "short", "id", "t", &payload).unwrap();
        assert_eq!(bytes[1..1 + ID_FIELD_LEN], {
            let mut expected = [0u8; ID_FIELD_LEN];
            expected[..5].copy_from_slice(b"short");
            expected
        });
    }
}
