//! Kind-specific payload shapes carried after the packet header.

use super::{put_string, take_len, take_string, Kind, ProtocolError};
use bytes::{Buf, BufMut, BytesMut};

/// The decoded position a log line was emitted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogInvocation {
    pub line: u32,
    pub column: u32,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPayload {
    pub level: u8,
    pub message: String,
    /// Comma-delimited ancestry chain, as received on the wire.
    pub ancestry: String,
    pub invocation: LogInvocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    /// JSON-encoded error or error array, exactly as received.
    pub error: String,
}

/// `Status` sub-kind, carried in the payload's `type` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    TestStart = 1,
    Describe = 2,
    EndSuite = 3,
    StartSuite = 4,
    CompileSuite = 5,
}

impl StatusType {
    fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        Ok(match v {
            1 => Self::TestStart,
            2 => Self::Describe,
            3 => Self::EndSuite,
            4 => Self::StartSuite,
            5 => Self::CompileSuite,
            other => return Err(ProtocolError::UnknownKind(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPayload {
    pub r#type: StatusType,
    pub todo: bool,
    pub skipped: bool,
    pub duration: u32,
    pub ancestry: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsPayload {
    pub r#type: u8,
    pub passed: bool,
    pub duration: u32,
    pub ancestry: String,
    pub description: String,
    /// JSON array of errors, or empty string when the event carried none.
    pub errors: String,
}

/// The payload for one decoded/about-to-be-encoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Log(LogPayload),
    Error(ErrorPayload),
    Status(StatusPayload),
    Events(EventsPayload),
}

impl Payload {
    pub(crate) fn validate_kind(&self, kind: Kind) -> Result<(), ProtocolError> {
        let matches = matches!(
            (self, kind),
            (Payload::Log(_), Kind::Log)
                | (Payload::Error(_), Kind::Error)
                | (Payload::Status(_), Kind::Status)
                | (Payload::Events(_), Kind::Events)
        );
        if matches {
            Ok(())
        } else {
            Err(ProtocolError::UnknownKind(kind as u8))
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Payload::Log(p) => {
                buf.put_u8(p.level);
                put_string(buf, &p.message);
                put_string(buf, &p.ancestry);
                buf.put_u32_le(p.invocation.line);
                buf.put_u32_le(p.invocation.column);
                put_string(buf, &p.invocation.source);
            }
            Payload::Error(p) => put_string(buf, &p.error),
            Payload::Status(p) => {
                buf.put_u8(p.r#type as u8);
                buf.put_u8(p.todo as u8);
                buf.put_u8(p.skipped as u8);
                buf.put_u32_le(p.duration);
                put_string(buf, &p.ancestry);
                put_string(buf, &p.description);
            }
            Payload::Events(p) => {
                buf.put_u8(p.r#type);
                buf.put_u8(p.passed as u8);
                buf.put_u32_le(p.duration);
                put_string(buf, &p.ancestry);
                put_string(buf, &p.description);
                put_string(buf, &p.errors);
            }
        }
    }

    pub(crate) fn decode(kind: Kind, buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(match kind {
            Kind::Log => {
                if buf.remaining() < 1 {
                    return Err(ProtocolError::Truncated { needed: 1 });
                }
                let level = buf.get_u8();
                let message = take_string(buf)?;
                let ancestry = take_string(buf)?;
                if buf.remaining() < 8 {
                    return Err(ProtocolError::Truncated { needed: 8 - buf.remaining() });
                }
                let line = buf.get_u32_le();
                let column = buf.get_u32_le();
                let source = take_string(buf)?;
                Payload::Log(LogPayload {
                    level,
                    message,
                    ancestry,
                    invocation: LogInvocation { line, column, source },
                })
            }
            Kind::Error => Payload::Error(ErrorPayload { error: take_string(buf)? }),
            Kind::Status => {
                if buf.remaining() < 3 {
                    return Err(ProtocolError::Truncated { needed: 3 - buf.remaining() });
                }
                let r#type = StatusType::from_u8(buf.get_u8())?;
                let todo = buf.get_u8() != 0;
                let skipped = buf.get_u8() != 0;
                let duration = take_len(buf)?;
                let ancestry = take_string(buf)?;
                let description = take_string(buf)?;
                Payload::Status(StatusPayload { r#type, todo, skipped, duration, ancestry, description })
            }
            Kind::Events => {
                if buf.remaining() < 2 {
                    return Err(ProtocolError::Truncated { needed: 2 - buf.remaining() });
                }
                let r#type = buf.get_u8();
                let passed = buf.get_u8() != 0;
                let duration = take_len(buf)?;
                let ancestry = take_string(buf)?;
                let description = take_string(buf)?;
                let errors = take_string(buf)?;
                Payload::Events(EventsPayload { r#type, passed, duration, ancestry, description, errors })
            }
        })
    }
}
