//! Message model: command kinds, target ids, request parsing, and the
//! response path handlers write into.
//!
//! ```text
//! Legacy    request:  [target][payload...]
//! Versioned request:  [seq][target][payload...]
//! Response (kind 0x0F) mirrors the request header:
//!                     [seq?][target][body...]
//! ```

use core::fmt;

use log::warn;

use crate::config::{MAX_RESPONSE_SIZE, OUTBOX_DEPTH, ProtocolVersion};
use crate::error::CodecError;

/// Frame command byte: what the host wants done with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    Extended = 0x00,
    Set = 0x01,
    Get = 0x02,
    Add = 0x03,
    Del = 0x04,
    Pub = 0x05,
    Sub = 0x06,
    Response = 0x0F,
}

impl TryFrom<u8> for CommandKind {
    type Error = CodecError;

    fn try_from(b: u8) -> Result<Self, CodecError> {
        Ok(match b {
            0x00 => Self::Extended,
            0x01 => Self::Set,
            0x02 => Self::Get,
            0x03 => Self::Add,
            0x04 => Self::Del,
            0x05 => Self::Pub,
            0x06 => Self::Sub,
            0x0F => Self::Response,
            other => return Err(CodecError::UnknownCommand(other)),
        })
    }
}

/// Target ids carried in the message header.
pub mod target {
    pub const RGB_MATRIX_BUF: u8 = 1;
    pub const DEFAULT_LAYER: u8 = 2;
    pub const CLI: u8 = 3;
    pub const STATUS: u8 = 4;
    pub const MACWIN_MODE: u8 = 5;
    pub const STRUCT_LAYOUT: u8 = 8;
    pub const CONFIG: u8 = 9;
    pub const KEY_EVENT: u8 = 10;
    pub const DYNLD_LOAD: u8 = 250;
    pub const DYNLD_EXEC: u8 = 251;
    pub const CONTROL: u8 = 0xFF;
}

/// One request, borrowed from the decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub kind: CommandKind,
    /// Present only under [`ProtocolVersion::Versioned`].
    pub seq: Option<u8>,
    pub target: u8,
    pub payload: &'a [u8],
}

impl<'a> Message<'a> {
    /// Split a decoded frame into header and payload.
    pub fn parse(version: ProtocolVersion, command: u8, data: &'a [u8]) -> Result<Self, CodecError> {
        let kind = CommandKind::try_from(command)?;
        match version {
            ProtocolVersion::Legacy => {
                let (&target, payload) = data.split_first().ok_or(CodecError::TooShort)?;
                Ok(Self {
                    kind,
                    seq: None,
                    target,
                    payload,
                })
            }
            ProtocolVersion::Versioned => {
                let [seq, target, payload @ ..] = data else {
                    return Err(CodecError::TooShort);
                };
                Ok(Self {
                    kind,
                    seq: Some(*seq),
                    target: *target,
                    payload,
                })
            }
        }
    }
}

/// Error byte returned in place of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Ok = 0,
    Unsupported = b'u',
    InvalidSize = b'i',
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::InvalidSize => write!(f, "invalid size"),
        }
    }
}

// ── Outbound frames ───────────────────────────────────────────

/// Body of one outbound frame.
pub type FrameBody = heapless::Vec<u8, MAX_RESPONSE_SIZE>;

/// A frame waiting to be encoded into the transmit buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutFrame {
    pub command: u8,
    pub payload: FrameBody,
}

/// Bounded queue of outbound frames, drained by the polling task.
pub struct Outbox {
    frames: heapless::Deque<OutFrame, OUTBOX_DEPTH>,
    dropped: u32,
}

impl Outbox {
    pub const fn new() -> Self {
        Self {
            frames: heapless::Deque::new(),
            dropped: 0,
        }
    }

    /// Queue a frame. A full outbox drops it.
    pub fn push(&mut self, frame: OutFrame) -> bool {
        if self.frames.push_back(frame).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            warn!("link: outbox full, response dropped");
            return false;
        }
        true
    }

    pub fn front(&self) -> Option<&OutFrame> {
        self.frames.front()
    }

    pub fn pop(&mut self) -> Option<OutFrame> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body under construction. Writes past capacity mark it
/// truncated; truncated bodies are never sent.
#[derive(Debug, Clone, Default)]
pub struct ResponseBuilder {
    body: FrameBody,
    truncated: bool,
}

impl ResponseBuilder {
    pub fn push(&mut self, b: u8) -> &mut Self {
        if self.body.push(b).is_err() {
            self.truncated = true;
        }
        self
    }

    pub fn extend(&mut self, bytes: &[u8]) -> &mut Self {
        if self.body.extend_from_slice(bytes).is_err() {
            self.truncated = true;
        }
        self
    }

    pub fn push_u16(&mut self, v: u16) -> &mut Self {
        self.extend(&v.to_le_bytes())
    }

    pub fn push_u32(&mut self, v: u32) -> &mut Self {
        self.extend(&v.to_le_bytes())
    }

    pub fn push_i32(&mut self, v: i32) -> &mut Self {
        self.extend(&v.to_le_bytes())
    }

    /// Bytes still available in this body.
    pub fn remaining(&self) -> usize {
        MAX_RESPONSE_SIZE - self.body.len()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Per-request reply handle given to handlers.
pub struct Responder<'a> {
    version: ProtocolVersion,
    seq: Option<u8>,
    outbox: &'a mut Outbox,
    sent: usize,
}

impl<'a> Responder<'a> {
    pub fn new(version: ProtocolVersion, seq: Option<u8>, outbox: &'a mut Outbox) -> Self {
        Self {
            version,
            seq,
            outbox,
            sent: 0,
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn is_versioned(&self) -> bool {
        self.version == ProtocolVersion::Versioned
    }

    /// Start a response for `target`, header already written.
    pub fn begin(&self, target: u8) -> ResponseBuilder {
        let mut b = ResponseBuilder::default();
        if let (ProtocolVersion::Versioned, Some(seq)) = (self.version, self.seq) {
            b.push(seq);
        }
        b.push(target);
        b
    }

    /// Queue a finished response.
    pub fn send(&mut self, builder: ResponseBuilder) -> bool {
        if builder.truncated {
            warn!("link: response exceeds {MAX_RESPONSE_SIZE} bytes, dropped");
            return false;
        }
        let queued = self.outbox.push(OutFrame {
            command: CommandKind::Response as u8,
            payload: builder.body,
        });
        if queued {
            self.sent += 1;
        }
        queued
    }

    /// Shorthand for a response with a fixed body.
    pub fn reply(&mut self, target: u8, body: &[u8]) -> bool {
        let mut b = self.begin(target);
        b.extend(body);
        self.send(b)
    }

    /// Report an error for `target`. Legacy peers never see errors.
    pub fn error(&mut self, target: u8, code: ErrorCode) -> bool {
        if !self.is_versioned() {
            return false;
        }
        self.reply(target, &[code as u8])
    }

    /// Responses queued through this handle.
    pub fn sent(&self) -> usize {
        self.sent
    }
}
