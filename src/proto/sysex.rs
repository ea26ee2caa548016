//! Sysex frame codec.
//!
//! Two framings share the wire. The 7-bit one is MIDI-safe, the raw one
//! halves the overhead on links that do not care:
//!
//! ```text
//! 7-bit: ┌────┬─────┬────────┬────────┬─────┬────┐
//!        │ F0 │ cmd │ lo0 hi0│ lo1 hi1│ ... │ F7 │   lo = b & 0x7F
//!        └────┴─────┴────────┴────────┴─────┴────┘   hi = (b >> 7) & 0x7F
//!
//! raw:   ┌────┬─────┬─────┬────────────────┐
//!        │ F1 │ cmd │ len │ len data bytes │
//!        └────┴─────┴─────┴────────────────┘
//! ```
//!
//! Decoding is split in two: [`frame_len`] finds frame boundaries in a
//! byte run (used by the report reassembler and [`SysexDecoder`]), and
//! [`decode`] turns one complete frame into a [`SysexFrame`].

use log::debug;

use crate::config::{MAX_FRAME_SIZE, SysexEncoding};
use crate::error::CodecError;

/// Start of a 7-bit encoded frame.
pub const START_SYSEX: u8 = 0xF0;
/// Start of a raw frame with a length byte.
pub const START_RAW: u8 = 0xF1;
/// End of a 7-bit encoded frame.
pub const END_SYSEX: u8 = 0xF7;
/// Command byte of console text frames.
pub const STRING_DATA: u8 = 0x71;

/// Header bytes around a frame body (start, command, end or length).
const FRAME_OVERHEAD: usize = 3;

/// Decoded frame payload.
pub type Payload = heapless::Vec<u8, MAX_FRAME_SIZE>;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysexFrame {
    pub command: u8,
    pub data: Payload,
}

/// Largest payload that still fits in one reassembled frame.
pub const fn max_payload(encoding: SysexEncoding) -> usize {
    match encoding {
        SysexEncoding::SevenBit => (MAX_FRAME_SIZE - FRAME_OVERHEAD) / 2,
        SysexEncoding::Raw => {
            let room = MAX_FRAME_SIZE - FRAME_OVERHEAD;
            if room < u8::MAX as usize { room } else { u8::MAX as usize }
        }
    }
}

/// Encoded size of a frame carrying `payload_len` bytes.
pub const fn encoded_len(encoding: SysexEncoding, payload_len: usize) -> usize {
    match encoding {
        SysexEncoding::SevenBit => FRAME_OVERHEAD + payload_len * 2,
        SysexEncoding::Raw => FRAME_OVERHEAD + payload_len,
    }
}

/// Encode a frame byte by byte into `emit`.
///
/// Nothing is emitted when the frame cannot be encoded.
pub fn encode_with(
    encoding: SysexEncoding,
    command: u8,
    payload: &[u8],
    mut emit: impl FnMut(u8),
) -> Result<usize, CodecError> {
    match encoding {
        SysexEncoding::SevenBit => {
            if command & 0x80 != 0 {
                return Err(CodecError::NotSevenBit(command));
            }
            emit(START_SYSEX);
            emit(command);
            for &b in payload {
                emit(b & 0x7F);
                emit((b >> 7) & 0x7F);
            }
            emit(END_SYSEX);
        }
        SysexEncoding::Raw => {
            let Ok(len) = u8::try_from(payload.len()) else {
                return Err(CodecError::Overflow);
            };
            emit(START_RAW);
            emit(command);
            emit(len);
            for &b in payload {
                emit(b);
            }
        }
    }
    Ok(encoded_len(encoding, payload.len()))
}

/// Encode a frame into `out`. Returns the number of bytes written.
pub fn encode_frame(
    encoding: SysexEncoding,
    command: u8,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize, CodecError> {
    if encoded_len(encoding, payload.len()) > out.len() {
        return Err(CodecError::Overflow);
    }
    let mut pos = 0;
    encode_with(encoding, command, payload, |b| {
        out[pos] = b;
        pos += 1;
    })
}

/// Length of the complete frame at the start of `buf`, if there is one.
///
/// `buf[0]` must be a start marker; anything else yields `None`.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    match *buf.first()? {
        START_SYSEX => buf
            .iter()
            .skip(1)
            .position(|&b| b == END_SYSEX)
            .map(|i| i + 2),
        START_RAW => {
            let declared = *buf.get(2)? as usize;
            let total = FRAME_OVERHEAD + declared;
            (buf.len() >= total).then_some(total)
        }
        _ => None,
    }
}

/// Decode one complete frame.
pub fn decode(frame: &[u8]) -> Result<SysexFrame, CodecError> {
    if frame.len() < FRAME_OVERHEAD {
        return match frame.first().copied() {
            Some(START_SYSEX | START_RAW) | None => Err(CodecError::TooShort),
            Some(_) => Err(CodecError::MissingStart),
        };
    }

    let command = frame[1];
    let mut data = Payload::new();

    match frame[0] {
        START_SYSEX => {
            if command & 0x80 != 0 {
                return Err(CodecError::NotSevenBit(command));
            }
            let Some((&END_SYSEX, body)) = frame[2..].split_last() else {
                return Err(CodecError::Unterminated);
            };
            if body.len() % 2 != 0 {
                return Err(CodecError::OddLength);
            }
            for pair in body.chunks_exact(2) {
                let (lo, hi) = (pair[0], pair[1]);
                if let Some(&bad) = [lo, hi].iter().find(|&&b| b & 0x80 != 0) {
                    return Err(CodecError::NotSevenBit(bad));
                }
                // Bit 0 of the high half becomes bit 7; the rest is dropped.
                let byte = lo | ((hi & 0x01) << 7);
                data.push(byte).map_err(|_| CodecError::Overflow)?;
            }
        }
        START_RAW => {
            let declared = frame[2] as usize;
            let body = frame
                .get(FRAME_OVERHEAD..FRAME_OVERHEAD + declared)
                .ok_or(CodecError::TooShort)?;
            data.extend_from_slice(body)
                .map_err(|_| CodecError::Overflow)?;
        }
        _ => return Err(CodecError::MissingStart),
    }

    Ok(SysexFrame { command, data })
}

// ── Byte-wise decoder ─────────────────────────────────────────

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for a start marker.
    Idle,
    /// Start marker seen, collecting frame bytes.
    Accumulating { raw: bool },
    /// A complete frame was handed out; next byte starts over.
    Decoded,
}

/// Streaming frame decoder for byte-oriented input.
///
/// A start marker inside a 7-bit frame restarts accumulation. Raw frame
/// bodies are opaque, so only the declared length ends them.
pub struct SysexDecoder {
    state: DecoderState,
    buf: heapless::Vec<u8, MAX_FRAME_SIZE>,
    dropped: u32,
}

impl SysexDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            buf: heapless::Vec::new(),
            dropped: 0,
        }
    }

    /// Feed one byte.
    ///
    /// Returns `Some(frame)` when a complete frame is available. The
    /// returned slice is valid until the next call to `push`.
    pub fn push(&mut self, byte: u8) -> Option<&[u8]> {
        let in_raw_body = matches!(self.state, DecoderState::Accumulating { raw: true });
        if !in_raw_body && (byte == START_SYSEX || byte == START_RAW) {
            if matches!(self.state, DecoderState::Accumulating { .. }) {
                debug!("sysex: restart inside frame, dropping {} bytes", self.buf.len());
                self.dropped += 1;
            }
            self.buf.clear();
            // Cannot fail: the buffer was just cleared.
            let _ = self.buf.push(byte);
            self.state = DecoderState::Accumulating {
                raw: byte == START_RAW,
            };
            return None;
        }

        match self.state {
            DecoderState::Idle | DecoderState::Decoded => None,
            DecoderState::Accumulating { .. } => {
                if self.buf.push(byte).is_err() {
                    debug!("sysex: frame exceeds {MAX_FRAME_SIZE} bytes, dropped");
                    self.dropped += 1;
                    self.reset();
                    return None;
                }
                let len = frame_len(&self.buf)?;
                self.state = DecoderState::Decoded;
                Some(&self.buf[..len])
            }
        }
    }

    /// Reset decoder state, discarding any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecoderState::Idle;
    }

    /// Whether a frame is partially accumulated.
    pub fn is_active(&self) -> bool {
        matches!(self.state, DecoderState::Accumulating { .. })
    }

    /// Frames dropped by restart or overflow.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl Default for SysexDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────
