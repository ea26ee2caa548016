//! Link configuration parameters
//!
//! Runtime knobs for the protocol engine plus the compile-time buffer
//! capacities every component sizes itself from. Runtime values can be
//! persisted as a postcard blob or exchanged as JSON with host tooling.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ── Compile-time capacities ───────────────────────────────────────

/// Largest transport report the link supports (full-speed HID endpoint).
pub const MAX_PACKET_SIZE: usize = 64;

/// Default transport report size.
pub const DEFAULT_PACKET_SIZE: usize = 32;

/// Capacity of one reassembled sysex frame and of a decoded payload.
pub const MAX_FRAME_SIZE: usize = 256;

/// Protocol transmit buffer. Large enough for a full console frame plus
/// a handful of queued responses.
pub const TX_BUFFER_SIZE: usize = 640;

/// Byte-wise receive ring for stream transports.
pub const RX_BUFFER_SIZE: usize = 256;

/// Console text buffer. A full console flush still fits in one frame.
pub const CONSOLE_BUFFER_SIZE: usize = 239;

/// Default console idle flush timeout in milliseconds.
pub const FLUSH_TIMEOUT_MS: u32 = 100;

/// Upper bound on input steps per polling pass.
pub const MAX_INPUT_ITERATIONS: usize = 64;

/// Maximum number of response frames queued between polls.
pub const OUTBOX_DEPTH: usize = 16;

/// Maximum payload carried by a single response frame. Holds a full
/// layer-0 keymap read and still fits a raw frame's length byte.
pub const MAX_RESPONSE_SIZE: usize = 224;

/// Maximum banner length.
pub const BANNER_CAPACITY: usize = 48;

// ── Runtime config ────────────────────────────────────────────────

/// Wire generation of the message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// `[target][payload]`, errors are never reported.
    Legacy,
    /// `[seq][target][payload]`, unmatched and invalid requests get an
    /// error response.
    #[default]
    Versioned,
}

/// Encoding used for outbound frames. Inbound frames of either kind are
/// always accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SysexEncoding {
    /// 0xF0 framing, each byte split into two 7-bit halves.
    #[default]
    SevenBit,
    /// 0xF1 framing, raw bytes behind a length byte.
    Raw,
}

/// Protocol engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub version: ProtocolVersion,
    pub encoding: SysexEncoding,
    /// Transport report size in bytes, discriminator included.
    pub packet_size: u8,
    /// Console idle flush timeout in milliseconds.
    pub flush_timeout_ms: u32,
    /// Enables the memory/EEPROM/call CLI sub-protocol.
    pub cli_enabled: bool,
    /// One-shot console line sent before the first console output.
    #[serde(default)]
    pub banner: Option<heapless::String<BANNER_CAPACITY>>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::Versioned,
            encoding: SysexEncoding::SevenBit,
            packet_size: DEFAULT_PACKET_SIZE as u8,
            flush_timeout_ms: FLUSH_TIMEOUT_MS,
            cli_enabled: false,
            banner: None,
        }
    }
}

impl ProtocolConfig {
    /// Check ranges. Called by the engine constructor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = self.packet_size as usize;
        if size < 2 {
            return Err(ConfigError::Invalid("packet_size must leave room for payload"));
        }
        if size > MAX_PACKET_SIZE {
            return Err(ConfigError::Invalid("packet_size exceeds MAX_PACKET_SIZE"));
        }
        if self.flush_timeout_ms == 0 {
            return Err(ConfigError::Invalid("flush_timeout_ms must be non-zero"));
        }
        Ok(())
    }

    /// Decode a persisted postcard blob and validate it.
    pub fn from_postcard(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Payload bytes per transport report.
    pub fn chunk_payload(&self) -> usize {
        self.packet_size as usize - 1
    }
}

/// Key matrix and LED geometry of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixGeometry {
    pub rows: u8,
    pub cols: u8,
    pub led_count: u8,
}

impl Default for MatrixGeometry {
    fn default() -> Self {
        // 6x17 TKL-class board with per-key lighting.
        Self {
            rows: 6,
            cols: 17,
            led_count: 87,
        }
    }
}

impl MatrixGeometry {
    /// Rows are reported as at most 32 column bits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::Invalid("matrix must have rows and cols"));
        }
        if self.cols > 32 {
            return Err(ConfigError::Invalid("cols exceeds 32"));
        }
        Ok(())
    }

    pub fn key_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Bytes needed to hold one row of matrix state.
    pub fn row_bytes(&self) -> usize {
        match self.cols {
            0..=8 => 1,
            9..=16 => 2,
            _ => 4,
        }
    }
}
