//! Unified error types for the keylink protocol engine.
//!
//! One `Error` enum that every subsystem converts into, keeping the
//! polling task's error handling uniform. All variants are `Copy` so they
//! travel through the dispatcher and loader without allocation. None of
//! them is fatal: every error is contained locally and the next message
//! is processed normally.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A frame could not be encoded or decoded.
    Codec(CodecError),
    /// A transmit or receive buffer refused a byte.
    Channel(ChannelError),
    /// The handler registry rejected a registration.
    Dispatch(DispatchError),
    /// The dynamic code loader rejected a load or exec request.
    Load(LoadError),
    /// A struct layout could not be registered or emitted.
    Layout(LayoutError),
    /// Configuration is invalid.
    Config(ConfigError),
    /// A device status or config table rejected a request.
    State(StateError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Channel(e) => write!(f, "channel: {e}"),
            Self::Dispatch(e) => write!(f, "dispatch: {e}"),
            Self::Load(e) => write!(f, "dynld: {e}"),
            Self::Layout(e) => write!(f, "layout: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::State(e) => write!(f, "state: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Frame does not begin with a known start marker.
    MissingStart,
    /// 7-bit frame ended without the end marker.
    Unterminated,
    /// Decoded payload would exceed the frame capacity.
    Overflow,
    /// 7-bit payload had an odd number of bytes.
    OddLength,
    /// A data byte inside a 7-bit frame had its high bit set.
    NotSevenBit(u8),
    /// Frame too short to carry the protocol header.
    TooShort,
    /// Command byte is not a known command kind.
    UnknownCommand(u8),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStart => write!(f, "missing start marker"),
            Self::Unterminated => write!(f, "unterminated frame"),
            Self::Overflow => write!(f, "frame exceeds capacity"),
            Self::OddLength => write!(f, "odd 7-bit pair count"),
            Self::NotSevenBit(b) => write!(f, "byte 0x{b:02x} is not 7-bit clean"),
            Self::TooShort => write!(f, "frame too short"),
            Self::UnknownCommand(c) => write!(f, "unknown command 0x{c:02x}"),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Channel errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// Transmit buffer is full; the byte was refused and a flush requested.
    Full,
    /// Receive ring filled up and was reset.
    RxOverflow,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "transmit buffer full"),
            Self::RxOverflow => write!(f, "receive buffer overflow"),
        }
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// A handler is already registered for this (kind, target) pair.
    DuplicateHandler { kind: u8, target: u8 },
    /// The registry has no free entries.
    RegistryFull,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateHandler { kind, target } => {
                write!(f, "duplicate handler for kind {kind} target {target}")
            }
            Self::RegistryFull => write!(f, "handler registry full"),
        }
    }
}

impl From<DispatchError> for Error {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e)
    }
}

// ---------------------------------------------------------------------------
// Loader errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// Slot id is outside the slot table.
    SlotOutOfRange(u16),
    /// `offset + len` exceeds the slot capacity; the slot was cleared.
    Overflow { offset: u16, len: usize },
    /// Request payload is shorter than its fixed header.
    ShortRequest,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotOutOfRange(id) => write!(f, "slot {id} out of range"),
            Self::Overflow { offset, len } => {
                write!(f, "{len} bytes at offset {offset} overflow slot")
            }
            Self::ShortRequest => write!(f, "request too short"),
        }
    }
}

impl From<LoadError> for Error {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

// ---------------------------------------------------------------------------
// Layout errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// No struct registered under (group, id).
    UnknownStruct { group: u8, id: u8 },
    /// Struct already registered under (group, id).
    DuplicateStruct { group: u8, id: u8 },
    /// The encoded descriptor would not fit in one frame.
    FrameTooLarge { group: u8, id: u8 },
    /// Schema table has no free entries.
    TableFull,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStruct { group, id } => write!(f, "unknown struct {group}:{id}"),
            Self::DuplicateStruct { group, id } => write!(f, "duplicate struct {group}:{id}"),
            Self::FrameTooLarge { group, id } => {
                write!(f, "struct {group}:{id} does not fit in one frame")
            }
            Self::TableFull => write!(f, "schema table full"),
        }
    }
}

impl From<LayoutError> for Error {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A config field failed range validation.
    Invalid(&'static str),
    /// A persisted config blob could not be decoded.
    Corrupted,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid: {msg}"),
            Self::Corrupted => write!(f, "corrupted blob"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Device state errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// No status or config struct under this id.
    UnknownId(u8),
    /// The struct is flagged read-only.
    ReadOnly(u8),
    /// Payload shorter than the struct.
    ShortPayload { id: u8, need: usize, got: usize },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownId(id) => write!(f, "unknown id {id}"),
            Self::ReadOnly(id) => write!(f, "struct {id} is read-only"),
            Self::ShortPayload { id, need, got } => {
                write!(f, "struct {id} needs {need} bytes, got {got}")
            }
        }
    }
}

impl From<StateError> for Error {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
