//! keylink: packetized control/debug protocol engine for keyboard
//! firmware.
//!
//! A host tool talks to the firmware over fixed-size raw-HID reports.
//! Reports carry sysex frames; frames carry `(kind, target)` messages
//! that the dispatcher routes to device handlers. The same link carries
//! console text, self-describing struct layouts and, in trusted builds,
//! small code fragments loaded into executable slots.
//!
//! ```text
//!  Transport ─▶ proto::chunked ─▶ proto::sysex ─▶ proto::dispatch ─▶ device
//!      ▲                                                               │
//!      └──────────── proto::engine::poll ◀── console ◀── layout/dynld ─┘
//! ```
//!
//! Everything outside the engine is reached through [`app::ports`], so
//! the crate runs unchanged on the host against [`adapters::sim`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod console;
pub mod device;
pub mod dynld;
pub mod error;
pub mod layout;
pub mod proto;

pub use app::service::LinkService;
pub use config::{MatrixGeometry, ProtocolConfig, ProtocolVersion, SysexEncoding};
pub use error::{Error, Result};

/// Build identifier stamped in by `build.rs`.
pub const BUILD_ID: &str = env!("KEYLINK_BUILD_ID");
