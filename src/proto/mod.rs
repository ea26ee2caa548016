//! Sysex protocol stack over a fixed-size report link.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Protocol Stack                         │
//! │                                                              │
//! │  ┌───────────┐   ┌─────────────┐   ┌──────────┐   ┌───────┐ │
//! │  │ Transport │──▶│ Reassembler │──▶│  Sysex   │──▶│Dispatch│ │
//! │  │ (reports) │   │  (chunked)  │   │ (codec)  │   │registry│ │
//! │  └───────────┘   └─────────────┘   └──────────┘   └───────┘ │
//! │        ▲                                              │      │
//! │        │          ┌──────────┐    ┌──────────┐        │      │
//! │        └──────────│ TxBuffer │◀───│  Outbox  │◀───────┘      │
//! │       ChunkSink   │ (stream) │◀───│ console  │               │
//! │                   └──────────┘    └──────────┘               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs from one cooperative polling task. The only
//! interrupt-context entry point is [`rx_queue::ReportProducer`].

pub mod chunked;
pub mod dispatch;
pub mod engine;
pub mod message;
pub mod rx_queue;
pub mod stream;
pub mod sysex;
pub mod transport;
