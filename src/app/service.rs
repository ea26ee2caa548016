//! Link service, the polling core.
//!
//! [`LinkService`] owns the protocol engine and the device context and
//! exposes the handful of entry points the firmware main loop needs.
//! All I/O flows through the board ports and the [`Transport`] handed to
//! [`task`](LinkService::task), so the whole service runs against mocks.
//!
//! ```text
//!  ISR ──▶ ReportQueue ──▶ ┌──────────────────────────┐ ──▶ Transport
//!                          │       LinkService         │
//!  key events ────────────▶│  engine · device · console│
//!                          └──────────────────────────┘
//! ```

use log::{info, warn};

use crate::config::{MAX_INPUT_ITERATIONS, MatrixGeometry, ProtocolConfig};
use crate::console::ConsoleMux;
use crate::device::{Device, handlers};
use crate::dynld::SlotExecutor;
use crate::error::{ChannelError, Result};
use crate::proto::engine::ProtocolEngine;
use crate::proto::message::target;
use crate::proto::rx_queue::ReportConsumer;
use crate::proto::transport::Transport;

use super::ports::Board;

/// LED used for the buffer overrun flash.
const DIAGNOSTIC_LED: u8 = 0;

// ───────────────────────────────────────────────────────────────
// LinkService
// ───────────────────────────────────────────────────────────────

pub struct LinkService<B> {
    engine: ProtocolEngine<Device<B>>,
    device: Device<B>,
    overruns_seen: u32,
}

impl<B: Board> LinkService<B> {
    /// Validate `config`, build the route table and the device.
    pub fn new(config: ProtocolConfig, board: B, geometry: MatrixGeometry) -> Result<Self> {
        let registry = handlers::registry::<B>()?;
        let device = Device::new(board, geometry, &config)?;
        let engine = ProtocolEngine::new(config, registry)?;
        info!("link: service ready, {:?} protocol", engine.version());
        Ok(Self {
            engine,
            device,
            overruns_seen: 0,
        })
    }

    pub fn with_executor(mut self, executor: impl SlotExecutor + 'static) -> Self {
        self.device = self.device.with_executor(executor);
        self
    }

    // ── Input ─────────────────────────────────────────────────

    /// Take one report straight from the transport.
    pub fn on_report(&mut self, report: &[u8]) -> bool {
        self.engine.receive_report(report, &mut self.device)
    }

    /// Take one byte from a byte-oriented transport.
    pub fn on_byte(&mut self, byte: u8) -> core::result::Result<(), ChannelError> {
        self.engine.receive_byte(byte)
    }

    /// Move queued reports into the engine. While paused nothing is
    /// taken, so reports wait in the queue.
    pub fn drain_reports<const N: usize>(&mut self, rx: &mut ReportConsumer<'_, N>) -> usize {
        if self.engine.is_paused() {
            return 0;
        }
        let Self { engine, device, .. } = self;
        rx.drain(MAX_INPUT_ITERATIONS, |report| {
            engine.receive_report(report, device);
        })
    }

    /// A key changed state. Returns whether the firmware should keep
    /// processing it.
    pub fn on_key_event(&mut self, row: u8, col: u8, pressed: bool) -> bool {
        let devel = self.device.state.devel;
        if !devel.pub_keypress() {
            return true;
        }
        self.engine
            .publish(target::KEY_EVENT, &[row, col, u8::from(pressed)]);
        devel.process_keypress()
    }

    // ── Polling ───────────────────────────────────────────────

    /// One cooperative pass: paint host LED overrides, process buffered
    /// input, flag overruns, then flush responses and console text.
    /// Returns reports sent.
    pub fn task<T: Transport>(&mut self, now_ms: u32, transport: &mut T) -> u32 {
        self.device.render();
        self.engine.process_input(&mut self.device);

        let overruns = self
            .device
            .console
            .dropped()
            .wrapping_add(self.engine.stream().tx().overflows());
        if overruns != self.overruns_seen {
            warn!("link: buffer overrun ({overruns} total)");
            self.device.rgb.flash_diagnostic(DIAGNOSTIC_LED);
            self.overruns_seen = overruns;
        }

        self.engine.poll(now_ms, &mut self.device.console, transport)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self) {
        self.engine.start();
    }

    pub fn pause(&mut self) {
        self.engine.pause();
    }

    pub fn resume(&mut self) {
        self.engine.resume();
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn engine(&self) -> &ProtocolEngine<Device<B>> {
        &self.engine
    }

    pub fn device(&self) -> &Device<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<B> {
        &mut self.device
    }

    /// Console for firmware debug output.
    pub fn console(&mut self) -> &mut ConsoleMux {
        &mut self.device.console
    }
}
