//! Protocol engine: the single polling loop that owns every buffer.
//!
//! **Transport-decoupled** on the way in: callers feed whole reports
//! (from the [`ReportQueue`](super::rx_queue::ReportQueue) consumer) or
//! single bytes, together with the handler context. On the way out,
//! [`poll`](ProtocolEngine::poll) gets the transport for the duration of
//! one pass.
//!
//! ```text
//!   report ─▶ PacketReassembler ─┐
//!                                ├─▶ decode ─▶ parse ─▶ Dispatcher ─▶ Outbox
//!   byte ─▶ RxBuffer ─▶ SysexDecoder ┘
//!
//!   poll:  Outbox ──┐
//!          console ─┴─▶ TxBuffer (whole frames only) ─▶ ChunkSink ─▶ Transport
//! ```
//!
//! Frames are appended to the transmit buffer whole, and only from
//! `poll`, so console text never lands inside a protocol frame.

use log::{debug, info, warn};

use super::chunked::{ChunkSink, PacketReassembler};
use super::dispatch::{DispatchOutcome, Dispatcher, HandlerRegistry};
use super::message::{CommandKind, Message, OutFrame, Outbox};
use super::stream::{BufferStream, ByteSink, TxBuffer};
use super::sysex::{self, STRING_DATA, SysexDecoder};
use super::transport::{REPORT_DISCRIMINATOR, Transport};
use crate::config::{
    MAX_INPUT_ITERATIONS, ProtocolConfig, ProtocolVersion, RX_BUFFER_SIZE, SysexEncoding,
    TX_BUFFER_SIZE,
};
use crate::console::ConsoleMux;
use crate::error::{ChannelError, Result};

/// Link counters, readable by diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_in: u32,
    pub malformed: u32,
    pub handled: u32,
    pub ignored: u32,
    pub rejected: u32,
    pub frames_out: u32,
    pub console_frames: u32,
    pub reports_out: u32,
    pub send_failures: u32,
}

/// Sysex protocol engine over handler context `C`.
pub struct ProtocolEngine<C> {
    config: ProtocolConfig,
    dispatcher: Dispatcher<C>,
    reassembler: PacketReassembler,
    decoder: SysexDecoder,
    stream: BufferStream<TX_BUFFER_SIZE, RX_BUFFER_SIZE>,
    outbox: Outbox,
    started: bool,
    paused: bool,
    pub_seq: u8,
    stats: LinkStats,
}

impl<C> ProtocolEngine<C> {
    /// Validate `config` and take ownership of the route table.
    pub fn new(config: ProtocolConfig, registry: HandlerRegistry<C>) -> Result<Self> {
        config.validate()?;
        info!(
            "link: {:?} protocol, {:?} frames, {}-byte reports, {} routes",
            config.version,
            config.encoding,
            config.packet_size,
            registry.len()
        );
        Ok(Self {
            dispatcher: Dispatcher::new(registry, config.version),
            reassembler: PacketReassembler::new(),
            decoder: SysexDecoder::new(),
            stream: BufferStream::new(config.flush_timeout_ms),
            outbox: Outbox::new(),
            started: false,
            paused: false,
            pub_seq: 0,
            stats: LinkStats::default(),
            config,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Begin serving the link. Also triggered by the first inbound report.
    pub fn start(&mut self) {
        if !self.started {
            info!("link: started");
            self.started = true;
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Stop taking input. Pending input stays queued; output still drains.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // ── Input ────────────────────────────────────────────────

    /// Feed one inbound report and dispatch every frame it completes.
    ///
    /// Returns `false` when the report was not taken (engine paused).
    pub fn receive_report(&mut self, report: &[u8], ctx: &mut C) -> bool {
        if self.paused {
            return false;
        }
        if report.first() == Some(&REPORT_DISCRIMINATOR) {
            self.start();
        }
        let Self {
            reassembler,
            dispatcher,
            outbox,
            stats,
            ..
        } = self;
        reassembler.feed(report, |frame| {
            handle_frame(dispatcher, ctx, outbox, stats, frame);
        });
        true
    }

    /// Queue one byte from a byte-oriented transport.
    pub fn receive_byte(&mut self, byte: u8) -> core::result::Result<(), ChannelError> {
        let r = self.stream.received(byte);
        if r.is_err() {
            warn!("link: receive ring overflow, input reset");
            self.decoder.reset();
        }
        r
    }

    /// Run queued bytes through the frame decoder, at most
    /// [`MAX_INPUT_ITERATIONS`] per call. Returns bytes consumed.
    pub fn process_input(&mut self, ctx: &mut C) -> usize {
        if self.paused {
            return 0;
        }
        let Self {
            stream,
            decoder,
            dispatcher,
            outbox,
            stats,
            started,
            ..
        } = self;
        let mut consumed = 0;
        while consumed < MAX_INPUT_ITERATIONS {
            let Some(b) = stream.read() else {
                break;
            };
            consumed += 1;
            if let Some(frame) = decoder.push(b) {
                *started = true;
                handle_frame(dispatcher, ctx, outbox, stats, frame);
            }
        }
        consumed
    }

    // ── Output ───────────────────────────────────────────────

    /// Queue an unsolicited PUB frame `[seq?][target][body]`.
    ///
    /// Nothing is published before the link has started.
    pub fn publish(&mut self, target: u8, body: &[u8]) -> bool {
        if !self.started {
            return false;
        }
        let mut frame = OutFrame {
            command: CommandKind::Pub as u8,
            payload: heapless::Vec::new(),
        };
        let mut ok = true;
        if self.config.version == ProtocolVersion::Versioned {
            ok &= frame.payload.push(self.pub_seq).is_ok();
            self.pub_seq = self.pub_seq.wrapping_add(1);
        }
        ok &= frame.payload.push(target).is_ok();
        ok &= frame.payload.extend_from_slice(body).is_ok();
        if !ok {
            warn!("link: publish for target {} too large", target);
            return false;
        }
        self.outbox.push(frame)
    }

    /// One output pass: encode queued responses, wrap due console text,
    /// and flush everything pending to `transport`. Returns the number of
    /// reports sent.
    pub fn poll<T: Transport>(
        &mut self,
        now_ms: u32,
        console: &mut ConsoleMux,
        transport: &mut T,
    ) -> u32 {
        if !self.started {
            if console.need_flush(now_ms) {
                console.discard();
            }
            return 0;
        }

        let encoding = self.config.encoding;
        let tx = self.stream.tx_mut();
        let mut sink = ChunkSink::new(transport, self.config.packet_size as usize);

        while let Some(frame) = self.outbox.pop() {
            if append_frame(tx, &mut sink, now_ms, encoding, frame.command, &frame.payload) {
                self.stats.frames_out += 1;
            }
        }

        if console.need_flush(now_ms) {
            let mut frames = ConsoleFrames {
                tx: &mut *tx,
                sink: &mut sink,
                now_ms,
                encoding,
                sent: 0,
            };
            console.flush(now_ms, &mut frames);
            self.stats.console_frames += frames.sent;
        }

        tx.flush(now_ms, &mut sink);

        self.stats.reports_out += sink.reports();
        self.stats.send_failures += sink.failures();
        sink.reports()
    }

    // ── Introspection ────────────────────────────────────────

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn version(&self) -> ProtocolVersion {
        self.config.version
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Frames queued for the next poll.
    pub fn pending_frames(&self) -> usize {
        self.outbox.len()
    }

    pub fn stream(&self) -> &BufferStream<TX_BUFFER_SIZE, RX_BUFFER_SIZE> {
        &self.stream
    }

    pub fn reassembler(&self) -> &PacketReassembler {
        &self.reassembler
    }
}

/// Decode, parse, and dispatch one complete frame. Malformed frames are
/// counted and dropped without a response.
fn handle_frame<C>(
    dispatcher: &Dispatcher<C>,
    ctx: &mut C,
    outbox: &mut Outbox,
    stats: &mut LinkStats,
    frame: &[u8],
) -> Option<DispatchOutcome> {
    stats.frames_in += 1;
    let decoded = match sysex::decode(frame) {
        Ok(f) => f,
        Err(e) => {
            debug!("link: frame dropped: {e}");
            stats.malformed += 1;
            return None;
        }
    };
    let msg = match Message::parse(dispatcher.version(), decoded.command, &decoded.data) {
        Ok(m) => m,
        Err(e) => {
            debug!("link: message dropped: {e}");
            stats.malformed += 1;
            return None;
        }
    };
    let outcome = dispatcher.dispatch(ctx, &msg, outbox);
    match outcome {
        DispatchOutcome::Handled => stats.handled += 1,
        DispatchOutcome::Ignored => stats.ignored += 1,
        DispatchOutcome::Rejected => stats.rejected += 1,
    }
    Some(outcome)
}

/// Encode one frame into `tx`, flushing first if it would not fit.
fn append_frame<S: ByteSink, const N: usize>(
    tx: &mut TxBuffer<N>,
    sink: &mut S,
    now_ms: u32,
    encoding: SysexEncoding,
    command: u8,
    payload: &[u8],
) -> bool {
    let needed = sysex::encoded_len(encoding, payload.len());
    if needed > tx.capacity() {
        warn!("link: {needed}-byte frame exceeds transmit buffer, dropped");
        return false;
    }
    if needed > tx.remaining() {
        tx.flush(now_ms, sink);
    }
    match sysex::encode_with(encoding, command, payload, |b| {
        // Room was checked above.
        let _ = tx.write(b);
    }) {
        Ok(_) => true,
        Err(e) => {
            warn!("link: cannot encode frame 0x{command:02x}: {e}");
            false
        }
    }
}

/// Wraps flushed console text in STRING_DATA frames.
struct ConsoleFrames<'a, S: ByteSink, const N: usize> {
    tx: &'a mut TxBuffer<N>,
    sink: &'a mut S,
    now_ms: u32,
    encoding: SysexEncoding,
    sent: u32,
}

impl<S: ByteSink, const N: usize> ByteSink for ConsoleFrames<'_, S, N> {
    fn send_data(&mut self, data: &[u8]) {
        if append_frame(self.tx, self.sink, self.now_ms, self.encoding, STRING_DATA, data) {
            self.sent += 1;
        }
    }
}
