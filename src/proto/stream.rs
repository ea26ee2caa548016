//! Buffered byte channel between the protocol layers and the transport.
//!
//! The transmit half batches bytes until one of three triggers fires:
//! a newline, the buffer filling past half capacity, or the idle timeout
//! since the last flush. The receive half is a ring that the transport
//! fills and the polling task drains.

use log::warn;

use crate::error::ChannelError;

/// Destination for flushed bytes.
pub trait ByteSink {
    /// Take the whole pending range in one call.
    fn send_data(&mut self, data: &[u8]);
}

/// Adapts a per-character output function to [`ByteSink`].
pub struct PerByte<F: FnMut(u8)>(pub F);

impl<F: FnMut(u8)> ByteSink for PerByte<F> {
    fn send_data(&mut self, data: &[u8]) {
        for &b in data {
            (self.0)(b);
        }
    }
}

// ── Transmit ─────────────────────────────────────────────────

/// Fixed-capacity transmit buffer with flush heuristics.
pub struct TxBuffer<const N: usize> {
    buf: heapless::Vec<u8, N>,
    must_flush: bool,
    last_flush: u32,
    timeout_ms: u32,
    overflows: u32,
}

impl<const N: usize> TxBuffer<N> {
    pub const fn new(timeout_ms: u32) -> Self {
        Self {
            buf: heapless::Vec::new(),
            must_flush: false,
            last_flush: 0,
            timeout_ms,
            overflows: 0,
        }
    }

    /// Append one byte.
    ///
    /// A full buffer drops the byte, counts the overflow and requests a
    /// flush. Nothing is flushed here; the caller drains on its next poll.
    pub fn write(&mut self, byte: u8) -> Result<(), ChannelError> {
        if self.buf.push(byte).is_err() {
            self.must_flush = true;
            self.overflows = self.overflows.wrapping_add(1);
            return Err(ChannelError::Full);
        }
        if byte == b'\n' || self.buf.len() >= N / 2 {
            self.must_flush = true;
        }
        Ok(())
    }

    /// Append `data`, stopping at the first refused byte.
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        data.iter().try_for_each(|&b| self.write(b))
    }

    /// Hand the pending bytes to `sink` and reset the buffer.
    ///
    /// Returns `false` without touching the timestamp when nothing was
    /// written since the last flush.
    pub fn flush(&mut self, now_ms: u32, sink: &mut impl ByteSink) -> bool {
        self.must_flush = false;
        if self.buf.is_empty() {
            return false;
        }
        sink.send_data(&self.buf);
        self.buf.clear();
        self.last_flush = now_ms;
        true
    }

    /// A flush was requested, or bytes have been idle past the timeout.
    pub fn need_flush(&self, now_ms: u32) -> bool {
        self.must_flush
            || (!self.buf.is_empty() && now_ms.wrapping_sub(self.last_flush) > self.timeout_ms)
    }

    /// Drop pending bytes without sending them.
    pub fn discard(&mut self) {
        if !self.buf.is_empty() {
            warn!("link: discarding {} unsent bytes", self.buf.len());
        }
        self.buf.clear();
        self.must_flush = false;
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes that can still be written before the buffer is full.
    pub fn remaining(&self) -> usize {
        N - self.buf.len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes refused because the buffer was full.
    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    pub fn last_flush(&self) -> u32 {
        self.last_flush
    }
}

// ── Receive ──────────────────────────────────────────────────

/// Receive ring. Holds at most `N - 1` bytes.
pub struct RxBuffer<const N: usize> {
    ring: heapless::spsc::Queue<u8, N>,
    overflows: u32,
}

impl<const N: usize> RxBuffer<N> {
    pub const fn new() -> Self {
        Self {
            ring: heapless::spsc::Queue::new(),
            overflows: 0,
        }
    }

    /// Insert one received byte.
    ///
    /// On a full ring every buffered byte is dropped and the ring starts
    /// over empty; the new byte is dropped too.
    pub fn received(&mut self, byte: u8) -> Result<(), ChannelError> {
        if self.ring.enqueue(byte).is_err() {
            self.ring = heapless::spsc::Queue::new();
            self.overflows = self.overflows.wrapping_add(1);
            return Err(ChannelError::RxOverflow);
        }
        Ok(())
    }

    pub fn read(&mut self) -> Option<u8> {
        self.ring.dequeue()
    }

    pub fn peek(&self) -> Option<u8> {
        self.ring.peek().copied()
    }

    pub fn available(&self) -> usize {
        self.ring.len()
    }

    /// Times the ring was reset because it was full.
    pub fn overflows(&self) -> u32 {
        self.overflows
    }
}

impl<const N: usize> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Both halves ──────────────────────────────────────────────

/// Transmit and receive buffers of one channel.
pub struct BufferStream<const TX: usize, const RX: usize> {
    tx: TxBuffer<TX>,
    rx: RxBuffer<RX>,
}

impl<const TX: usize, const RX: usize> BufferStream<TX, RX> {
    pub const fn new(timeout_ms: u32) -> Self {
        Self {
            tx: TxBuffer::new(timeout_ms),
            rx: RxBuffer::new(),
        }
    }

    pub fn write(&mut self, byte: u8) -> Result<(), ChannelError> {
        self.tx.write(byte)
    }

    pub fn flush(&mut self, now_ms: u32, sink: &mut impl ByteSink) -> bool {
        self.tx.flush(now_ms, sink)
    }

    pub fn need_flush(&self, now_ms: u32) -> bool {
        self.tx.need_flush(now_ms)
    }

    pub fn received(&mut self, byte: u8) -> Result<(), ChannelError> {
        self.rx.received(byte)
    }

    pub fn read(&mut self) -> Option<u8> {
        self.rx.read()
    }

    pub fn peek(&self) -> Option<u8> {
        self.rx.peek()
    }

    pub fn available(&self) -> usize {
        self.rx.available()
    }

    pub fn tx(&self) -> &TxBuffer<TX> {
        &self.tx
    }

    pub fn tx_mut(&mut self) -> &mut TxBuffer<TX> {
        &mut self.tx
    }

    pub fn rx(&self) -> &RxBuffer<RX> {
        &self.rx
    }
}

// ── Tests ────────────────────────────────────────────────────
