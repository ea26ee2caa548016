//! Chunked transfer over fixed-size reports.
//!
//! Every report carries a discriminator byte followed by up to
//! `packet_size - 1` bytes of the outbound byte stream. The last report
//! of a flush is zero padded:
//!
//! ```text
//! Report 1: [FA] bytes 0 .. P-1
//! Report 2: [FA] bytes P-1 .. 2(P-1)
//! Report N: [FA] remaining bytes, 00 00 ... (padding)
//! ```
//!
//! Inbound reports are stripped of their discriminator and run through
//! a [`SysexDecoder`], which reconstructs frames that span several
//! reports and ignores the trailing padding.

use log::{debug, warn};

use super::stream::ByteSink;
use super::sysex::SysexDecoder;
use super::transport::{REPORT_DISCRIMINATOR, Transport};
use crate::config::MAX_PACKET_SIZE;

/// One outbound report.
pub type Report = heapless::Vec<u8, MAX_PACKET_SIZE>;

/// Iterator over the reports carrying one byte run.
pub struct Chunks<'a> {
    discriminator: u8,
    data: &'a [u8],
    packet_size: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Report;

    fn next(&mut self) -> Option<Report> {
        if self.data.is_empty() {
            return None;
        }
        let take = self.data.len().min(self.packet_size - 1);
        let (head, rest) = self.data.split_at(take);
        self.data = rest;

        let mut report = Report::new();
        // Capacities were clamped in `chunk_message`; none of these fail.
        let _ = report.push(self.discriminator);
        let _ = report.extend_from_slice(head);
        let _ = report.resize(self.packet_size, 0);
        Some(report)
    }
}

/// Split `data` into reports of exactly `packet_size` bytes.
///
/// `packet_size` is clamped to `2..=MAX_PACKET_SIZE`. Empty input yields
/// no reports.
pub fn chunk_message(discriminator: u8, data: &[u8], packet_size: usize) -> Chunks<'_> {
    Chunks {
        discriminator,
        data,
        packet_size: packet_size.clamp(2, MAX_PACKET_SIZE),
    }
}

/// Send `data` as a run of reports. Returns the number of reports sent.
pub fn send_chunked<T: Transport>(
    transport: &mut T,
    data: &[u8],
    packet_size: usize,
) -> Result<usize, T::Error> {
    let mut sent = 0;
    for report in chunk_message(REPORT_DISCRIMINATOR, data, packet_size) {
        transport.send_report(&report)?;
        sent += 1;
    }
    Ok(sent)
}

/// Byte sink that chunks flushed data onto a transport.
///
/// Transport failures are logged and counted; the rest of that flush is
/// abandoned.
pub struct ChunkSink<'a, T: Transport> {
    transport: &'a mut T,
    packet_size: usize,
    reports: u32,
    failures: u32,
}

impl<'a, T: Transport> ChunkSink<'a, T> {
    pub fn new(transport: &'a mut T, packet_size: usize) -> Self {
        Self {
            transport,
            packet_size,
            reports: 0,
            failures: 0,
        }
    }

    /// Reports successfully handed to the transport.
    pub fn reports(&self) -> u32 {
        self.reports
    }

    /// Flushes abandoned because the transport refused a report.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl<T: Transport> ByteSink for ChunkSink<'_, T> {
    fn send_data(&mut self, data: &[u8]) {
        for report in chunk_message(REPORT_DISCRIMINATOR, data, self.packet_size) {
            if let Err(e) = self.transport.send_report(&report) {
                warn!("link: report send failed: {:?}", e);
                self.failures += 1;
                return;
            }
            self.reports += 1;
        }
    }
}

// ── Inbound ──────────────────────────────────────────────────

/// Reconstructs frames from inbound reports.
pub struct PacketReassembler {
    decoder: SysexDecoder,
    ignored: u32,
}

impl PacketReassembler {
    pub fn new() -> Self {
        Self {
            decoder: SysexDecoder::new(),
            ignored: 0,
        }
    }

    /// Feed one inbound report, calling `on_frame` for every frame it
    /// completes.
    ///
    /// Returns `None` when the report is not protocol traffic, otherwise
    /// the number of frames completed.
    pub fn feed(&mut self, report: &[u8], mut on_frame: impl FnMut(&[u8])) -> Option<usize> {
        let Some((&REPORT_DISCRIMINATOR, body)) = report.split_first() else {
            self.ignored += 1;
            return None;
        };

        let mut frames = 0;
        for &b in body {
            if let Some(frame) = self.decoder.push(b) {
                on_frame(frame);
                frames += 1;
            }
        }
        if frames == 0 && self.decoder.is_active() {
            debug!("link: frame continues past report");
        }
        Some(frames)
    }

    /// Discard any partial frame.
    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    /// Whether a frame is partially reassembled.
    pub fn is_active(&self) -> bool {
        self.decoder.is_active()
    }

    /// Partial frames discarded (buffer exhausted or restarted).
    pub fn discarded(&self) -> u32 {
        self.decoder.dropped()
    }

    /// Reports without the discriminator.
    pub fn ignored(&self) -> u32 {
        self.ignored
    }
}

impl Default for PacketReassembler {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────
