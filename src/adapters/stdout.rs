//! Line-oriented hex transport for the host simulator.
//!
//! Each outbound report becomes one line of space-separated hex bytes on
//! the wrapped writer. [`parse_hex_report`] reads the same format back.

use std::io::{self, Write};

use crate::proto::transport::Transport;

pub struct HexLineTransport<W: Write> {
    out: W,
    sent: u32,
}

impl<W: Write> HexLineTransport<W> {
    pub fn new(out: W) -> Self {
        Self { out, sent: 0 }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Transport for HexLineTransport<W> {
    type Error = io::Error;

    fn send_report(&mut self, report: &[u8]) -> io::Result<()> {
        let mut first = true;
        for b in report {
            if !first {
                self.out.write_all(b" ")?;
            }
            write!(self.out, "{b:02x}")?;
            first = false;
        }
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.sent += 1;
        Ok(())
    }
}

/// Parse one line of whitespace-separated hex bytes, zero padded to
/// `packet_size`. `None` on a bad token or an over-long line.
pub fn parse_hex_report(line: &str, packet_size: usize) -> Option<Vec<u8>> {
    let mut report = Vec::with_capacity(packet_size);
    for tok in line.split_whitespace() {
        report.push(u8::from_str_radix(tok, 16).ok()?);
    }
    if report.len() > packet_size {
        return None;
    }
    report.resize(packet_size, 0);
    Some(report)
}
