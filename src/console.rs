//! Console multiplexer.
//!
//! Firmware debug output lands here through [`core::fmt::Write`]. The
//! engine's polling pass checks [`ConsoleMux::need_flush`] and wraps the
//! pending text in STRING_DATA frames on the protocol link. Text written
//! faster than it can be flushed is dropped and counted, never blocking
//! the writer.

use core::fmt;

use log::debug;

use crate::config::{BANNER_CAPACITY, CONSOLE_BUFFER_SIZE};
use crate::proto::stream::{ByteSink, TxBuffer};

/// Buffered console text channel.
pub struct ConsoleMux {
    buf: TxBuffer<CONSOLE_BUFFER_SIZE>,
    banner: Option<heapless::String<BANNER_CAPACITY>>,
    banner_sent: bool,
    dropped: u32,
}

impl ConsoleMux {
    pub const fn new(timeout_ms: u32) -> Self {
        Self {
            buf: TxBuffer::new(timeout_ms),
            banner: None,
            banner_sent: false,
            dropped: 0,
        }
    }

    /// Send `banner` as its own line before the first console flush.
    /// Longer banners are cut at the last whole character that fits.
    pub fn with_banner(mut self, banner: &str) -> Self {
        let mut line = heapless::String::new();
        for c in banner.chars() {
            if line.len() + c.len_utf8() >= BANNER_CAPACITY {
                break;
            }
            let _ = line.push(c);
        }
        let _ = line.push('\n');
        self.banner = Some(line);
        self
    }

    /// Append raw console bytes. Bytes that do not fit are dropped.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.buf.write(b).is_err() {
                self.dropped = self.dropped.wrapping_add(1);
            }
        }
    }

    pub fn need_flush(&self, now_ms: u32) -> bool {
        self.buf.need_flush(now_ms)
    }

    /// Hand pending text, preceded once by the banner, to `sink`.
    pub fn flush(&mut self, now_ms: u32, sink: &mut impl ByteSink) -> bool {
        if self.buf.is_empty() {
            return self.buf.flush(now_ms, sink);
        }
        if !self.banner_sent {
            if let Some(banner) = &self.banner {
                sink.send_data(banner.as_bytes());
            }
            self.banner_sent = true;
        }
        self.buf.flush(now_ms, sink)
    }

    /// Drop pending text. Used while no host is listening.
    pub fn discard(&mut self) {
        debug!("console: {} bytes discarded, link not started", self.buf.len());
        self.buf.discard();
    }

    pub fn pending(&self) -> &[u8] {
        self.buf.pending()
    }

    /// Bytes lost because the buffer was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn banner_sent(&self) -> bool {
        self.banner_sent
    }
}

impl fmt::Write for ConsoleMux {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}
