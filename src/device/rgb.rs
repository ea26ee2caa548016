//! Host colour-override buffer.
//!
//! The host paints individual LEDs for a number of frames:
//!
//! ```text
//! SET RGB_MATRIX_BUF  [led][duration][r][g][b] * N
//! ```
//!
//! Each render pass repaints every LED with frames left and counts them
//! down. Once nothing is left the buffer stops touching the matrix.

use crate::app::ports::KeyboardPort;

/// Upper bound on addressable LEDs.
pub const MAX_LEDS: usize = 192;

/// Bytes per record.
pub const RECORD_LEN: usize = 5;

/// Frames the diagnostic flash stays lit.
pub const DIAGNOSTIC_FRAMES: u8 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostLed {
    pub duration: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub struct RgbHostBuffer {
    leds: [HostLed; MAX_LEDS],
    led_count: u8,
    written: bool,
}

impl RgbHostBuffer {
    pub const fn new(led_count: u8) -> Self {
        Self {
            leds: [HostLed {
                duration: 0,
                r: 0,
                g: 0,
                b: 0,
            }; MAX_LEDS],
            led_count: if led_count as usize > MAX_LEDS {
                MAX_LEDS as u8
            } else {
                led_count
            },
            written: false,
        }
    }

    /// Apply override records. Stops at the first out-of-range LED index
    /// or incomplete record. Returns how many records were applied.
    pub fn apply(&mut self, payload: &[u8]) -> usize {
        let mut applied = 0;
        for rec in payload.chunks(RECORD_LEN) {
            let &[led, duration, r, g, b] = rec else {
                break;
            };
            if led >= self.led_count {
                break;
            }
            self.leds[led as usize] = HostLed { duration, r, g, b };
            self.written = true;
            applied += 1;
        }
        applied
    }

    /// Paint pending overrides through `kb`. Returns whether any LED was
    /// painted this frame.
    pub fn render(&mut self, kb: &mut impl KeyboardPort) -> bool {
        if !self.written {
            return false;
        }
        let mut painted = false;
        for (i, led) in self.leds[..self.led_count as usize].iter_mut().enumerate() {
            if led.duration > 0 {
                kb.set_led_color(i as u8, led.r, led.g, led.b);
                led.duration -= 1;
                painted = true;
            }
        }
        if !painted {
            self.written = false;
        }
        painted
    }

    /// Light `led` red for a while. Used as the visible signal for link
    /// buffer overruns.
    pub fn flash_diagnostic(&mut self, led: u8) {
        if led < self.led_count {
            self.leds[led as usize] = HostLed {
                duration: DIAGNOSTIC_FRAMES,
                r: 0xFF,
                g: 0,
                b: 0,
            };
            self.written = true;
        }
    }

    pub fn led(&self, index: u8) -> Option<HostLed> {
        self.leds[..self.led_count as usize].get(index as usize).copied()
    }

    pub fn is_active(&self) -> bool {
        self.written
    }
}
