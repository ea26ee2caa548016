//! Port traits, the boundary between the protocol engine and the board.
//!
//! ```text
//!   Board adapter ──▶ Port traits ──▶ Device handlers ──▶ LinkService
//! ```
//!
//! Matrix scanning, lighting, EEPROM emulation and raw memory access all
//! belong to the firmware around the engine. Handlers only ever reach
//! them through these traits, so the engine runs unchanged against real
//! hardware, the host simulator, or a test mock.
//!
//! ## Safety notes
//!
//! - **MemoryPort** implementations decide which addresses are reachable.
//!   The simulator serves a private RAM image; only the `native-exec`
//!   adapter touches real addresses.
//! - Nothing here is required to be interrupt-safe. All calls happen from
//!   the polling task.

use crate::device::state::ConfigId;

// ───────────────────────────────────────────────────────────────
// Keyboard port (layers, modes, status, lighting)
// ───────────────────────────────────────────────────────────────

/// Keyboard-side collaborators the handlers drive or query.
pub trait KeyboardPort {
    /// Replace the default layer state with `mask`.
    fn set_default_layer(&mut self, mask: u32);

    /// Current default layer state mask.
    fn default_layer(&self) -> u32;

    /// Force mac/win mode; `-1` returns control to the hardware switch.
    fn set_macwin_mode(&mut self, mode: i8);

    fn macwin_mode(&self) -> i8;

    /// Battery charge in percent.
    fn battery_level(&self) -> u8;

    /// Battery voltage in millivolts.
    fn battery_voltage(&self) -> u16;

    /// DIP switch states, one bit per switch.
    fn dip_switches(&self) -> u8;

    /// Raw (undebounced) matrix row, one bit per column.
    fn matrix_row(&self, row: u8) -> u32;

    /// Layer-0 keycode at (row, col).
    fn keycode(&self, row: u8, col: u8) -> u16;

    /// Paint one LED for the current frame.
    fn set_led_color(&mut self, index: u8, r: u8, g: u8, b: u8);

    /// Light the board's debug indicator.
    fn debug_led_on(&mut self, led: u8);

    /// A config struct the board owns was rewritten by the host.
    fn config_changed(&mut self, _id: ConfigId, _raw: &[u8]) {}
}

// ───────────────────────────────────────────────────────────────
// EEPROM port
// ───────────────────────────────────────────────────────────────

/// A named EEPROM region reported by the CLI layout query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EepromRegion {
    pub addr: u32,
    pub size: u32,
}

/// Byte-addressed persistent storage.
///
/// Word and dword accessors are little endian and need not be aligned.
/// The defaults compose them from byte accesses.
pub trait EepromPort {
    fn read_byte(&self, addr: u32) -> u8;

    /// Write `val` only if it differs from the stored byte.
    fn update_byte(&mut self, addr: u32, val: u8);

    fn read_word(&self, addr: u32) -> u16 {
        u16::from_le_bytes([self.read_byte(addr), self.read_byte(addr.wrapping_add(1))])
    }

    fn read_dword(&self, addr: u32) -> u32 {
        let mut b = [0u8; 4];
        for (i, v) in b.iter_mut().enumerate() {
            *v = self.read_byte(addr.wrapping_add(i as u32));
        }
        u32::from_le_bytes(b)
    }

    fn update_word(&mut self, addr: u32, val: u16) {
        for (i, v) in val.to_le_bytes().into_iter().enumerate() {
            self.update_byte(addr.wrapping_add(i as u32), v);
        }
    }

    fn update_dword(&mut self, addr: u32, val: u32) {
        for (i, v) in val.to_le_bytes().into_iter().enumerate() {
            self.update_byte(addr.wrapping_add(i as u32), v);
        }
    }

    /// Regions the host may browse: dynamic keymap first, then user
    /// config.
    fn regions(&self) -> &[EepromRegion];
}

// ───────────────────────────────────────────────────────────────
// Memory port (development CLI only)
// ───────────────────────────────────────────────────────────────

/// Raw address-space access for the development CLI.
pub trait MemoryPort {
    /// Copy `out.len()` bytes starting at `addr`. `false` if the range is
    /// not readable.
    fn read(&self, addr: u32, out: &mut [u8]) -> bool;

    /// Store the low `width` bytes of `val` at `addr` (width 1, 2 or 4).
    fn write(&mut self, addr: u32, width: u8, val: u32) -> bool;

    /// Call the function at `addr` with `-1`.
    fn call(&mut self, addr: u32) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock. Wraps at `u32::MAX`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Everything a device needs from its board.
pub trait Board: KeyboardPort + EepromPort + MemoryPort {}

impl<T: KeyboardPort + EepromPort + MemoryPort> Board for T {}
