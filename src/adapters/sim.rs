//! Simulated board: every port backed by host memory.
//!
//! Used by the `keylink-sim` binary and by the test suites. The memory
//! port serves a private RAM image at [`SIM_RAM_BASE`], so CLI reads and
//! writes never touch the host process's own address space.

use log::{debug, info};

use crate::app::ports::{EepromPort, EepromRegion, KeyboardPort, MemoryPort};
use crate::config::MatrixGeometry;
use crate::device::state::ConfigId;

pub const SIM_EEPROM_SIZE: usize = 2048;
pub const SIM_RAM_BASE: u32 = 0x2000_0000;
pub const SIM_RAM_SIZE: usize = 4096;

/// Dynamic keymap region first, then user config.
const REGIONS: [EepromRegion; 2] = [
    EepromRegion {
        addr: 0x0040,
        size: 0x0400,
    },
    EepromRegion {
        addr: 0x0020,
        size: 0x0020,
    },
];

pub struct SimBoard {
    geometry: MatrixGeometry,
    default_layer: u32,
    macwin: i8,
    battery_level: u8,
    battery_mv: u16,
    dip: u8,
    matrix: Vec<u32>,
    leds: Vec<(u8, u8, u8, u8)>,
    debug_leds: u32,
    last_config: Option<(ConfigId, Vec<u8>)>,
    eeprom: Vec<u8>,
    ram: Vec<u8>,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new(MatrixGeometry::default())
    }
}

impl SimBoard {
    pub fn new(geometry: MatrixGeometry) -> Self {
        Self {
            geometry,
            default_layer: 1,
            macwin: 0,
            battery_level: 100,
            battery_mv: 4150,
            dip: 0,
            matrix: vec![0; geometry.rows as usize],
            leds: Vec::new(),
            debug_leds: 0,
            last_config: None,
            eeprom: vec![0; SIM_EEPROM_SIZE],
            ram: vec![0; SIM_RAM_SIZE],
        }
    }

    // ── Simulation controls ───────────────────────────────────

    /// Press or release a key in the raw matrix.
    pub fn set_key(&mut self, row: u8, col: u8, pressed: bool) {
        if let Some(bits) = self.matrix.get_mut(row as usize) {
            let mask = 1u32.checked_shl(u32::from(col)).unwrap_or(0);
            if pressed {
                *bits |= mask;
            } else {
                *bits &= !mask;
            }
        }
    }

    pub fn set_battery(&mut self, level: u8, millivolts: u16) {
        self.battery_level = level;
        self.battery_mv = millivolts;
    }

    pub fn set_dip_switches(&mut self, dip: u8) {
        self.dip = dip;
    }

    // ── Inspection ────────────────────────────────────────────

    /// Every `set_led_color` call so far, as `(index, r, g, b)`.
    pub fn leds(&self) -> &[(u8, u8, u8, u8)] {
        &self.leds
    }

    pub fn debug_leds(&self) -> u32 {
        self.debug_leds
    }

    /// The most recent host config write the board was told about.
    pub fn last_config(&self) -> Option<(ConfigId, Vec<u8>)> {
        self.last_config.clone()
    }

    fn ram_range(&self, addr: u32, len: usize) -> Option<core::ops::Range<usize>> {
        let start = addr.checked_sub(SIM_RAM_BASE)? as usize;
        let end = start.checked_add(len)?;
        (end <= self.ram.len()).then_some(start..end)
    }
}

// ── KeyboardPort implementation ───────────────────────────────

impl KeyboardPort for SimBoard {
    fn set_default_layer(&mut self, mask: u32) {
        debug!("sim: default layer {mask:#x}");
        self.default_layer = mask;
    }

    fn default_layer(&self) -> u32 {
        self.default_layer
    }

    fn set_macwin_mode(&mut self, mode: i8) {
        debug!("sim: macwin mode {mode}");
        self.macwin = mode;
    }

    fn macwin_mode(&self) -> i8 {
        self.macwin
    }

    fn battery_level(&self) -> u8 {
        self.battery_level
    }

    fn battery_voltage(&self) -> u16 {
        self.battery_mv
    }

    fn dip_switches(&self) -> u8 {
        self.dip
    }

    fn matrix_row(&self, row: u8) -> u32 {
        self.matrix.get(row as usize).copied().unwrap_or(0)
    }

    /// Keycodes count up row-major from 0x04 (KC_A).
    fn keycode(&self, row: u8, col: u8) -> u16 {
        if row >= self.geometry.rows || col >= self.geometry.cols {
            return 0;
        }
        0x04 + u16::from(row) * u16::from(self.geometry.cols) + u16::from(col)
    }

    fn set_led_color(&mut self, index: u8, r: u8, g: u8, b: u8) {
        self.leds.push((index, r, g, b));
    }

    fn debug_led_on(&mut self, led: u8) {
        info!("sim: debug led {led} on");
        self.debug_leds += 1;
    }

    fn config_changed(&mut self, id: ConfigId, raw: &[u8]) {
        debug!("sim: config {id:?} <- {raw:02x?}");
        self.last_config = Some((id, raw.to_vec()));
    }
}

// ── EepromPort implementation ─────────────────────────────────

impl EepromPort for SimBoard {
    /// Out-of-range reads return the erased value.
    fn read_byte(&self, addr: u32) -> u8 {
        self.eeprom.get(addr as usize).copied().unwrap_or(0xFF)
    }

    fn update_byte(&mut self, addr: u32, val: u8) {
        if let Some(b) = self.eeprom.get_mut(addr as usize) {
            if *b != val {
                *b = val;
            }
        }
    }

    fn regions(&self) -> &[EepromRegion] {
        &REGIONS
    }
}

// ── MemoryPort implementation ─────────────────────────────────

impl MemoryPort for SimBoard {
    fn read(&self, addr: u32, out: &mut [u8]) -> bool {
        let Some(range) = self.ram_range(addr, out.len()) else {
            return false;
        };
        out.copy_from_slice(&self.ram[range]);
        true
    }

    fn write(&mut self, addr: u32, width: u8, val: u32) -> bool {
        let width = width as usize;
        if !matches!(width, 1 | 2 | 4) {
            return false;
        }
        let Some(range) = self.ram_range(addr, width) else {
            return false;
        };
        self.ram[range].copy_from_slice(&val.to_le_bytes()[..width]);
        true
    }

    /// Nothing in the RAM image is executable.
    fn call(&mut self, addr: u32) -> bool {
        debug!("sim: refusing call to {addr:#x}");
        false
    }
}
