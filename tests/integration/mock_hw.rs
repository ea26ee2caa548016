//! Mock board and host for integration tests.
//!
//! The board records every port call so tests can assert on the full
//! command history. The host side encodes requests into reports and
//! decodes whatever the service sends back.

use keylink::app::ports::{EepromPort, EepromRegion, KeyboardPort, MemoryPort};
use keylink::config::SysexEncoding;
use keylink::device::state::ConfigId;
use keylink::proto::chunked::{PacketReassembler, chunk_message};
use keylink::proto::message::CommandKind;
use keylink::proto::sysex::{self, SysexFrame};
use keylink::proto::transport::{REPORT_DISCRIMINATOR, Transport};

// ── Board call record ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum BoardCall {
    DefaultLayer(u32),
    MacWin(i8),
    Led { index: u8, r: u8, g: u8, b: u8 },
    DebugLed(u8),
    Config(ConfigId, Vec<u8>),
    EepromWrite { addr: u32, val: u8 },
    MemWrite { addr: u32, width: u8, val: u32 },
    Call(u32),
}

// ── MockBoard ─────────────────────────────────────────────────

const REGIONS: [EepromRegion; 2] = [
    EepromRegion { addr: 0x100, size: 0x200 },
    EepromRegion { addr: 0x20, size: 0x40 },
];

pub struct MockBoard {
    pub calls: Vec<BoardCall>,
    pub layer: u32,
    pub macwin: i8,
    pub rows: Vec<u32>,
    pub eeprom: [u8; 1024],
    pub battery: (u8, u16),
    pub dip: u8,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            layer: 1,
            macwin: 0,
            rows: vec![0; 6],
            eeprom: [0; 1024],
            battery: (87, 3900),
            dip: 0b10,
        }
    }

    pub fn last_call(&self) -> Option<&BoardCall> {
        self.calls.last()
    }

    pub fn leds(&self) -> Vec<(u8, u8, u8, u8)> {
        self.calls
            .iter()
            .filter_map(|c| match *c {
                BoardCall::Led { index, r, g, b } => Some((index, r, g, b)),
                _ => None,
            })
            .collect()
    }
}

impl KeyboardPort for MockBoard {
    fn set_default_layer(&mut self, mask: u32) {
        self.layer = mask;
        self.calls.push(BoardCall::DefaultLayer(mask));
    }

    fn default_layer(&self) -> u32 {
        self.layer
    }

    fn set_macwin_mode(&mut self, mode: i8) {
        self.macwin = mode;
        self.calls.push(BoardCall::MacWin(mode));
    }

    fn macwin_mode(&self) -> i8 {
        self.macwin
    }

    fn battery_level(&self) -> u8 {
        self.battery.0
    }

    fn battery_voltage(&self) -> u16 {
        self.battery.1
    }

    fn dip_switches(&self) -> u8 {
        self.dip
    }

    fn matrix_row(&self, row: u8) -> u32 {
        self.rows.get(row as usize).copied().unwrap_or(0)
    }

    fn keycode(&self, row: u8, col: u8) -> u16 {
        (u16::from(row) << 8) | u16::from(col)
    }

    fn set_led_color(&mut self, index: u8, r: u8, g: u8, b: u8) {
        self.calls.push(BoardCall::Led { index, r, g, b });
    }

    fn debug_led_on(&mut self, led: u8) {
        self.calls.push(BoardCall::DebugLed(led));
    }

    fn config_changed(&mut self, id: ConfigId, raw: &[u8]) {
        self.calls.push(BoardCall::Config(id, raw.to_vec()));
    }
}

impl EepromPort for MockBoard {
    fn read_byte(&self, addr: u32) -> u8 {
        self.eeprom.get(addr as usize).copied().unwrap_or(0xFF)
    }

    fn update_byte(&mut self, addr: u32, val: u8) {
        if let Some(b) = self.eeprom.get_mut(addr as usize) {
            *b = val;
            self.calls.push(BoardCall::EepromWrite { addr, val });
        }
    }

    fn regions(&self) -> &[EepromRegion] {
        &REGIONS
    }
}

impl MemoryPort for MockBoard {
    /// Every address reads as its own low byte.
    fn read(&self, addr: u32, out: &mut [u8]) -> bool {
        for (i, b) in out.iter_mut().enumerate() {
            *b = addr.wrapping_add(i as u32) as u8;
        }
        true
    }

    fn write(&mut self, addr: u32, width: u8, val: u32) -> bool {
        self.calls.push(BoardCall::MemWrite { addr, width, val });
        true
    }

    fn call(&mut self, addr: u32) -> bool {
        self.calls.push(BoardCall::Call(addr));
        true
    }
}

// ── Host side ─────────────────────────────────────────────────

/// Transport that keeps every report sent.
#[derive(Default)]
pub struct Wire {
    pub reports: Vec<Vec<u8>>,
}

impl Transport for Wire {
    type Error = ();

    fn send_report(&mut self, report: &[u8]) -> Result<(), ()> {
        self.reports.push(report.to_vec());
        Ok(())
    }
}

#[allow(dead_code)]
impl Wire {
    /// Decode every frame sent so far and forget the reports.
    pub fn take_frames(&mut self) -> Vec<SysexFrame> {
        let mut r = PacketReassembler::new();
        let mut frames = Vec::new();
        for rep in self.reports.drain(..) {
            r.feed(&rep, |f| frames.push(sysex::decode(f).unwrap()));
        }
        frames
    }

    /// Payloads of the response frames only.
    pub fn take_responses(&mut self) -> Vec<Vec<u8>> {
        self.take_frames()
            .into_iter()
            .filter(|f| f.command == CommandKind::Response as u8)
            .map(|f| f.data.to_vec())
            .collect()
    }
}

/// Encode `data` as one request frame and split it into reports.
#[allow(dead_code)]
pub fn request(
    encoding: SysexEncoding,
    kind: CommandKind,
    data: &[u8],
    packet_size: usize,
) -> Vec<Vec<u8>> {
    let mut frame = Vec::new();
    sysex::encode_with(encoding, kind as u8, data, |b| frame.push(b)).unwrap();
    chunk_message(REPORT_DISCRIMINATOR, &frame, packet_size)
        .map(|r| r.to_vec())
        .collect()
}

/// Seven-bit request in 32-byte reports.
#[allow(dead_code)]
pub fn request7(kind: CommandKind, data: &[u8]) -> Vec<Vec<u8>> {
    request(SysexEncoding::SevenBit, kind, data, 32)
}
