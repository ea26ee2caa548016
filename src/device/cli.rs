//! Development CLI carried inside `SET CLI` requests.
//!
//! ```text
//! request   [cli_seq][cmd][args...]
//!           cmd = WRITE(0x80) | LAYOUT(0x40) | MEMORY(1) / EEPROM(2) / CALL(3)
//!
//! read      [addr u32][len u8]               -> [cli_seq][bytes...]
//! write     [addr u32][len u8][val u32]      -> [cli_seq][0]
//! layout    EEPROM only                      -> [cli_seq]([idx][addr u32][size u32])*
//! call      [addr u32]                       -> [cli_seq][0]
//! failure                                    -> [cli_seq]['u' | 'i']
//! ```
//!
//! All multi-byte fields are little endian. Every reply, including the
//! status byte, is sent on the CLI target.

use log::debug;

use super::Device;
use crate::app::ports::Board;
use crate::proto::message::{ErrorCode, Responder, target};

/// Largest read a single request may ask for.
pub const MAX_READ_LEN: usize = 64;

pub const CMD_WRITE: u8 = 0x80;
pub const CMD_LAYOUT: u8 = 0x40;
pub const CMD_MASK: u8 = 0x3F;

pub const CMD_MEMORY: u8 = 0x01;
pub const CMD_EEPROM: u8 = 0x02;
pub const CMD_CALL: u8 = 0x03;

/// Decoded `[addr][len]` (and `[val]` for writes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Access {
    addr: u32,
    len: u8,
    val: u32,
}

impl Access {
    fn parse(args: &[u8], write: bool) -> Option<Self> {
        let addr = u32::from_le_bytes(args.get(0..4)?.try_into().ok()?);
        let len = *args.get(4)?;
        let val = if write {
            u32::from_le_bytes(args.get(5..9)?.try_into().ok()?)
        } else {
            0
        };
        Some(Self { addr, len, val })
    }
}

/// Run one CLI request.
pub fn handle<B: Board>(dev: &mut Device<B>, payload: &[u8], r: &mut Responder<'_>) {
    let [cli_seq, cmd, args @ ..] = payload else {
        r.error(target::CLI, ErrorCode::InvalidSize);
        return;
    };
    let cli_seq = *cli_seq;
    let write = cmd & CMD_WRITE != 0;
    let layout = cmd & CMD_LAYOUT != 0;
    dev.trace(format_args!(
        "cli[{cli_seq}]:{}, len={}\n",
        cmd & CMD_MASK,
        payload.len()
    ));

    match cmd & CMD_MASK {
        CMD_MEMORY if layout => status(r, cli_seq, ErrorCode::Unsupported),
        CMD_MEMORY => memory(dev, cli_seq, write, args, r),
        CMD_EEPROM if layout => eeprom_layout(dev, cli_seq, r),
        CMD_EEPROM => eeprom(dev, cli_seq, write, args, r),
        CMD_CALL => call(dev, cli_seq, args, r),
        other => {
            debug!("cli: unsupported command {other}");
            status(r, cli_seq, ErrorCode::Unsupported);
        }
    }
}

fn status(r: &mut Responder<'_>, cli_seq: u8, code: ErrorCode) {
    let mut b = r.begin(target::CLI);
    b.push(cli_seq).push(code as u8);
    r.send(b);
}

fn memory<B: Board>(
    dev: &mut Device<B>,
    cli_seq: u8,
    write: bool,
    args: &[u8],
    r: &mut Responder<'_>,
) {
    let Some(a) = Access::parse(args, write) else {
        status(r, cli_seq, ErrorCode::InvalidSize);
        return;
    };

    if write {
        if !matches!(a.len, 1 | 2 | 4) {
            dev.trace(format_args!("invalid size\n"));
            status(r, cli_seq, ErrorCode::InvalidSize);
            return;
        }
        if !dev.board.write(a.addr, a.len, a.val) {
            status(r, cli_seq, ErrorCode::Unsupported);
            return;
        }
        dev.trace(format_args!("m[{:#x}:{}]<-{:#x}\n", a.addr, a.len, a.val));
        status(r, cli_seq, ErrorCode::Ok);
        return;
    }

    let len = a.len as usize;
    if len > MAX_READ_LEN {
        dev.trace(format_args!("len too large\n"));
        status(r, cli_seq, ErrorCode::InvalidSize);
        return;
    }
    let mut bytes = [0u8; MAX_READ_LEN];
    if !dev.board.read(a.addr, &mut bytes[..len]) {
        status(r, cli_seq, ErrorCode::Unsupported);
        return;
    }
    dev.trace(format_args!("m[{:#x}:{}]={:02x?}\n", a.addr, len, &bytes[..len]));
    let mut b = r.begin(target::CLI);
    b.push(cli_seq).extend(&bytes[..len]);
    r.send(b);
}

fn eeprom_layout<B: Board>(dev: &mut Device<B>, cli_seq: u8, r: &mut Responder<'_>) {
    let mut b = r.begin(target::CLI);
    b.push(cli_seq);
    for (i, region) in dev.board.regions().iter().enumerate() {
        b.push(i as u8 + 1).push_u32(region.addr).push_u32(region.size);
    }
    r.send(b);
}

fn eeprom<B: Board>(
    dev: &mut Device<B>,
    cli_seq: u8,
    write: bool,
    args: &[u8],
    r: &mut Responder<'_>,
) {
    let Some(a) = Access::parse(args, write) else {
        status(r, cli_seq, ErrorCode::InvalidSize);
        return;
    };

    if write {
        match a.len {
            1 => dev.board.update_byte(a.addr, a.val as u8),
            2 => dev.board.update_word(a.addr, a.val as u16),
            4 => dev.board.update_dword(a.addr, a.val),
            _ => {
                dev.trace(format_args!("invalid size\n"));
                status(r, cli_seq, ErrorCode::InvalidSize);
                return;
            }
        }
        dev.trace(format_args!("e[{:#x}:{}]<-{:#x}\n", a.addr, a.len, a.val));
        status(r, cli_seq, ErrorCode::Ok);
        return;
    }

    let len = a.len as usize;
    if len > MAX_READ_LEN {
        dev.trace(format_args!("len too large\n"));
        status(r, cli_seq, ErrorCode::InvalidSize);
        return;
    }
    let mut b = r.begin(target::CLI);
    b.push(cli_seq);
    match len {
        1 => {
            b.push(dev.board.read_byte(a.addr));
        }
        2 => {
            b.push_u16(dev.board.read_word(a.addr));
        }
        4 => {
            b.push_u32(dev.board.read_dword(a.addr));
        }
        _ => {
            for i in 0..a.len {
                b.push(dev.board.read_byte(a.addr.wrapping_add(u32::from(i))));
            }
        }
    }
    r.send(b);
}

fn call<B: Board>(dev: &mut Device<B>, cli_seq: u8, args: &[u8], r: &mut Responder<'_>) {
    let Some(addr) = args.get(0..4).and_then(|b| b.try_into().ok()).map(u32::from_le_bytes) else {
        status(r, cli_seq, ErrorCode::InvalidSize);
        return;
    };
    if addr == 0 {
        dev.board.debug_led_on(0);
    } else {
        dev.trace(format_args!("call:{addr:#x}\n"));
        if !dev.board.call(addr) {
            status(r, cli_seq, ErrorCode::Unsupported);
            return;
        }
    }
    status(r, cli_seq, ErrorCode::Ok);
}
