//! Request handlers and the route table.
//!
//! | kind | target          | payload                        | reply                          |
//! |------|-----------------|--------------------------------|--------------------------------|
//! | SET  | RGB_MATRIX_BUF  | `[led][dur][r][g][b]*`         | none                           |
//! | SET  | DEFAULT_LAYER   | `[layer]`                      | none                           |
//! | GET  | DEFAULT_LAYER   |                                | `[mask u32]`                   |
//! | SET  | MACWIN_MODE     | `[mode]` (`'-'` = hardware)    | none                           |
//! | GET  | MACWIN_MODE     |                                | `[mode]`                       |
//! | SET  | CLI             | see [`cli`](super::cli)        | CLI frames                     |
//! | GET  | STATUS          | `[status id]`                  | `[id][raw]`                    |
//! | GET  | STRUCT_LAYOUT   | `[group]`                      | one frame per struct           |
//! | SET  | CONFIG          | `[config id][raw]`             | none                           |
//! | GET  | CONFIG          | `[config id]`                  | `[id][raw]`                    |
//! | SET  | DYNLD_LOAD      | `[slot u16][offset u16][code]` | `[rc u8]`                      |
//! | SET  | DYNLD_EXEC      | `[slot u16][args]`             | `[rc i32]`                     |
//!
//! Invalid requests get `'i'`, unknown ids `'u'`, both only on versioned
//! links.

use super::Device;
use super::cli;
use super::state::{ConfigId, DeviceState, StatusId};
use crate::app::ports::Board;
use crate::dynld::RC_FAILED;
use crate::error::{DispatchError, StateError};
use crate::proto::dispatch::HandlerRegistry;
use crate::proto::message::{CommandKind, ErrorCode, Message, Responder, target};

/// Route table for a [`Device`] over board `B`.
pub fn registry<B: Board>() -> Result<HandlerRegistry<Device<B>>, DispatchError> {
    HandlerRegistry::new()
        .with(CommandKind::Set, target::RGB_MATRIX_BUF, set_rgb_buf::<B>)?
        .with(CommandKind::Set, target::DEFAULT_LAYER, set_default_layer::<B>)?
        .with(CommandKind::Get, target::DEFAULT_LAYER, get_default_layer::<B>)?
        .with(CommandKind::Set, target::MACWIN_MODE, set_macwin_mode::<B>)?
        .with(CommandKind::Get, target::MACWIN_MODE, get_macwin_mode::<B>)?
        .with(CommandKind::Set, target::CLI, set_cli::<B>)?
        .with(CommandKind::Get, target::STATUS, get_status::<B>)?
        .with(CommandKind::Get, target::STRUCT_LAYOUT, get_struct_layout::<B>)?
        .with(CommandKind::Set, target::CONFIG, set_config::<B>)?
        .with(CommandKind::Get, target::CONFIG, get_config::<B>)?
        .with(CommandKind::Set, target::DYNLD_LOAD, set_dynld_load::<B>)?
        .with(CommandKind::Set, target::DYNLD_EXEC, set_dynld_exec::<B>)
}

// ── Lighting, layers, modes ───────────────────────────────────

fn set_rgb_buf<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, _r: &mut Responder<'_>) {
    let applied = dev.rgb.apply(msg.payload);
    dev.trace(format_args!("rgb:{applied} leds\n"));
}

fn set_default_layer<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let Some(&layer) = msg.payload.first() else {
        r.error(msg.target, ErrorCode::InvalidSize);
        return;
    };
    let Some(mask) = 1u32.checked_shl(u32::from(layer)) else {
        r.error(msg.target, ErrorCode::InvalidSize);
        return;
    };
    dev.trace(format_args!("layer:{layer}\n"));
    dev.board.set_default_layer(mask);
}

fn get_default_layer<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let mut b = r.begin(msg.target);
    b.push_u32(dev.board.default_layer());
    r.send(b);
}

fn set_macwin_mode<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let Some(&raw) = msg.payload.first() else {
        r.error(msg.target, ErrorCode::InvalidSize);
        return;
    };
    let mode = if raw == b'-' { -1 } else { raw as i8 };
    dev.trace(format_args!("macwin:{mode}\n"));
    dev.board.set_macwin_mode(mode);
}

fn get_macwin_mode<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    r.reply(msg.target, &[dev.board.macwin_mode() as u8]);
}

fn set_cli<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    if !dev.cli_enabled() {
        r.error(msg.target, ErrorCode::Unsupported);
        return;
    }
    cli::handle(dev, msg.payload, r);
}

// ── Status, config, layouts ───────────────────────────────────

fn state_error(r: &mut Responder<'_>, target: u8, e: StateError) {
    let code = match e {
        StateError::UnknownId(_) => ErrorCode::Unsupported,
        StateError::ReadOnly(_) | StateError::ShortPayload { .. } => ErrorCode::InvalidSize,
    };
    r.error(target, code);
}

fn get_status<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let Some(&raw_id) = msg.payload.first() else {
        r.error(msg.target, ErrorCode::InvalidSize);
        return;
    };
    dev.trace(format_args!("status:get:{raw_id}\n"));
    let id = match StatusId::try_from(raw_id) {
        Ok(id) => id,
        Err(e) => return state_error(r, msg.target, e),
    };
    let bytes = DeviceState::status_bytes(id, &dev.board, dev.geometry());
    let mut b = r.begin(msg.target);
    b.push(raw_id).extend(&bytes);
    r.send(b);
}

fn get_struct_layout<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let Some(&group) = msg.payload.first() else {
        r.error(msg.target, ErrorCode::InvalidSize);
        return;
    };
    dev.trace(format_args!("struct_layout:get:{group}\n"));
    if dev.layouts.emit_group(group, r) == 0 {
        r.error(msg.target, ErrorCode::Unsupported);
    }
}

fn set_config<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let Some((&raw_id, body)) = msg.payload.split_first() else {
        r.error(msg.target, ErrorCode::InvalidSize);
        return;
    };
    dev.trace(format_args!("config:set:{raw_id}\n"));
    if let Err(e) = apply_config(dev, raw_id, body) {
        state_error(r, msg.target, e);
    }
}

fn apply_config<B: Board>(dev: &mut Device<B>, raw_id: u8, body: &[u8]) -> Result<(), StateError> {
    let id = ConfigId::try_from(raw_id)?;
    let geometry = *dev.geometry();
    dev.state.write_config(id, body, &geometry)?;
    let raw = dev.state.config_bytes(id, &dev.board, &geometry);
    dev.board.config_changed(id, &raw);
    Ok(())
}

fn get_config<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let Some(&raw_id) = msg.payload.first() else {
        r.error(msg.target, ErrorCode::InvalidSize);
        return;
    };
    dev.trace(format_args!("config:get:{raw_id}\n"));
    let id = match ConfigId::try_from(raw_id) {
        Ok(id) => id,
        Err(e) => return state_error(r, msg.target, e),
    };
    let bytes = dev.state.config_bytes(id, &dev.board, dev.geometry());
    let mut b = r.begin(msg.target);
    b.push(raw_id).extend(&bytes);
    r.send(b);
}

// ── Dynamic code ─────────────────────────────────────────────

fn set_dynld_load<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let rc = match msg.payload {
        [s0, s1, o0, o1, code @ ..] => {
            let slot = u16::from_le_bytes([*s0, *s1]);
            let offset = u16::from_le_bytes([*o0, *o1]);
            let rc = match dev.loader.load(slot, offset, code) {
                Ok(_) => 0,
                Err(e) => {
                    log::debug!("dynld: load rejected, {e}");
                    RC_FAILED
                }
            };
            dev.trace(format_args!(
                "dynld load id={slot},off={offset},len={},rc={rc}\n",
                code.len()
            ));
            rc
        }
        _ => RC_FAILED,
    };
    r.reply(msg.target, &[rc as u8]);
}

fn set_dynld_exec<B: Board>(dev: &mut Device<B>, msg: &Message<'_>, r: &mut Responder<'_>) {
    let rc = match msg.payload {
        [s0, s1, args @ ..] => {
            let slot = u16::from_le_bytes([*s0, *s1]);
            let rc = dev.exec(slot, args);
            dev.trace(format_args!("dynld exec id={slot} rc={rc}\n"));
            rc
        }
        _ => RC_FAILED,
    };
    let mut b = r.begin(msg.target);
    b.push_i32(rc);
    r.send(b);
}
