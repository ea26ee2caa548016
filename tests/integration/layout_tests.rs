//! Struct introspection: emitted layouts against the live config bytes.

use std::sync::atomic::{AtomicU32, Ordering};

use keylink::config::{MatrixGeometry, ProtocolConfig, ProtocolVersion, SysexEncoding};
use keylink::device::state::{ConfigId, RgbConfig};
use keylink::layout::{
    BitOrder, FLAG_READ_ONLY, FieldDescriptor, FieldType, LAYOUT_FRAME_CAPACITY, LayoutEmitter,
    StructDescriptor,
};
use keylink::proto::message::{CommandKind, Outbox, Responder, target};
use keylink::LinkService;

use crate::mock_hw::{MockBoard, Wire, request7};

fn service() -> LinkService<MockBoard> {
    LinkService::new(
        ProtocolConfig {
            encoding: SysexEncoding::Raw,
            ..ProtocolConfig::default()
        },
        MockBoard::new(),
        MatrixGeometry::default(),
    )
    .unwrap()
}

fn get(svc: &mut LinkService<MockBoard>, data: &[u8]) -> Vec<Vec<u8>> {
    for rep in request7(CommandKind::Get, data) {
        svc.on_report(&rep);
    }
    let mut wire = Wire::default();
    svc.task(0, &mut wire);
    wire.take_responses()
}

#[test]
fn config_group_describes_every_table() {
    let mut svc = service();
    let frames = get(&mut svc, &[1, target::STRUCT_LAYOUT, target::CONFIG]);
    assert_eq!(frames.len(), 7);

    let headers: Vec<_> = frames.iter().map(|f| (f[3], f[4], f[5])).collect();
    assert_eq!(
        headers,
        vec![
            (1, 1, 0),
            (2, 4, 0),
            (3, 8, 0),
            (4, 2, 0),
            (5, 204, FLAG_READ_ONLY),
            (6, 1, 0),
            (7, 4, 0),
        ]
    );
    assert!(frames.iter().all(|f| f.len() <= LAYOUT_FRAME_CAPACITY));
    assert!(frames.iter().all(|f| (f.len() - 6) % 4 == 0));
}

#[test]
fn keymap_layout_is_a_u16_array() {
    let mut svc = service();
    let frames = get(&mut svc, &[1, target::STRUCT_LAYOUT, target::CONFIG]);
    let layout = &frames[4];
    // id 1, ARRAY|U16, offset 0, 102 keys
    assert_eq!(&layout[6..10], &[1, 0x80 | FieldType::U16 as u8, 0, 102]);
}

#[test]
fn legacy_layout_frames_have_no_sequence() {
    let mut svc = LinkService::new(
        ProtocolConfig {
            version: ProtocolVersion::Legacy,
            encoding: SysexEncoding::Raw,
            ..ProtocolConfig::default()
        },
        MockBoard::new(),
        MatrixGeometry::default(),
    )
    .unwrap();
    let frames = get(&mut svc, &[target::STRUCT_LAYOUT, target::STATUS]);
    assert_eq!(frames.len(), 3);
    assert_eq!(&frames[0][..5], &[target::STRUCT_LAYOUT, target::STATUS, 1, 4, FLAG_READ_ONLY]);
}

#[test]
fn descriptors_decode_live_config_bytes() {
    let mut svc = service();
    let rgb = RgbConfig {
        enable: 2,
        mode: 37,
        hue: 10,
        sat: 20,
        val: 30,
        speed: 40,
        flags: 0x0F,
    };
    svc.device_mut().state.rgb = rgb;
    let got = get(&mut svc, &[1, target::CONFIG, ConfigId::RgbMatrix as u8]);
    let raw = &got[0][3..];

    let desc = svc
        .device()
        .layouts
        .lookup(target::CONFIG, ConfigId::RgbMatrix as u8)
        .unwrap();
    assert_eq!(desc.field(1).unwrap().read(raw), Some(2));
    assert_eq!(desc.field(2).unwrap().read(raw), Some(37));
    assert_eq!(desc.field(5).unwrap().read(raw), Some(30));
    assert_eq!(desc.field(7).unwrap().read(raw), Some(0x0F));
}

static PROBES: AtomicU32 = AtomicU32::new(0);

fn msb_canary() -> u64 {
    PROBES.fetch_add(1, Ordering::SeqCst);
    0x80
}

#[test]
fn msb_first_canary_flips_bit_positions() {
    let mut emitter = LayoutEmitter::new(msb_canary);
    emitter
        .register(
            StructDescriptor::new(
                9,
                1,
                1,
                0,
                &[
                    FieldDescriptor::bits(1, 0, 1, 8),
                    FieldDescriptor::bits(2, 2, 3, 8),
                ],
            )
            .unwrap(),
        )
        .unwrap();

    let mut outbox = Outbox::new();
    let mut r = Responder::new(ProtocolVersion::Versioned, Some(3), &mut outbox);
    assert_eq!(emitter.emit_group(9, &mut r), 1);
    assert_eq!(emitter.emit_group(9, &mut r), 1);
    assert_eq!(emitter.bit_order(), BitOrder::MsbFirst);
    assert_eq!(PROBES.load(Ordering::SeqCst), 1);

    let frame = outbox.pop().unwrap();
    assert_eq!(
        frame.payload.as_slice(),
        &[3, target::STRUCT_LAYOUT, 9, 1, 1, 0, 1, 1, 7, 1, 2, 1, 5, 3]
    );
}

#[test]
fn schema_exports_as_json() {
    let svc = service();
    let json = svc.device().layouts.to_json().unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v["bit_order"], "LsbFirst");
    assert_eq!(v["structs"].as_array().unwrap().len(), 10);
}
