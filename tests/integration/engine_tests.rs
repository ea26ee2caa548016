//! End-to-end request/response scenarios through `LinkService`.

use keylink::config::{MatrixGeometry, ProtocolConfig, ProtocolVersion, SysexEncoding};
use keylink::device::state::{ConfigId, DebugConfig, StatusId};
use keylink::proto::message::{CommandKind, target};
use keylink::proto::sysex;
use keylink::LinkService;

use crate::mock_hw::{BoardCall, MockBoard, Wire, request, request7};

fn service(config: ProtocolConfig) -> LinkService<MockBoard> {
    LinkService::new(config, MockBoard::new(), MatrixGeometry::default()).unwrap()
}

fn versioned() -> LinkService<MockBoard> {
    service(ProtocolConfig {
        cli_enabled: true,
        ..ProtocolConfig::default()
    })
}

fn send(svc: &mut LinkService<MockBoard>, kind: CommandKind, data: &[u8]) {
    for rep in request7(kind, data) {
        assert!(svc.on_report(&rep));
    }
}

// ── Basic request paths ───────────────────────────────────────

#[test]
fn set_default_layer_then_read_back() {
    let mut svc = versioned();
    let mut wire = Wire::default();

    send(&mut svc, CommandKind::Set, &[1, target::DEFAULT_LAYER, 2]);
    assert_eq!(svc.device().board.last_call(), Some(&BoardCall::DefaultLayer(1 << 2)));

    send(&mut svc, CommandKind::Get, &[2, target::DEFAULT_LAYER]);
    svc.task(0, &mut wire);
    assert_eq!(
        wire.take_responses(),
        vec![vec![2, target::DEFAULT_LAYER, 4, 0, 0, 0]]
    );
}

#[test]
fn get_debug_config() {
    let mut svc = versioned();
    let mut wire = Wire::default();
    send(&mut svc, CommandKind::Get, &[9, target::CONFIG, ConfigId::Debug as u8]);
    svc.task(0, &mut wire);
    assert_eq!(
        wire.take_responses(),
        vec![vec![9, target::CONFIG, ConfigId::Debug as u8, DebugConfig::ENABLE]]
    );
}

#[test]
fn set_config_reaches_board() {
    let mut svc = versioned();
    send(
        &mut svc,
        CommandKind::Set,
        &[3, target::CONFIG, ConfigId::Debounce as u8, 20],
    );
    assert_eq!(svc.device().state.debounce, 20);
    assert_eq!(
        svc.device().board.last_call(),
        Some(&BoardCall::Config(ConfigId::Debounce, vec![20]))
    );
}

#[test]
fn dip_switch_status() {
    let mut svc = versioned();
    let mut wire = Wire::default();
    send(&mut svc, CommandKind::Get, &[4, target::STATUS, StatusId::DipSwitch as u8]);
    svc.task(0, &mut wire);
    assert_eq!(wire.take_responses(), vec![vec![4, target::STATUS, 2, 0b10]]);
}

#[test]
fn matrix_status_tracks_rows() {
    let mut svc = versioned();
    svc.device_mut().board.rows[1] = 0x0001_0003;
    let mut wire = Wire::default();
    send(&mut svc, CommandKind::Get, &[5, target::STATUS, StatusId::Matrix as u8]);
    svc.task(0, &mut wire);
    let got = wire.take_responses();
    assert_eq!(got.len(), 1);
    // six rows of four bytes behind [seq][target][id]
    assert_eq!(got[0].len(), 3 + 6 * 4);
    assert_eq!(&got[0][7..11], &[3, 0, 1, 0]);
}

// ── Error handling ────────────────────────────────────────────

#[test]
fn unknown_target_rejected_on_versioned_link() {
    let mut svc = versioned();
    let mut wire = Wire::default();
    send(&mut svc, CommandKind::Get, &[6, 0x42]);
    svc.task(0, &mut wire);
    assert_eq!(wire.take_responses(), vec![vec![6, 0x42, b'u']]);
    assert_eq!(svc.engine().stats().rejected, 1);
}

#[test]
fn legacy_link_is_silent_on_errors() {
    let mut svc = service(ProtocolConfig {
        version: ProtocolVersion::Legacy,
        ..ProtocolConfig::default()
    });
    let mut wire = Wire::default();
    send(&mut svc, CommandKind::Get, &[0x42]);
    send(&mut svc, CommandKind::Set, &[target::DEFAULT_LAYER]);
    send(&mut svc, CommandKind::Get, &[target::CONFIG, ConfigId::Debounce as u8]);
    svc.task(0, &mut wire);
    assert_eq!(
        wire.take_responses(),
        vec![vec![target::CONFIG, ConfigId::Debounce as u8, 5]]
    );
    assert_eq!(svc.engine().stats().ignored, 1);
}

#[test]
fn non_protocol_reports_are_ignored() {
    let mut svc = versioned();
    let mut report = vec![0u8; 32];
    report[0] = 0x01;
    assert!(svc.on_report(&report));
    assert!(!svc.engine().is_started());
    assert_eq!(svc.engine().reassembler().ignored(), 1);
}

#[test]
fn malformed_frame_dropped_and_counted() {
    let mut svc = versioned();
    // 7-bit frame with an odd body length.
    let mut report = vec![0u8; 32];
    report[..5].copy_from_slice(&[0xFA, 0xF0, 0x01, 0x01, 0xF7]);
    svc.on_report(&report);
    assert_eq!(svc.engine().stats().malformed, 1);

    let mut wire = Wire::default();
    svc.task(0, &mut wire);
    assert!(wire.take_responses().is_empty());
}

// ── Encodings and transports ──────────────────────────────────

#[test]
fn raw_frames_in_and_out() {
    let mut svc = service(ProtocolConfig {
        encoding: SysexEncoding::Raw,
        ..ProtocolConfig::default()
    });
    let mut wire = Wire::default();
    for rep in request(
        SysexEncoding::Raw,
        CommandKind::Get,
        &[1, target::CONFIG, ConfigId::KeymapLayout as u8],
        32,
    ) {
        svc.on_report(&rep);
    }
    svc.task(0, &mut wire);
    assert!(wire.reports.iter().all(|r| r[0] == 0xFA));
    let got = wire.take_responses();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].len(), 3 + 6 * 17 * 2);
    // (row 1, col 2) in the mock keymap
    let off = 3 + (17 + 2) * 2;
    assert_eq!(&got[0][off..off + 2], &[2, 1]);
}

#[test]
fn seven_bit_request_accepted_by_raw_configured_link() {
    let mut svc = service(ProtocolConfig {
        encoding: SysexEncoding::Raw,
        ..ProtocolConfig::default()
    });
    send(&mut svc, CommandKind::Set, &[1, target::MACWIN_MODE, b'-']);
    assert_eq!(svc.device().board.macwin, -1);
}

#[test]
fn byte_stream_input() {
    let mut svc = versioned();
    let mut frame = Vec::new();
    sysex::encode_with(
        SysexEncoding::SevenBit,
        CommandKind::Set as u8,
        &[1, target::DEFAULT_LAYER, 5],
        |b| frame.push(b),
    )
    .unwrap();
    for b in frame {
        svc.on_byte(b).unwrap();
    }
    let mut wire = Wire::default();
    svc.task(0, &mut wire);
    assert_eq!(svc.device().board.layer, 1 << 5);
    assert!(svc.engine().is_started());
}

#[test]
fn small_packets_carry_long_responses() {
    let mut svc = service(ProtocolConfig {
        packet_size: 8,
        ..ProtocolConfig::default()
    });
    let mut wire = Wire::default();
    for rep in request(
        SysexEncoding::SevenBit,
        CommandKind::Get,
        &[7, target::CONFIG, ConfigId::RgbMatrix as u8],
        8,
    ) {
        svc.on_report(&rep);
    }
    svc.task(0, &mut wire);
    assert!(wire.reports.len() > 1);
    assert!(wire.reports.iter().all(|r| r.len() == 8));
    let got = wire.take_responses();
    assert_eq!(got[0].len(), 3 + 8);
}

// ── Lighting ──────────────────────────────────────────────────

#[test]
fn host_led_override_expires() {
    let mut svc = versioned();
    let mut wire = Wire::default();
    send(
        &mut svc,
        CommandKind::Set,
        &[1, target::RGB_MATRIX_BUF, 4, 2, 1, 2, 3, 200, 1, 1, 1, 1],
    );
    for t in 0..4 {
        svc.task(t, &mut wire);
    }
    assert_eq!(svc.device().board.leds(), vec![(4, 1, 2, 3), (4, 1, 2, 3)]);
    assert!(!svc.device().rgb.is_active());
}

// ── Key events ────────────────────────────────────────────────

#[test]
fn key_event_published_after_devel_flag_set() {
    let mut svc = versioned();
    let mut wire = Wire::default();
    // devel: pub_keypress | process_keypress
    send(&mut svc, CommandKind::Set, &[1, target::CONFIG, ConfigId::Devel as u8, 3, 0, 0, 0]);
    svc.task(0, &mut wire);
    assert!(wire.take_frames().is_empty());

    assert!(svc.on_key_event(2, 9, true));
    svc.task(1, &mut wire);
    let frames = wire.take_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, CommandKind::Pub as u8);
    assert_eq!(frames[0].data.as_slice(), &[0, target::KEY_EVENT, 2, 9, 1]);
}
