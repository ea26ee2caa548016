//! Console text multiplexed onto the protocol link.

use core::fmt::Write as _;

use keylink::config::{FLUSH_TIMEOUT_MS, MatrixGeometry, ProtocolConfig, SysexEncoding};
use keylink::device::state::{ConfigId, DebugUserConfig};
use keylink::proto::message::{CommandKind, target};
use keylink::proto::sysex::STRING_DATA;
use keylink::LinkService;

use crate::mock_hw::{MockBoard, Wire, request7};

fn service(config: ProtocolConfig) -> LinkService<MockBoard> {
    LinkService::new(config, MockBoard::new(), MatrixGeometry::default()).unwrap()
}

fn console_text(wire: &mut Wire) -> Vec<Vec<u8>> {
    wire.take_frames()
        .into_iter()
        .filter(|f| f.command == STRING_DATA)
        .map(|f| f.data.to_vec())
        .collect()
}

#[test]
fn text_before_start_is_discarded() {
    let mut svc = service(ProtocolConfig::default());
    let mut wire = Wire::default();
    writeln!(svc.console(), "early").unwrap();
    assert_eq!(svc.task(0, &mut wire), 0);
    assert!(svc.console().pending().is_empty());

    svc.start();
    writeln!(svc.console(), "late").unwrap();
    svc.task(1, &mut wire);
    assert_eq!(console_text(&mut wire), vec![b"late\n".to_vec()]);
}

#[test]
fn partial_line_waits_for_idle_timeout() {
    let mut svc = service(ProtocolConfig::default());
    let mut wire = Wire::default();
    svc.start();
    write!(svc.console(), "abc").unwrap();
    svc.task(FLUSH_TIMEOUT_MS, &mut wire);
    assert!(console_text(&mut wire).is_empty());
    svc.task(FLUSH_TIMEOUT_MS + 1, &mut wire);
    assert_eq!(console_text(&mut wire), vec![b"abc".to_vec()]);
}

#[test]
fn banner_precedes_first_text_only() {
    let mut svc = service(ProtocolConfig {
        banner: Some(heapless::String::try_from("kl-test").unwrap()),
        ..ProtocolConfig::default()
    });
    let mut wire = Wire::default();
    svc.start();
    writeln!(svc.console(), "one").unwrap();
    svc.task(0, &mut wire);
    writeln!(svc.console(), "two").unwrap();
    svc.task(1, &mut wire);
    assert_eq!(
        console_text(&mut wire),
        vec![b"kl-test\n".to_vec(), b"one\n".to_vec(), b"two\n".to_vec()]
    );
}

#[test]
fn responses_and_text_never_interleave() {
    let mut svc = service(ProtocolConfig {
        encoding: SysexEncoding::Raw,
        ..ProtocolConfig::default()
    });
    let mut wire = Wire::default();
    for rep in request7(CommandKind::Get, &[1, target::DEFAULT_LAYER]) {
        svc.on_report(&rep);
    }
    writeln!(svc.console(), "{}", "t".repeat(100)).unwrap();
    svc.task(0, &mut wire);

    let frames = wire.take_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].command, CommandKind::Response as u8);
    assert_eq!(frames[1].command, STRING_DATA);
    assert_eq!(frames[1].data.len(), 101);
}

#[test]
fn protocol_trace_goes_to_console() {
    let mut svc = service(ProtocolConfig {
        encoding: SysexEncoding::Raw,
        ..ProtocolConfig::default()
    });
    let mut wire = Wire::default();
    let flags = DebugUserConfig::default().with(DebugUserConfig::PROTOCOL).0;
    let mut set = vec![1, target::CONFIG, ConfigId::DebugUser as u8];
    set.extend_from_slice(&flags.to_le_bytes());
    for rep in request7(CommandKind::Set, &set) {
        svc.on_report(&rep);
    }
    for rep in request7(CommandKind::Set, &[2, target::RGB_MATRIX_BUF, 0, 1, 9, 9, 9]) {
        svc.on_report(&rep);
    }
    svc.task(0, &mut wire);
    let text = console_text(&mut wire).concat();
    assert!(text.starts_with(b"QA:"));
    assert!(String::from_utf8_lossy(&text).contains("rgb:1 leds"));
}
