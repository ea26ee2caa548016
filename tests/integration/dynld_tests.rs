//! Code slot loading and execution over the link.

use keylink::config::{MatrixGeometry, ProtocolConfig, SysexEncoding};
use keylink::dynld::{COMMIT_OFFSET, ExecEnv, SLOT_CAPACITY, SlotCall, SlotExecutor, SlotId};
use keylink::proto::message::{CommandKind, target};
use keylink::proto::sysex::STRING_DATA;
use keylink::LinkService;

use crate::mock_hw::{MockBoard, Wire, request7};

/// Stands in for loaded code: sums its arguments and says hello.
struct Script {
    calls: Vec<SlotCall>,
}

impl SlotExecutor for Script {
    fn invoke(&mut self, call: SlotCall, env: &mut ExecEnv) -> i32 {
        self.calls.push(call);
        env.print(b"hi\n");
        env.args().iter().map(|&b| i32::from(b)).sum()
    }
}

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
    .with_executor(Script { calls: Vec::new() })
}

fn load(svc: &mut LinkService<MockBoard>, seq: u8, slot: u16, offset: u16, code: &[u8]) {
    let mut data = vec![seq, target::DYNLD_LOAD];
    data.extend_from_slice(&slot.to_le_bytes());
    data.extend_from_slice(&offset.to_le_bytes());
    data.extend_from_slice(code);
    for rep in request7(CommandKind::Set, &data) {
        svc.on_report(&rep);
    }
}

fn exec(svc: &mut LinkService<MockBoard>, seq: u8, slot: u16, args: &[u8]) {
    let mut data = vec![seq, target::DYNLD_EXEC];
    data.extend_from_slice(&slot.to_le_bytes());
    data.extend_from_slice(args);
    for rep in request7(CommandKind::Set, &data) {
        svc.on_report(&rep);
    }
}

fn exec_rc(resp: &[u8]) -> i32 {
    assert_eq!(resp[1], target::DYNLD_EXEC);
    i32::from_le_bytes(resp[2..6].try_into().unwrap())
}

#[test]
fn chunked_load_commit_and_exec() {
    let mut svc = service();
    let mut wire = Wire::default();
    let code: Vec<u8> = (1..=40).collect();
    load(&mut svc, 1, 1, 0, &code[..20]);
    load(&mut svc, 2, 1, 20, &code[20..]);
    load(&mut svc, 3, 1, COMMIT_OFFSET, &[]);

    let slot = svc.device().loader.slot(SlotId::Exec);
    assert!(slot.is_armed());
    assert_eq!(slot.len(), 40);
    assert_eq!(&slot.bytes()[..40], code.as_slice());

    exec(&mut svc, 4, 1, &[10, 20, 30]);
    svc.task(0, &mut wire);

    let frames = wire.take_frames();
    let responses: Vec<_> = frames
        .iter()
        .filter(|f| f.command == CommandKind::Response as u8)
        .map(|f| f.data.to_vec())
        .collect();
    assert_eq!(
        &responses[..3],
        &[
            vec![1, target::DYNLD_LOAD, 0],
            vec![2, target::DYNLD_LOAD, 0],
            vec![3, target::DYNLD_LOAD, 0],
        ]
    );
    assert_eq!(exec_rc(&responses[3]), 60);
    assert!(
        frames
            .iter()
            .any(|f| f.command == STRING_DATA && f.data.as_slice() == b"hi\n")
    );
}

#[test]
fn exec_of_unarmed_slot_fails() {
    let mut svc = service();
    let mut wire = Wire::default();
    load(&mut svc, 1, 2, 0, &[0xAA, 0xBB]);
    exec(&mut svc, 2, 2, &[]);
    svc.task(0, &mut wire);
    let got = wire.take_responses();
    assert_eq!(exec_rc(&got[1]), -1);
}

#[test]
fn zero_prefix_unloads_armed_slot() {
    let mut svc = service();
    let mut wire = Wire::default();
    load(&mut svc, 1, 2, 0, &[0x70, 0x47]);
    load(&mut svc, 2, 2, COMMIT_OFFSET, &[]);
    assert!(svc.device().loader.slot(SlotId::Test).is_armed());

    load(&mut svc, 3, 2, 0, &[0, 0]);
    load(&mut svc, 4, 2, COMMIT_OFFSET, &[]);
    assert!(!svc.device().loader.slot(SlotId::Test).is_armed());

    exec(&mut svc, 5, 2, &[]);
    svc.task(0, &mut wire);
    let got = wire.take_responses();
    assert_eq!(exec_rc(&got[4]), -1);
}

#[test]
fn overflowing_load_clears_slot_and_fails() {
    let mut svc = service();
    let mut wire = Wire::default();
    load(&mut svc, 1, 1, 0, &[1, 2, 3, 4]);
    load(&mut svc, 2, 1, COMMIT_OFFSET, &[]);
    load(&mut svc, 3, 1, (SLOT_CAPACITY - 2) as u16, &[9, 9, 9, 9]);
    svc.task(0, &mut wire);

    let got = wire.take_responses();
    assert_eq!(got[2], vec![3, target::DYNLD_LOAD, 0xFF]);
    let slot = svc.device().loader.slot(SlotId::Exec);
    assert!(!slot.is_armed());
    assert!(slot.is_empty());
}

#[test]
fn animation_slot_is_not_directly_executable() {
    let mut svc = service();
    let mut wire = Wire::default();
    load(&mut svc, 1, 0, 0, &[0x10, 0xB5]);
    load(&mut svc, 2, 0, COMMIT_OFFSET, &[]);
    assert!(svc.device().loader.animation_entry().is_some());

    exec(&mut svc, 3, 0, &[]);
    svc.task(0, &mut wire);
    let got = wire.take_responses();
    assert_eq!(exec_rc(&got[2]), -1);
}

#[test]
fn bad_slot_and_short_request_fail() {
    let mut svc = service();
    let mut wire = Wire::default();
    load(&mut svc, 1, 7, 0, &[1, 2]);
    for rep in request7(CommandKind::Set, &[2, target::DYNLD_LOAD, 1, 0]) {
        svc.on_report(&rep);
    }
    exec(&mut svc, 3, 9, &[]);
    svc.task(0, &mut wire);
    let got = wire.take_responses();
    assert_eq!(got[0], vec![1, target::DYNLD_LOAD, 0xFF]);
    assert_eq!(got[1], vec![2, target::DYNLD_LOAD, 0xFF]);
    assert_eq!(exec_rc(&got[2]), -1);
}
