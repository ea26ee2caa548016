//! Fuzz target: inbound report path.
//!
//! Splits arbitrary input into reports, runs them through the
//! reassembler and decodes every completed frame. Nothing may panic,
//! and every decoded payload must fit a frame buffer.
//!
//! cargo fuzz run fuzz_report_decoder

#![no_main]

use keylink::config::{DEFAULT_PACKET_SIZE, MAX_FRAME_SIZE, ProtocolVersion};
use keylink::proto::chunked::PacketReassembler;
use keylink::proto::message::Message;
use keylink::proto::sysex;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reassembler = PacketReassembler::new();
    for report in data.chunks(DEFAULT_PACKET_SIZE) {
        reassembler.feed(report, |frame| {
            assert!(frame.len() <= MAX_FRAME_SIZE);
            if let Ok(decoded) = sysex::decode(frame) {
                assert!(decoded.data.len() <= MAX_FRAME_SIZE);
                let _ = Message::parse(ProtocolVersion::Versioned, decoded.command, &decoded.data);
                let _ = Message::parse(ProtocolVersion::Legacy, decoded.command, &decoded.data);
            }
        });
    }

    // A reset reassembler accepts the same input again.
    reassembler.reset();
    for report in data.chunks(DEFAULT_PACKET_SIZE) {
        let _ = reassembler.feed(report, |_| {});
    }
});
