#[path = "../common/mod.rs"]
mod common;

use libpump::protocol::{decode_4b6b, decode_4b6b_until_terminator, encode_4b6b};
use libpump::PumpId;
use libpump::minimed::{MessageType, MinimedPacket, PumpMessage};

#[test]
fn single_byte_encoding() {
    assert_eq!(encode_4b6b(&[0xa7]), vec![0xa9, 0x60]);
}

#[test]
fn invalid_symbols_are_rejected() {
    assert_eq!(decode_4b6b(&[0xff, 0xff]), None);
}

#[test]
fn pump_frame_survives_the_air() {
    common::helpers::init_logging();
    let message = PumpMessage::short(PumpId::from_bytes([0x35, 0x05, 0x35]), MessageType::GetPumpModel);
    let air = message.to_air();
    let packet = MinimedPacket::decode(&air).unwrap();
    assert_eq!(packet.data, message.encode());
}

#[test]
fn terminator_ends_minimed_frames() {
    let mut coded = encode_4b6b(&[0x12, 0x34, 0x56]);
    coded.push(0);
    coded.push(0xff);
    assert_eq!(decode_4b6b_until_terminator(&coded).unwrap(), vec![0x12, 0x34, 0x56]);
}
