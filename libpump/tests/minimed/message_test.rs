#[path = "../common/mod.rs"]
mod common;

use common::helpers::hex_bytes;
use libpump::minimed::{BatteryStatus, MessageBody, MessageType, PacketType, PumpMessage};

fn carelink_reply(hex: &str, crc: u8) -> Vec<u8> {
    let mut data = hex_bytes(hex);
    data.resize(70, 0);
    data.push(crc);
    data
}

#[test]
fn battery_reply_decodes() {
    let msg = PumpMessage::decode(&carelink_reply("a7350535720300008c", 0x0a)).unwrap();
    assert_eq!(msg.packet_type, PacketType::Carelink);
    assert_eq!(msg.address, common::fixtures::PUMP);
    assert_eq!(msg.message_type, MessageType::GetBattery);
    assert_eq!(
        msg.body,
        MessageBody::Battery(BatteryStatus {
            low: false,
            volts: 1.4
        })
    );
}

#[test]
fn model_reply_decodes() {
    let msg = PumpMessage::decode(&carelink_reply("a73505358d09033532330000", 0x5f)).unwrap();
    assert_eq!(msg.body, MessageBody::PumpModel("523".into()));
}

#[test]
fn truncated_message_is_rejected() {
    assert!(PumpMessage::decode(&hex_bytes("a73505")).is_err());
}
