#[path = "../common/mod.rs"]
mod common;

use common::fixtures::{GET_STATUS_MESSAGE, PRIMING_FAULT};
use common::helpers::hex_bytes;
use libpump::omnipod::{MessageBlock, MessageBlockType, PodInfoType, PodMessage, PodPacket, PodPacketType};
use libpump::{Error, PodAddress};

#[test]
fn pdm_get_status_decodes() {
    let msg = PodMessage::decode(&hex_bytes(GET_STATUS_MESSAGE)).unwrap();
    assert_eq!(msg.address, PodAddress::new(0x1f01482a));
    assert_eq!(msg.sequence, 4);
    match &msg.blocks[..] {
        [MessageBlock::GetStatus(get)] => assert_eq!(get.info_type, PodInfoType::Normal),
        other => panic!("unexpected blocks {:?}", other),
    }
    assert_eq!(msg.encode().unwrap(), hex_bytes(GET_STATUS_MESSAGE));
}

#[test]
fn corrupted_message_fails_checksum() {
    let mut raw = hex_bytes(GET_STATUS_MESSAGE);
    raw[7] ^= 0x01;
    assert!(matches!(PodMessage::decode(&raw), Err(Error::ChecksumMismatch { .. })));
}

#[test]
fn partial_message_asks_for_more() {
    let raw = hex_bytes(GET_STATUS_MESSAGE);
    assert!(matches!(
        PodMessage::decode(&raw[..8]),
        Err(Error::NotEnoughData { .. })
    ));
}

#[test]
fn packet_trailing_noise_is_dropped() {
    let mut raw = hex_bytes("1f01482aad");
    raw.extend_from_slice(&hex_bytes(GET_STATUS_MESSAGE));
    raw.push(0x88);
    let clean = PodPacket::decode(&raw).unwrap();
    raw.extend_from_slice(&[0x00, 0x5a]);
    let noisy = PodPacket::decode(&raw).unwrap();
    assert_eq!(clean, noisy);
    assert_eq!(clean.packet_type, PodPacketType::Pdm);
    assert_eq!(clean.sequence, 13);
}

#[test]
fn fault_reply_is_surfaced() {
    let mut blocks = hex_bytes(PRIMING_FAULT);
    let body_len = blocks.len() as u8;
    let mut raw = PodAddress::new(0x1f00ee87).to_be_bytes().to_vec();
    raw.push(0x04);
    raw.push(body_len);
    raw.append(&mut blocks);
    let crc = libpump::protocol::pod_message_crc16(&raw);
    raw.extend_from_slice(&crc.to_be_bytes());

    let msg = PodMessage::decode(&raw).unwrap();
    assert_eq!(msg.first_block_type(), Some(MessageBlockType::PodInfoResponse));
    let fault = msg.fault().unwrap();
    assert_eq!(fault.fault_code, 0x5c);
}
