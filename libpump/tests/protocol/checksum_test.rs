#[path = "../common/mod.rs"]
mod common;

use common::helpers::hex_bytes;
use libpump::protocol::{crc16, crc8, pod_message_crc16, pod_packet_crc8};

#[test]
fn minimed_crc8_over_captured_frame() {
    let data = hex_bytes("a259705504a24117043a0e080b003d3d00015b030105d817790a0f00000300008b1702000e080b0000");
    assert_eq!(crc8(&data), 0x71);
}

#[test]
fn minimed_crc16_over_history_page_body() {
    let mut body = hex_bytes(common::fixtures::HISTORY_PAGE_BODY);
    body.resize(1022, 0);
    assert_eq!(crc16(&body), 0x803a);
}

#[test]
fn history_crc16_starts_at_all_ones() {
    assert_eq!(crc16(&[]), 0xffff);
    assert_ne!(crc16(&[0x00]), crc16(&[0x01]));
}

#[test]
fn pod_checksums_match_pdm_capture() {
    let message = hex_bytes(common::fixtures::GET_STATUS_MESSAGE);
    let (body, trailer) = message.split_at(message.len() - 2);
    assert_eq!(pod_message_crc16(body).to_be_bytes(), [trailer[0], trailer[1]]);

    let mut packet = hex_bytes("1f01482aad");
    packet.extend_from_slice(&message);
    assert_eq!(pod_packet_crc8(&packet), 0x88);
}
