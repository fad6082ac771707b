#[path = "../common/mod.rs"]
mod common;

use common::fixtures::POD;
use common::helpers::init_logging;
use libpump::omnipod::blocks::GetStatus;
use libpump::omnipod::{
    MessageBlock, MessageTransportState, PodInfoType, PodMessage, PodMessageTransport, PodPacketType, PodSettings,
};
use libpump::test_support::{pod_reply_frames, push_pod_ack, sent_pod_messages, sent_pod_packets};
use libpump::transport::MockRadio;
use libpump::{Error, PodAddress};

fn get_status() -> Vec<MessageBlock> {
    vec![MessageBlock::GetStatus(GetStatus::new(PodInfoType::Normal))]
}

#[test]
fn reply_from_another_pod_is_crosstalk() {
    init_logging();
    let mut radio = MockRadio::new();
    let stranger = PodAddress::new(0x1f0b3554);
    let reply = PodMessage::new(stranger, get_status(), 1);
    // correct address on the packets, wrong one inside the message
    let frames = pod_reply_frames(&reply, 1);
    for frame in frames {
        let mut packet = libpump::omnipod::PodPacket::decode(&frame).unwrap();
        packet.address = POD;
        radio.push_frame(packet.encode(), -60);
    }
    let mut state = MessageTransportState::default();
    let settings = PodSettings::default();
    let err = PodMessageTransport::new(&mut radio, &mut state, POD, &settings)
        .send(get_status())
        .unwrap_err();
    assert!(matches!(err, Error::Crosstalk { .. }));
}

#[test]
fn ack_in_place_of_reply() {
    let mut radio = MockRadio::new();
    push_pod_ack(&mut radio, POD, 5);
    let mut state = MessageTransportState::new(4, 3);
    let settings = PodSettings::default();
    let err = PodMessageTransport::new(&mut radio, &mut state, POD, &settings)
        .send(get_status())
        .unwrap_err();
    assert!(matches!(err, Error::PodAckedInsteadOfReturningResponse));
    assert_eq!(state.message_number, 4);
}

#[test]
fn sent_message_is_one_pdm_packet() {
    let mut radio = MockRadio::new();
    let mut state = MessageTransportState::default();
    let settings = PodSettings::default();
    let _ = PodMessageTransport::new(&mut radio, &mut state, POD, &settings).send(get_status());

    let packets = sent_pod_packets(&radio);
    assert!(!packets.is_empty());
    assert!(packets.iter().all(|p| p.packet_type == PodPacketType::Pdm && p.sequence == 0));
    let messages = sent_pod_messages(&radio);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].blocks, get_status());
}
