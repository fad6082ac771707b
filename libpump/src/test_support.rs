//! Test support helpers intended for use by unit and integration tests.
//!
//! These helpers centralize common MockRadio setup so tests across the
//! crate and tests/ directory can script pump and pod replies the same way.
#![allow(dead_code)]

use std::cell::Cell;

use chrono::{DateTime, TimeDelta, Utc};

use crate::constants::POD_MAX_PACKET_PAYLOAD;
use crate::minimed::{MessageBody, MessageType, PumpMessage};
use crate::omnipod::{PodMessage, PodPacket, PodPacketType};
use crate::transport::MockRadio;
use crate::types::{PodAddress, PumpId};
use crate::utils::Clock;

/// RSSI reported for scripted frames unless a test says otherwise.
pub const DEFAULT_RSSI: i8 = -60;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock stopped at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: TimeDelta) {
        self.now.set(self.now.get() + by);
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// On-air bytes of a Carelink message from `address`.
#[doc(hidden)]
pub fn pump_frame(address: PumpId, message_type: MessageType, body: MessageBody) -> Vec<u8> {
    PumpMessage::carelink(address, message_type, body).to_air()
}

/// Queue a pump reply on the mock radio.
#[doc(hidden)]
pub fn push_pump_reply(
    radio: &mut MockRadio,
    address: PumpId,
    message_type: MessageType,
    body: MessageBody,
) {
    radio.push_frame(pump_frame(address, message_type, body), DEFAULT_RSSI);
}

/// Queue a plain ack from the pump.
#[doc(hidden)]
pub fn push_pump_ack(radio: &mut MockRadio, address: PumpId) {
    push_pump_reply(radio, address, MessageType::PumpAck, MessageBody::PumpAck);
}

/// Decode every frame the session sent, skipping anything that is not a
/// well-formed pump message.
#[doc(hidden)]
pub fn sent_pump_messages(radio: &MockRadio) -> Vec<PumpMessage> {
    radio
        .sent
        .iter()
        .filter_map(|frame| crate::minimed::MinimedPacket::decode(frame).ok())
        .filter_map(|packet| PumpMessage::try_from(&packet).ok())
        .collect()
}

/// Encoded packets of a pod reply: one POD packet then continuations.
///
/// The pod numbers its packets `first_sequence`, then every second number,
/// since the host's acks take the numbers in between.
#[doc(hidden)]
pub fn pod_reply_frames(message: &PodMessage, first_sequence: u8) -> Vec<Vec<u8>> {
    let Ok(encoded) = message.encode() else {
        return Vec::new();
    };
    encoded
        .chunks(POD_MAX_PACKET_PAYLOAD)
        .enumerate()
        .map(|(i, chunk)| {
            let packet_type = if i == 0 { PodPacketType::Pod } else { PodPacketType::Con };
            let sequence = first_sequence.wrapping_add(2 * i as u8);
            PodPacket::new(message.address, packet_type, sequence, chunk.to_vec()).encode()
        })
        .collect()
}

/// Queue every packet of a pod reply on the mock radio.
#[doc(hidden)]
pub fn push_pod_reply(radio: &mut MockRadio, message: &PodMessage, first_sequence: u8) {
    for frame in pod_reply_frames(message, first_sequence) {
        radio.push_frame(frame, DEFAULT_RSSI);
    }
}

/// Queue an ack packet from the pod.
#[doc(hidden)]
pub fn push_pod_ack(radio: &mut MockRadio, address: PodAddress, sequence: u8) {
    radio.push_frame(PodPacket::ack(address, address, sequence).encode(), DEFAULT_RSSI);
}

/// Decode every packet the session sent to a pod.
#[doc(hidden)]
pub fn sent_pod_packets(radio: &MockRadio) -> Vec<PodPacket> {
    radio
        .sent
        .iter()
        .filter_map(|frame| PodPacket::decode(frame).ok())
        .collect()
}

/// Reassemble the messages the host sent from its PDM and CON packets.
#[doc(hidden)]
pub fn sent_pod_messages(radio: &MockRadio) -> Vec<PodMessage> {
    let mut messages = Vec::new();
    let mut pending: Option<Vec<u8>> = None;
    let mut packets = sent_pod_packets(radio);
    // retransmissions of one packet count once
    packets.dedup();
    for packet in packets {
        match packet.packet_type {
            PodPacketType::Pdm => pending = Some(packet.data),
            PodPacketType::Con => {
                if let Some(data) = pending.as_mut() {
                    data.extend_from_slice(&packet.data);
                }
            }
            _ => continue,
        }
        if let Some(data) = pending.as_ref() {
            if let Ok(message) = PodMessage::decode(data) {
                messages.push(message);
                pending = None;
            }
        }
    }
    messages
}

/// A pod that answers over the radio like the real thing.
///
/// It acks continuation packets of a command, reassembles it, answers with
/// the next queued reply and hands out reply continuations when acked. With
/// no reply queued it stays silent.
#[derive(Debug, Default)]
pub struct FakePod {
    /// Messages the pod has received, in order.
    pub received: Vec<PodMessage>,
    /// Replies still to give, one per received message.
    pub replies: Vec<Vec<crate::omnipod::MessageBlock>>,
    incoming: Vec<u8>,
    outgoing: Vec<PodPacket>,
    /// Frames dropped on purpose before the next reply, to exercise retries.
    pub drop_next: usize,
}

impl FakePod {
    /// Pod with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply to the next message.
    pub fn push_reply(&mut self, blocks: Vec<crate::omnipod::MessageBlock>) {
        self.replies.push(blocks);
    }

    fn answer(&mut self, packet: &PodPacket) -> crate::Result<crate::transport::RadioFrame> {
        let sequence = packet.sequence.wrapping_add(1);
        match packet.packet_type {
            PodPacketType::Pdm | PodPacketType::Con => {
                if packet.packet_type == PodPacketType::Pdm {
                    self.incoming.clear();
                }
                self.incoming.extend_from_slice(&packet.data);
                let Ok(message) = PodMessage::decode(&self.incoming) else {
                    let ack = PodPacket::ack(packet.address, packet.address, sequence);
                    return Ok(crate::transport::RadioFrame::new(ack.encode(), DEFAULT_RSSI));
                };
                self.incoming.clear();
                let reply_sequence = message.sequence.wrapping_add(1);
                if self.received.last() != Some(&message) {
                    self.received.push(message);
                }
                if self.replies.is_empty() {
                    return Err(crate::Error::Timeout);
                }
                let blocks = self.replies.remove(0);
                let reply = PodMessage::new(packet.address, blocks, reply_sequence);
                let Ok(encoded) = reply.encode() else {
                    return Err(crate::Error::Timeout);
                };
                self.outgoing = encoded
                    .chunks(POD_MAX_PACKET_PAYLOAD)
                    .enumerate()
                    .map(|(i, chunk)| {
                        let packet_type = if i == 0 { PodPacketType::Pod } else { PodPacketType::Con };
                        PodPacket::new(packet.address, packet_type, 0, chunk.to_vec())
                    })
                    .collect();
                self.next_outgoing(sequence)
            }
            PodPacketType::Ack => self.next_outgoing(sequence),
            PodPacketType::Pod => Err(crate::Error::Timeout),
        }
    }

    fn next_outgoing(&mut self, sequence: u8) -> crate::Result<crate::transport::RadioFrame> {
        if self.outgoing.is_empty() {
            return Err(crate::Error::Timeout);
        }
        let mut packet = self.outgoing.remove(0);
        packet.sequence = sequence & 0x1f;
        Ok(crate::transport::RadioFrame::new(packet.encode(), DEFAULT_RSSI))
    }
}

impl crate::transport::RadioTransport for FakePod {
    fn send_and_listen(
        &mut self,
        frame: &[u8],
        _params: &crate::transport::ListenParams,
    ) -> crate::Result<crate::transport::RadioFrame> {
        if self.drop_next > 0 {
            self.drop_next -= 1;
            return Err(crate::Error::Timeout);
        }
        let packet = PodPacket::decode(frame)?;
        self.answer(&packet)
    }

    fn send_only(&mut self, _frame: &[u8], _repeat_count: u8, _ms_between_packets: u32) -> crate::Result<()> {
        Ok(())
    }
}
