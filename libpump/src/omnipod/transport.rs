// libpump-rs/libpump/src/omnipod/transport.rs

//! Pod message transport.
//!
//! A message goes out as one PDM packet followed by continuation packets, each
//! answered by the pod. The reply is reassembled from a POD packet plus any
//! continuations the host asks for with acks. Every exchange ends by acking
//! until the pod goes quiet.

use log::{debug, error, trace};

use super::blocks::{MessageBlock, MessageBlockType};
use super::config::{PodSettings, ACK_QUIET_REPEATS, CON_ACK_REPEATS, POD_MAX_PACKET_PAYLOAD};
use super::message::PodMessage;
use super::packet::{PodPacket, PodPacketType};
use crate::transport::{ListenParams, RadioTransport};
use crate::types::PodAddress;
use crate::{Error, Result};

/// Packet and message counters shared by every exchange with one pod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageTransportState {
    /// Five-bit packet sequence number.
    pub packet_number: u8,
    /// Four-bit message sequence number.
    pub message_number: u8,
}

impl MessageTransportState {
    /// Counters, masked to their widths.
    pub fn new(packet_number: u8, message_number: u8) -> Self {
        Self {
            packet_number: packet_number & 0x1f,
            message_number: message_number & 0x0f,
        }
    }

    /// Advance the packet number, wrapping at 32.
    pub fn increment_packet_number(&mut self, count: u8) {
        self.packet_number = self.packet_number.wrapping_add(count) & 0x1f;
    }

    /// Advance the message number, wrapping at 16.
    pub fn increment_message_number(&mut self, count: u8) {
        self.message_number = self.message_number.wrapping_add(count) & 0x0f;
    }

    /// Sequence number the pod answers the current packet with.
    fn expected_reply_number(&self) -> u8 {
        self.packet_number.wrapping_add(1) & 0x1f
    }
}

/// Sends block lists to one pod address and returns its reply.
pub struct PodMessageTransport<'a, T: RadioTransport> {
    radio: &'a mut T,
    state: &'a mut MessageTransportState,
    address: PodAddress,
    /// During pairing the host acks with the address it is assigning.
    ack_address: PodAddress,
    settings: &'a PodSettings,
}

impl<'a, T: RadioTransport> PodMessageTransport<'a, T> {
    /// Transport to `address`.
    pub fn new(
        radio: &'a mut T,
        state: &'a mut MessageTransportState,
        address: PodAddress,
        settings: &'a PodSettings,
    ) -> Self {
        Self {
            radio,
            state,
            address,
            ack_address: address,
            settings,
        }
    }

    /// Ack with `ack_address` instead of the pod address.
    pub fn with_ack_address(mut self, ack_address: PodAddress) -> Self {
        self.ack_address = ack_address;
        self
    }

    /// Pod address.
    pub fn address(&self) -> PodAddress {
        self.address
    }

    /// Message number for the next message.
    pub fn message_number(&self) -> u8 {
        self.state.message_number
    }

    fn ack_packet(&self) -> PodPacket {
        PodPacket::ack(self.address, self.ack_address, self.state.packet_number)
    }

    fn packet_params(&self, repeat_count: u8) -> ListenParams {
        ListenParams::new(self.settings.response_window_ms, repeat_count, 0, self.settings.retry_count)
    }

    /// How many send/listen rounds fit in the exchange timeout.
    fn max_attempts(&self, params: &ListenParams, frame_len: usize) -> u64 {
        let window = self.settings.exchange_timeout.as_millis() as u64;
        (window / params.total_timeout_ms(frame_len).max(1)).max(1)
    }

    /// Send one packet until the pod answers it with the next sequence number.
    ///
    /// Garbled packets, packets for other addresses and stale sequence numbers
    /// are ignored. Timeouts are retried until the exchange window runs out.
    fn exchange_packets(&mut self, packet: &PodPacket, repeat_count: u8) -> Result<PodPacket> {
        let frame = packet.encode();
        let params = self.packet_params(repeat_count);
        trace!("packet out {}", packet);
        #[cfg(feature = "diagnostics")]
        trace!("tx {}", crate::utils::bytes_to_hex(&frame));

        for _ in 0..self.max_attempts(&params, frame.len()) {
            let rx = match self.radio.send_and_listen(&frame, &params) {
                Ok(rx) => rx,
                Err(Error::Timeout) => continue,
                Err(e) => return Err(e),
            };
            #[cfg(feature = "diagnostics")]
            trace!("rx {}", crate::utils::bytes_to_hex(&rx.data));

            let candidate = match PodPacket::decode(&rx.data) {
                Ok(p) => p,
                Err(e) => {
                    trace!("dropping undecodable packet: {}", e);
                    continue;
                }
            };
            if candidate.address != packet.address {
                trace!("dropping packet for {}", candidate.address);
                continue;
            }
            if candidate.sequence != self.state.expected_reply_number() {
                trace!(
                    "dropping packet seq {} (want {})",
                    candidate.sequence,
                    self.state.expected_reply_number()
                );
                continue;
            }
            self.state.increment_packet_number(2);
            trace!("packet in {} rssi {}", candidate, rx.rssi);
            return Ok(candidate);
        }
        Err(Error::NoResponse(format!("no reply to {:?} packet", packet.packet_type)))
    }

    /// Ack the last packet until the pod stops repeating itself.
    fn ack_until_quiet(&mut self) -> Result<()> {
        let frame = self.ack_packet().encode();
        let params = ListenParams::new(self.settings.ack_quiet_window_ms, ACK_QUIET_REPEATS, 0, 0);
        let mut quiet = false;
        for _ in 0..self.max_attempts(&params, frame.len()) {
            match self.radio.send_and_listen(&frame, &params) {
                Err(Error::Timeout) => {
                    quiet = true;
                    break;
                }
                Err(e) => return Err(e),
                Ok(_) => trace!("pod still talking, acking again"),
            }
        }
        if !quiet {
            debug!("pod never went quiet after the final ack");
        }
        self.state.increment_packet_number(1);
        Ok(())
    }

    /// Send `blocks` as one message and return the pod's reply.
    pub fn send(&mut self, blocks: Vec<MessageBlock>) -> Result<PodMessage> {
        let message = PodMessage::new(self.address, blocks, self.state.message_number);
        self.send_message(&message).inspect_err(|e| {
            error!("error talking to pod {}: {}", self.address, e);
        })
    }

    fn send_message(&mut self, message: &PodMessage) -> Result<PodMessage> {
        debug!("send {}", message);
        let encoded = message.encode()?;

        let mut chunks = encoded.chunks(POD_MAX_PACKET_PAYLOAD).peekable();
        let mut packet_type = PodPacketType::Pdm;
        let reply = loop {
            let Some(chunk) = chunks.next() else {
                return Err(Error::InvalidData("empty message".into()));
            };
            let packet = PodPacket::new(self.address, packet_type, self.state.packet_number, chunk.to_vec());
            let reply = self.exchange_packets(&packet, 0)?;
            if chunks.peek().is_none() {
                break reply;
            }
            if reply.packet_type != PodPacketType::Ack {
                return Err(Error::UnexpectedPacketType(reply.packet_type.code()));
            }
            packet_type = PodPacketType::Con;
        };

        if reply.packet_type == PodPacketType::Ack {
            debug!("pod acked instead of responding: {}", reply);
            self.state.increment_message_number(1);
            return Err(Error::PodAckedInsteadOfReturningResponse);
        }
        if reply.packet_type != PodPacketType::Pod {
            return Err(Error::UnexpectedPacketType(reply.packet_type.code()));
        }

        let mut data = reply.data;
        let response = loop {
            match PodMessage::decode(&data) {
                Ok(response) => break response,
                Err(Error::NotEnoughData { .. }) => {
                    trace!("acking for the next continuation");
                    let ack = self.ack_packet();
                    let con = self.exchange_packets(&ack, CON_ACK_REPEATS)?;
                    if con.packet_type != PodPacketType::Con {
                        debug!("expected a continuation, got {}", con);
                        return Err(Error::UnexpectedPacketType(con.packet_type.code()));
                    }
                    data.extend_from_slice(&con.data);
                }
                Err(e) => return Err(e),
            }
        };

        self.ack_until_quiet()?;

        // pairing replies may already carry the address being assigned
        if response.address != self.address && response.address != self.ack_address {
            return Err(Error::Crosstalk {
                expected: self.address.to_string(),
                actual: response.address.to_string(),
            });
        }
        let Some(first) = response.first_block_type() else {
            debug!("empty response");
            return Err(Error::EmptyResponse);
        };
        if first != MessageBlockType::ErrorResponse {
            self.state.increment_message_number(2);
        }
        debug!("recv {}", response);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omnipod::blocks::{GetStatus, PodInfoType};
    use crate::test_support::{pod_reply_frames, push_pod_ack, push_pod_reply, sent_pod_packets};
    use crate::transport::MockRadio;
    use crate::utils::parse_hex;

    const POD: PodAddress = PodAddress::new(0x1f00ee84);

    fn status_reply(sequence: u8) -> PodMessage {
        let raw = parse_hex("1f00ee84300a1d18003f1800004297ff8128").unwrap();
        let mut message = PodMessage::decode(&raw).unwrap();
        message.sequence = sequence;
        message
    }

    fn get_status() -> Vec<MessageBlock> {
        vec![MessageBlock::GetStatus(GetStatus::new(PodInfoType::Normal))]
    }

    #[test]
    fn single_packet_exchange() {
        let mut radio = MockRadio::new();
        push_pod_reply(&mut radio, &status_reply(1), 1);
        let mut state = MessageTransportState::default();
        let settings = PodSettings::default();

        let response = PodMessageTransport::new(&mut radio, &mut state, POD, &settings)
            .send(get_status())
            .unwrap();
        assert_eq!(response.first_block_type(), Some(MessageBlockType::StatusResponse));

        // status reply seq 1, then the final ack at seq 2
        assert_eq!(state.packet_number, 3);
        assert_eq!(state.message_number, 2);
        let sent = sent_pod_packets(&radio);
        assert_eq!(sent[0].packet_type, PodPacketType::Pdm);
        assert_eq!(sent[0].sequence, 0);
        assert_eq!(sent.last().map(|p| p.packet_type), Some(PodPacketType::Ack));
        assert_eq!(sent.last().map(|p| p.sequence), Some(2));
    }

    #[test]
    fn stale_and_foreign_packets_are_skipped() {
        let mut radio = MockRadio::new();
        radio.push_frame(vec![0x00, 0x01, 0x02], -70);
        push_pod_ack(&mut radio, PodAddress::new(0x1f00aaaa), 1);
        push_pod_ack(&mut radio, POD, 7);
        radio.push_timeout();
        push_pod_reply(&mut radio, &status_reply(1), 1);
        let mut state = MessageTransportState::default();
        let settings = PodSettings::default();

        let response = PodMessageTransport::new(&mut radio, &mut state, POD, &settings).send(get_status());
        assert!(response.is_ok());
        assert_eq!(sent_pod_packets(&radio).len(), 6);
    }

    #[test]
    fn reply_continuations_are_requested() {
        let mut long = status_reply(3);
        long.blocks.extend(std::iter::repeat(long.blocks[0].clone()).take(3));
        let frames = pod_reply_frames(&long, 1);
        assert!(frames.len() > 1);

        let mut radio = MockRadio::new();
        for frame in frames {
            radio.push_frame(frame, -60);
        }
        let mut state = MessageTransportState::default();
        let settings = PodSettings::default();
        let response = PodMessageTransport::new(&mut radio, &mut state, POD, &settings)
            .send(get_status())
            .unwrap();
        assert_eq!(response.blocks.len(), 4);

        let sent = sent_pod_packets(&radio);
        assert_eq!(sent[1].packet_type, PodPacketType::Ack);
        assert_eq!(sent[1].sequence, 2);
        assert_eq!(sent[1].data, POD.to_be_bytes().to_vec());
    }

    #[test]
    fn long_commands_wait_for_acks() {
        let mut radio = MockRadio::new();
        push_pod_ack(&mut radio, POD, 1);
        push_pod_reply(&mut radio, &status_reply(1), 3);
        let mut state = MessageTransportState::default();
        let settings = PodSettings::default();
        let blocks = vec![MessageBlock::GetStatus(GetStatus::new(PodInfoType::Normal)); 12];

        PodMessageTransport::new(&mut radio, &mut state, POD, &settings)
            .send(blocks)
            .unwrap();
        let sent = sent_pod_packets(&radio);
        assert_eq!(sent[0].packet_type, PodPacketType::Pdm);
        assert_eq!(sent[0].data.len(), POD_MAX_PACKET_PAYLOAD);
        assert_eq!(sent[1].packet_type, PodPacketType::Con);
        assert_eq!(sent[1].sequence, 2);
    }

    #[test]
    fn ack_instead_of_response() {
        let mut radio = MockRadio::new();
        push_pod_ack(&mut radio, POD, 1);
        let mut state = MessageTransportState::new(0, 5);
        let settings = PodSettings::default();
        let result = PodMessageTransport::new(&mut radio, &mut state, POD, &settings).send(get_status());
        assert!(matches!(result, Err(Error::PodAckedInsteadOfReturningResponse)));
        assert_eq!(state.message_number, 6);
    }

    #[test]
    fn error_responses_do_not_advance_by_two() {
        let mut radio = MockRadio::new();
        let body = MessageBlock::decode(&parse_hex("060314217a").unwrap()).unwrap();
        push_pod_reply(&mut radio, &PodMessage::new(POD, vec![body], 1), 1);
        let mut state = MessageTransportState::default();
        let settings = PodSettings::default();
        let response = PodMessageTransport::new(&mut radio, &mut state, POD, &settings)
            .send(get_status())
            .unwrap();
        assert_eq!(response.first_block_type(), Some(MessageBlockType::ErrorResponse));
        assert_eq!(state.message_number, 0);
    }

    #[test]
    fn silence_is_no_response() {
        let mut radio = MockRadio::new();
        let mut state = MessageTransportState::default();
        let settings = PodSettings::default();
        let result = PodMessageTransport::new(&mut radio, &mut state, POD, &settings).send(get_status());
        assert!(matches!(result, Err(Error::NoResponse(_))));
        assert_eq!(state.packet_number, 0);
    }

    #[test]
    fn counters_wrap() {
        let mut state = MessageTransportState::new(31, 15);
        state.increment_packet_number(2);
        state.increment_message_number(2);
        assert_eq!(state, MessageTransportState::new(1, 1));
    }
}
