// libpump-rs/libpump/src/minimed/message.rs

//! Pump messages: addressed, typed bodies inside a radio packet.

use std::convert::TryFrom;
use std::fmt;

use super::bodies::MessageBody;
use super::message_type::{MessageType, PacketType};
use super::packet::MinimedPacket;
use crate::constants::MINIMED_MIN_MESSAGE_LENGTH;
use crate::protocol::parser::ensure_len;
use crate::types::PumpId;
use crate::utils::bytes_to_hex;
use crate::{Error, Result};

/// A message to or from a pump.
/// Layout: `[packet type][address 3][message type][body..]`, CRC-8 on the air.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpMessage {
    /// First byte.
    pub packet_type: PacketType,
    /// Pump serial.
    pub address: PumpId,
    /// Message type byte.
    pub message_type: MessageType,
    /// Decoded body.
    pub body: MessageBody,
}

impl PumpMessage {
    /// Message from its parts.
    pub fn new(
        packet_type: PacketType,
        address: PumpId,
        message_type: MessageType,
        body: MessageBody,
    ) -> Self {
        Self {
            packet_type,
            address,
            message_type,
            body,
        }
    }

    /// Carelink message with the one-byte body that opens every command.
    pub fn short(address: PumpId, message_type: MessageType) -> Self {
        Self::new(
            PacketType::Carelink,
            address,
            message_type,
            MessageBody::CarelinkShort,
        )
    }

    /// Carelink message with `body`.
    pub fn carelink(address: PumpId, message_type: MessageType, body: MessageBody) -> Self {
        Self::new(PacketType::Carelink, address, message_type, body)
    }

    /// Bytes handed to [`MinimedPacket`], CRC not included.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.to_bytes();
        let mut out = Vec::with_capacity(5 + body.len());
        out.push(self.packet_type.to_u8());
        out.extend_from_slice(self.address.as_bytes());
        out.push(self.message_type.to_u8());
        out.extend_from_slice(&body);
        out
    }

    /// Line-coded frame ready for the radio.
    pub fn to_air(&self) -> Vec<u8> {
        MinimedPacket::new(self.encode()).encode()
    }

    /// Decode a received message whose last byte is the CRC-8 trailer.
    ///
    /// The trailer is not checked here; [`MinimedPacket::decode`] does that
    /// for traffic coming off the air.
    pub fn decode(rx: &[u8]) -> Result<Self> {
        ensure_len(rx, MINIMED_MIN_MESSAGE_LENGTH)?;
        Self::parse(&rx[..rx.len() - 1])
    }

    fn parse(data: &[u8]) -> Result<Self> {
        ensure_len(data, MINIMED_MIN_MESSAGE_LENGTH - 1)?;
        let packet_type = match PacketType::from_u8(data[0]) {
            Some(PacketType::Meter) | None => return Err(Error::UnexpectedPacketType(data[0])),
            Some(t) => t,
        };
        let address = PumpId::try_from(&data[1..4])?;
        let message_type = MessageType::from_u8(data[4]);
        let body = MessageBody::decode(packet_type, message_type, &data[5..])?;
        Ok(Self {
            packet_type,
            address,
            message_type,
            body,
        })
    }
}

impl TryFrom<&MinimedPacket> for PumpMessage {
    type Error = Error;

    fn try_from(packet: &MinimedPacket) -> Result<Self> {
        Self::parse(&packet.data)
    }
}

impl fmt::Display for PumpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PumpMessage({}, {}, {}, {})",
            self.packet_type,
            self.message_type,
            self.address,
            bytes_to_hex(&self.body.to_bytes())
        )
    }
}

/// Glucose reading broadcast by a linked meter (packet type 0xa5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterMessage {
    /// mg/dL.
    pub glucose: u16,
    /// The meter asked for an ack.
    pub ack_flag: bool,
}

impl MeterMessage {
    /// Bytes in a meter packet.
    pub const LENGTH: usize = 6;

    /// Decode a received meter packet.
    pub fn decode(rx: &[u8]) -> Result<Self> {
        ensure_len(rx, Self::LENGTH)?;
        if PacketType::from_u8(rx[0]) != Some(PacketType::Meter) {
            return Err(Error::UnexpectedPacketType(rx[0]));
        }
        let b4 = rx[4];
        let flags = (b4 & 0b110) >> 1;
        Ok(Self {
            glucose: (u16::from(b4 & 0b1) << 8) + u16::from(b4),
            ack_flag: flags == 0x03,
        })
    }
}
