// libpump-rs/libpump/src/omnipod/packet.rs

//! Pod radio packets.

use std::fmt;

use crate::constants::POD_MAX_PACKET_PAYLOAD;
use crate::protocol::parser::{be_u32_at, ensure_len};
use crate::protocol::pod_packet_crc8;
use crate::types::PodAddress;
use crate::utils::bytes_to_hex;
use crate::{Error, Result};

/// Header (4 address bytes + type/sequence byte) plus the CRC trailer.
const PACKET_OVERHEAD: usize = 6;

/// Kind of a pod radio packet, the top three bits of byte 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPacketType {
    /// First packet of a message from the pod.
    Pod,
    /// First packet of a message from the controller.
    Pdm,
    /// Continuation of a multi-packet message.
    Con,
    /// Acknowledgement.
    Ack,
}

impl PodPacketType {
    /// Three-bit type code.
    pub fn code(self) -> u8 {
        match self {
            Self::Pod => 0b111,
            Self::Pdm => 0b101,
            Self::Con => 0b100,
            Self::Ack => 0b010,
        }
    }

    /// Decode a type code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0b111 => Ok(Self::Pod),
            0b101 => Ok(Self::Pdm),
            0b100 => Ok(Self::Con),
            0b010 => Ok(Self::Ack),
            other => Err(Error::UnknownValue {
                value: other,
                what: "pod packet type",
            }),
        }
    }
}

/// One pod radio packet: `[address:4][type<<5 | seq][data][crc8]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodPacket {
    /// Pod address.
    pub address: PodAddress,
    /// Packet type.
    pub packet_type: PodPacketType,
    /// Five-bit packet sequence number.
    pub sequence: u8,
    /// Payload.
    pub data: Vec<u8>,
}

impl PodPacket {
    /// Packet with `sequence` masked to five bits.
    pub fn new(address: PodAddress, packet_type: PodPacketType, sequence: u8, data: Vec<u8>) -> Self {
        Self {
            address,
            packet_type,
            sequence: sequence & 0x1f,
            data,
        }
    }

    /// Ack packet carrying the address the pod should answer to.
    pub fn ack(address: PodAddress, ack_address: PodAddress, sequence: u8) -> Self {
        Self::new(
            address,
            PodPacketType::Ack,
            sequence,
            ack_address.to_be_bytes().to_vec(),
        )
    }

    /// Wire bytes with the CRC-8.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + PACKET_OVERHEAD);
        out.extend_from_slice(&self.address.to_be_bytes());
        out.push((self.packet_type.code() << 5) | (self.sequence & 0x1f));
        out.extend_from_slice(&self.data);
        out.push(pod_packet_crc8(&out));
        out
    }

    /// Decode a received packet.
    ///
    /// Radio bridges sometimes hand back a few trailing bytes of noise, so the
    /// longest prefix ending in a valid CRC wins.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        ensure_len(raw, PACKET_OVERHEAD + 1)?;
        let max_len = raw.len().min(POD_MAX_PACKET_PAYLOAD + PACKET_OVERHEAD);
        let crc_ok = |len: usize| pod_packet_crc8(&raw[..len - 1]) == raw[len - 1];
        let mut end = (PACKET_OVERHEAD + 1..=max_len)
            .rev()
            .find(|&len| crc_ok(len))
            .ok_or_else(|| {
                let computed = pod_packet_crc8(&raw[..max_len - 1]);
                Error::ChecksumMismatch {
                    expected: u16::from(computed),
                    actual: u16::from(raw[max_len - 1]),
                }
            })?;
        // a zero byte after a valid trailer always checks out again
        while end > PACKET_OVERHEAD + 1 && raw[end - 1] == 0 && crc_ok(end - 1) {
            end -= 1;
        }
        let address = PodAddress::new(be_u32_at(raw, 0)?);
        let packet_type = PodPacketType::from_code(raw[4] >> 5)?;
        Ok(Self {
            address,
            packet_type,
            sequence: raw[4] & 0x1f,
            data: raw[5..end - 1].to_vec(),
        })
    }
}

impl fmt::Display for PodPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} seq {} {}",
            self.packet_type,
            self.address,
            self.sequence,
            bytes_to_hex(&self.data)
        )
    }
}
