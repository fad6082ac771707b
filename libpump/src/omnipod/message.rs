// libpump-rs/libpump/src/omnipod/message.rs

//! Pod messages: one or more blocks behind an address and a CRC16.

use std::fmt;

use crate::omnipod::blocks::{decode_blocks, DetailedStatus, MessageBlock, MessageBlockType};
use crate::protocol::parser::be_u32_at;
use crate::protocol::pod_message_crc16;
use crate::types::PodAddress;
use crate::utils::bytes_to_hex;
use crate::{Error, Result};

/// Address, flags/length and CRC around the block body.
const MESSAGE_OVERHEAD: usize = 8;
const MAX_BODY_LENGTH: usize = 0x3ff;

/// A pod message: `[address:4][flags+len:2][blocks][crc16]`.
///
/// Byte 4 holds the follow-on flag (bit 7), the four-bit sequence number
/// (bits 2..6) and the top two bits of the body length.
#[derive(Debug, Clone, PartialEq)]
pub struct PodMessage {
    /// Pod address.
    pub address: PodAddress,
    /// Blocks in order.
    pub blocks: Vec<MessageBlock>,
    /// Four-bit message sequence number.
    pub sequence: u8,
    /// Bit 7 of byte 4: more messages follow.
    pub expect_follow_on: bool,
}

impl PodMessage {
    /// Message without the follow-on flag.
    pub fn new(address: PodAddress, blocks: Vec<MessageBlock>, sequence: u8) -> Self {
        Self {
            address,
            blocks,
            sequence: sequence & 0x0f,
            expect_follow_on: false,
        }
    }

    /// Wire bytes with the CRC-16; fails when the body is too long for the length field.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        for block in &self.blocks {
            body.extend_from_slice(&block.encode());
        }
        if body.len() > MAX_BODY_LENGTH {
            return Err(Error::InvalidData(format!(
                "message body of {} bytes does not fit the length field",
                body.len()
            )));
        }
        let mut out = Vec::with_capacity(body.len() + MESSAGE_OVERHEAD);
        out.extend_from_slice(&self.address.to_be_bytes());
        let follow_on = if self.expect_follow_on { 0x80 } else { 0 };
        out.push(follow_on | ((self.sequence & 0x0f) << 2) | ((body.len() >> 8) as u8 & 0x03));
        out.push((body.len() & 0xff) as u8);
        out.extend_from_slice(&body);
        out.extend_from_slice(&pod_message_crc16(&out).to_be_bytes());
        Ok(out)
    }

    /// Decode a reassembled message.
    ///
    /// A buffer shorter than its length field is `NotEnoughData`, which the
    /// transport takes as a cue to ask for the next continuation packet.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MESSAGE_OVERHEAD + 2 {
            return Err(Error::NotEnoughData {
                needed: MESSAGE_OVERHEAD + 2,
                available: data.len(),
            });
        }
        let address = PodAddress::new(be_u32_at(data, 0)?);
        let b9 = data[4];
        let body_len = (usize::from(b9 & 0x03) << 8) | usize::from(data[5]);
        let total = body_len + MESSAGE_OVERHEAD;
        if data.len() < total {
            return Err(Error::NotEnoughData {
                needed: total,
                available: data.len(),
            });
        }
        let crc_at = 6 + body_len;
        let expected = pod_message_crc16(&data[..crc_at]);
        let actual = u16::from_be_bytes([data[crc_at], data[crc_at + 1]]);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }
        let blocks = decode_blocks(&data[6..crc_at])?;
        Ok(Self {
            address,
            blocks,
            sequence: (b9 >> 2) & 0x0f,
            expect_follow_on: b9 & 0x80 != 0,
        })
    }

    /// Kind of the first block.
    pub fn first_block_type(&self) -> Option<MessageBlockType> {
        self.blocks.first().map(MessageBlock::block_type)
    }

    /// Detailed status carried by the reply, when it reports a pod fault.
    pub fn fault(&self) -> Option<&DetailedStatus> {
        match self.blocks.first() {
            Some(MessageBlock::PodInfoResponse(info)) => info.detailed_status().filter(|s| s.is_faulted()),
            _ => None,
        }
    }
}

impl fmt::Display for PodMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body: Vec<u8> = self.blocks.iter().flat_map(MessageBlock::encode).collect();
        write!(
            f,
            "{} seq {} {}",
            self.address,
            self.sequence,
            bytes_to_hex(&body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omnipod::blocks::{GetStatus, PodInfoType};
    use crate::utils::parse_hex;
    use proptest::prelude::*;

    #[test]
    fn encodes_get_status() {
        let msg = PodMessage::new(
            PodAddress::new(0x1f01482a),
            vec![MessageBlock::GetStatus(GetStatus::new(PodInfoType::Normal))],
            4,
        );
        assert_eq!(msg.encode().unwrap(), parse_hex("1f01482a10030e0100802c").unwrap());
    }

    #[test]
    fn decodes_status_reply() {
        let msg = PodMessage::decode(&parse_hex("1f00ee84300a1d18003f1800004297ff8128").unwrap()).unwrap();
        assert_eq!(msg.address, PodAddress::new(0x1f00ee84));
        assert_eq!(msg.sequence, 12);
        assert!(!msg.expect_follow_on);
        assert_eq!(msg.first_block_type(), Some(MessageBlockType::StatusResponse));
        assert!(msg.fault().is_none());
    }

    #[test]
    fn short_messages_want_more_data() {
        let full = parse_hex("1f00ee84300a1d18003f1800004297ff8128").unwrap();
        assert!(matches!(
            PodMessage::decode(&full[..12]),
            Err(Error::NotEnoughData { needed: 18, .. })
        ));
        assert!(matches!(
            PodMessage::decode(&full[..6]),
            Err(Error::NotEnoughData { .. })
        ));
    }

    #[test]
    fn corrupt_crc_is_rejected() {
        let mut raw = parse_hex("1f00ee84300a1d18003f1800004297ff8128").unwrap();
        raw[17] ^= 0x01;
        assert!(matches!(
            PodMessage::decode(&raw),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn fault_is_surfaced_from_detailed_status() {
        let body = parse_hex("0216020f0000000900345c000103ff0001000005ae056029").unwrap();
        let mut raw = vec![0x1f, 0x00, 0xee, 0x84, 0x00, body.len() as u8];
        raw.extend_from_slice(&body);
        let crc = pod_message_crc16(&raw);
        raw.extend_from_slice(&crc.to_be_bytes());
        let msg = PodMessage::decode(&raw).unwrap();
        assert_eq!(msg.fault().map(|s| s.fault_code), Some(0x5c));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = PodMessage::decode(&bytes);
        }
    }
}
