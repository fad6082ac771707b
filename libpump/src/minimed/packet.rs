// libpump-rs/libpump/src/minimed/packet.rs

//! Minimed packet framing.

use crate::protocol::{crc8, decode_4b6b_until_terminator, encode_4b6b};
use crate::{Error, Result};

/// Minimed radio packet helper.
/// On air: 4b6b([data..][crc8]), terminated by a literal zero byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimedPacket {
    /// Packet bytes before the CRC.
    pub data: Vec<u8>,
}

impl MinimedPacket {
    /// Wrap `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Line-coded bytes with the CRC-8 trailer appended.
    pub fn encode(&self) -> Vec<u8> {
        let mut with_crc = Vec::with_capacity(self.data.len() + 1);
        with_crc.extend_from_slice(&self.data);
        with_crc.push(crc8(&self.data));
        encode_4b6b(&with_crc)
    }

    /// Decode on-air bytes.
    ///
    /// `LineDecode` when the 4b6b layer fails, `ChecksumMismatch` when the
    /// decoded bytes fail their trailer.
    pub fn decode(coded: &[u8]) -> Result<Self> {
        let decoded = decode_4b6b_until_terminator(coded).ok_or(Error::LineDecode)?;
        let (trailer, msg) = decoded.split_last().ok_or(Error::InvalidLength {
            expected: 1,
            actual: 0,
        })?;
        let expected = crc8(msg);
        if *trailer != expected {
            return Err(Error::ChecksumMismatch {
                expected: u16::from(expected),
                actual: u16::from(*trailer),
            });
        }
        Ok(Self { data: msg.to_vec() })
    }
}
