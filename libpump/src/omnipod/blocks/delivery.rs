// libpump-rs/libpump/src/omnipod/blocks/delivery.rs

//! Cancel, deactivate and fault-config blocks.

use std::fmt;
use std::ops::BitOr;

use crate::omnipod::alert::BeepType;
use crate::protocol::parser::{be_u32_at, byte_at, length_prefixed_block};
use crate::Result;

const CANCEL_DELIVERY_TAG: u8 = 0x1f;
const DEACTIVATE_POD_TAG: u8 = 0x1c;
const FAULT_CONFIG_TAG: u8 = 0x08;

/// Which deliveries a cancel command stops, as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelDeliveryType(u8);

impl CancelDeliveryType {
    /// Nothing.
    pub const NONE: CancelDeliveryType = CancelDeliveryType(0);
    /// Scheduled basal.
    pub const BASAL: CancelDeliveryType = CancelDeliveryType(0x01);
    /// Temp basal.
    pub const TEMP_BASAL: CancelDeliveryType = CancelDeliveryType(0x02);
    /// Bolus.
    pub const BOLUS: CancelDeliveryType = CancelDeliveryType(0x04);
    /// Everything.
    pub const ALL: CancelDeliveryType = CancelDeliveryType(0x07);

    /// Raw bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// From raw bits; bits above the low three are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Every bit of `other` is set.
    pub fn contains(self, other: CancelDeliveryType) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CancelDeliveryType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for CancelDeliveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::BASAL, "basal"),
            (Self::TEMP_BASAL, "temp basal"),
            (Self::BOLUS, "bolus"),
        ]
        .iter()
        .filter(|(t, _)| self.contains(*t))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            f.write_str("nothing")
        } else {
            f.write_str(&names.join(", "))
        }
    }
}

/// `1f 05 [nonce:4] [beep:4|delivery type:4]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelDelivery {
    /// Command nonce.
    pub nonce: u32,
    /// Deliveries to stop.
    pub delivery_type: CancelDeliveryType,
    /// Beep on cancel.
    pub beep_type: BeepType,
}

impl CancelDelivery {
    /// Cancel `delivery_type`.
    pub fn new(nonce: u32, delivery_type: CancelDeliveryType, beep_type: BeepType) -> Self {
        Self {
            nonce,
            delivery_type,
            beep_type,
        }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![CANCEL_DELIVERY_TAG, 5];
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.push(self.beep_type.code() << 4 | self.delivery_type.bits());
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        let flags = byte_at(block, 6)?;
        Ok(Self {
            nonce: be_u32_at(block, 2)?,
            delivery_type: CancelDeliveryType::from_bits(flags & 0x0f),
            beep_type: BeepType::from_code(flags >> 4)?,
        })
    }
}

/// `1c 04 [nonce:4]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeactivatePod {
    /// Command nonce.
    pub nonce: u32,
}

impl DeactivatePod {
    /// Deactivate with `nonce`.
    pub fn new(nonce: u32) -> Self {
        Self { nonce }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![DEACTIVATE_POD_TAG, 4];
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self::new(be_u32_at(block, 2)?))
    }
}

/// `08 06 [nonce:4] [tab5 16] [tab5 17]`, sent once during priming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultConfig {
    /// Command nonce.
    pub nonce: u32,
    /// Table 5 entry 16.
    pub tab5_sub16: u8,
    /// Table 5 entry 17.
    pub tab5_sub17: u8,
}

impl FaultConfig {
    /// Fault config with the two table entries.
    pub fn new(nonce: u32, tab5_sub16: u8, tab5_sub17: u8) -> Self {
        Self {
            nonce,
            tab5_sub16,
            tab5_sub17,
        }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![FAULT_CONFIG_TAG, 6];
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.push(self.tab5_sub16);
        out.push(self.tab5_sub17);
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self::new(
            be_u32_at(block, 2)?,
            byte_at(block, 6)?,
            byte_at(block, 7)?,
        ))
    }
}
