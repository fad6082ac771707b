// libpump-rs/libpump/src/utils/bits.rs

//! Declarative bit-field extraction.
//!
//! History records pack dose amounts across bytes with masks and shifts
//! (a 10-bit carb count split between a full byte and two bits of another,
//! for example). Each such quantity is described once as a [`Field`] and read
//! through [`Field::read`], which bounds-checks every byte it touches.

use crate::{Error, Result};

/// One byte's contribution to a field: `(data[offset] & mask)` shifted.
///
/// Positive `shift` moves bits left, negative moves them right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitPart {
    /// Byte index.
    pub offset: usize,
    /// Bits kept.
    pub mask: u8,
    /// Shift applied after masking.
    pub shift: i8,
}

impl BitPart {
    /// A whole byte at `offset`, shifted left by `shift`.
    pub const fn byte(offset: usize, shift: i8) -> Self {
        Self {
            offset,
            mask: 0xff,
            shift,
        }
    }

    /// Masked bits of the byte at `offset`.
    pub const fn masked(offset: usize, mask: u8, shift: i8) -> Self {
        Self {
            offset,
            mask,
            shift,
        }
    }

    fn value(&self, data: &[u8]) -> Result<u32> {
        let byte = data.get(self.offset).ok_or(Error::InvalidLength {
            expected: self.offset + 1,
            actual: data.len(),
        })?;
        let v = u32::from(byte & self.mask);
        Ok(if self.shift >= 0 {
            v << self.shift
        } else {
            v >> self.shift.unsigned_abs()
        })
    }
}

/// A numeric field assembled from one or more [`BitPart`]s, then divided by `divisor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    /// Parts ORed together.
    pub parts: &'static [BitPart],
    /// Scale applied to the assembled value.
    pub divisor: f64,
}

impl Field {
    /// Integer field (divisor 1).
    pub const fn raw(parts: &'static [BitPart]) -> Self {
        Self {
            parts,
            divisor: 1.0,
        }
    }

    /// Scaled field, e.g. strokes divided by strokes per unit.
    pub const fn scaled(parts: &'static [BitPart], divisor: f64) -> Self {
        Self { parts, divisor }
    }

    /// Sum of all parts, unscaled.
    pub fn read(&self, data: &[u8]) -> Result<u32> {
        self.parts
            .iter()
            .try_fold(0u32, |acc, part| Ok(acc + part.value(data)?))
    }

    /// Sum of all parts divided by the field's divisor.
    pub fn read_scaled(&self, data: &[u8]) -> Result<f64> {
        Ok(f64::from(self.read(data)?) / self.divisor)
    }
}

/// Read a big-endian 16-bit quantity as a [`Field`] would (offset, offset+1).
pub const fn be16_parts(offset: usize) -> [BitPart; 2] {
    [BitPart::byte(offset, 8), BitPart::byte(offset + 1, 0)]
}
