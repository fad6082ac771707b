// libpump-rs/libpump/src/protocol/parser.rs

//! Bounds-checked readers for fixed-layout buffers.

use crate::{Error, Result};

/// Ensure the slice has at least `min` bytes.
pub fn ensure_len(data: &[u8], min: usize) -> Result<()> {
    if data.len() < min {
        return Err(Error::InvalidLength {
            expected: min,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Read a single byte at `idx` with bounds checking.
pub fn byte_at(data: &[u8], idx: usize) -> Result<u8> {
    ensure_len(data, idx + 1)?;
    Ok(data[idx])
}

/// Return a subslice with bounds checking.
pub fn slice_at(data: &[u8], idx: usize, len: usize) -> Result<&[u8]> {
    ensure_len(data, idx + len)?;
    Ok(&data[idx..idx + len])
}

/// Read a big-endian u16 at given index, with bounds checking.
pub fn be_u16_at(data: &[u8], idx: usize) -> Result<u16> {
    ensure_len(data, idx + 2)?;
    Ok(u16::from_be_bytes([data[idx], data[idx + 1]]))
}

/// Read a little-endian u16 at given index, with bounds checking.
pub fn le_u16_at(data: &[u8], idx: usize) -> Result<u16> {
    ensure_len(data, idx + 2)?;
    Ok(u16::from_le_bytes([data[idx], data[idx + 1]]))
}

/// Read a big-endian u32 at given index, with bounds checking.
pub fn be_u32_at(data: &[u8], idx: usize) -> Result<u32> {
    let s = slice_at(data, idx, 4)?;
    Ok(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
}

/// Ensure the first byte (type tag) equals `expected`.
/// Returns UnexpectedResponse on mismatch.
pub fn expect_response_code(data: &[u8], expected: u8) -> Result<()> {
    let actual = byte_at(data, 0)?;
    if actual != expected {
        return Err(Error::UnexpectedResponse { expected, actual });
    }
    Ok(())
}

/// Validate a `[type][length][payload..]` block and return the whole block.
///
/// A buffer shorter than the length prefix announces is `NotEnoughData`,
/// which callers keep distinct from content errors.
pub fn length_prefixed_block(data: &[u8]) -> Result<&[u8]> {
    if data.len() < 2 {
        return Err(Error::NotEnoughData {
            needed: 2,
            available: data.len(),
        });
    }
    let total = 2 + usize::from(data[1]);
    if data.len() < total {
        return Err(Error::NotEnoughData {
            needed: total,
            available: data.len(),
        });
    }
    Ok(&data[..total])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_response_code_ok() {
        let v = vec![0x1du8];
        expect_response_code(&v, 0x1d).unwrap();
    }

    #[test]
    fn expect_response_code_mismatch() {
        let v = vec![0x06u8];
        match expect_response_code(&v, 0x1d) {
            Err(crate::Error::UnexpectedResponse { expected, actual }) => {
                assert_eq!(expected, 0x1d);
                assert_eq!(actual, 0x06);
            }
            other => panic!("expected UnexpectedResponse, got: {:?}", other),
        }
    }

    #[test]
    fn endian_readers() {
        let d = [0x0c, 0xa3, 0x00, 0x00, 0x0d, 0x61];
        assert_eq!(be_u16_at(&d, 0).unwrap(), 0x0ca3);
        assert_eq!(le_u16_at(&d, 0).unwrap(), 0xa30c);
        assert_eq!(be_u32_at(&d, 2).unwrap(), 3425);
        assert!(be_u32_at(&d, 3).is_err());
    }

    #[test]
    fn slice_bounds() {
        let d = [1u8, 2, 3];
        assert_eq!(slice_at(&d, 1, 2).unwrap(), &[2, 3]);
        match slice_at(&d, 2, 2) {
            Err(crate::Error::InvalidLength { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("expected InvalidLength, got: {:?}", other),
        }
    }

    #[test]
    fn length_prefix_checks() {
        assert_eq!(length_prefixed_block(&[0x0e, 0x01, 0x00, 0xff]).unwrap(), &[0x0e, 0x01, 0x00]);
        match length_prefixed_block(&[0x1a, 0x0e, 0x00]) {
            Err(crate::Error::NotEnoughData { needed, available }) => {
                assert_eq!(needed, 16);
                assert_eq!(available, 3);
            }
            other => panic!("expected NotEnoughData, got: {:?}", other),
        }
    }
}
