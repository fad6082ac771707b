// libpump-rs/libpump/src/utils/hex.rs

//! Hex conversion for pump serials, pod identifiers and radio frame dumps.

use std::fmt::Write;

/// Lowercase hex without separators, e.g. `&[0xa7, 0x35]` -> `"a735"`.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        // writing into a String cannot fail
        let _ = write!(s, "{:02x}", b);
        s
    })
}

/// Lowercase hex with one space between bytes, used by frame traces.
pub fn bytes_to_hex_spaced(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        if !s.is_empty() {
            s.push(' ');
        }
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Parse a hex string, ignoring ASCII whitespace between digits.
///
/// Captured radio traffic is usually pasted with spaces or line breaks, so
/// both `"a7 35 05"` and `"a73505"` are accepted.
pub fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = s.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("hex string has odd length {}", digits.len()));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16);
            let lo = pair[1].to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok(((hi << 4) | lo) as u8),
                _ => Err(format!("invalid hex pair '{}{}'", pair[0], pair[1])),
            }
        })
        .collect()
}
