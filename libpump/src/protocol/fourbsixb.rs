// libpump-rs/libpump/src/protocol/fourbsixb.rs

//! 4b6b line code: every nibble goes on the air as a 6-bit symbol.

/// Symbol for each nibble value.
pub const CODES: [u8; 16] = [
    21, 49, 50, 35, 52, 37, 38, 22, 26, 25, 42, 11, 44, 13, 14, 28,
];

fn nibble_for_symbol(symbol: u16) -> Option<u8> {
    CODES
        .iter()
        .position(|&c| u16::from(c) == symbol)
        .map(|p| p as u8)
}

/// Line-code `data`; the last partial byte is zero padded.
pub fn encode_4b6b(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 3 / 2 + 1);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for &b in data {
        for nibble in [b >> 4, b & 0x0f] {
            acc = (acc << 6) | u32::from(CODES[usize::from(nibble)]);
            bits += 6;
            while bits >= 8 {
                bits -= 8;
                out.push((acc >> bits) as u8);
                acc &= (1 << bits) - 1;
            }
        }
    }
    if bits > 0 {
        out.push((acc << (8 - bits)) as u8);
    }
    out
}

fn decode_symbols(coded: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(coded.len() * 2 / 3);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for &b in coded {
        acc = (acc << 8) | u32::from(b);
        bits += 8;
        if bits >= 12 {
            let pair = (acc >> (bits - 12)) & 0x0fff;
            let hi = nibble_for_symbol((pair >> 6) as u16)?;
            let lo = nibble_for_symbol((pair & 0x3f) as u16)?;
            out.push((hi << 4) | lo);
            bits -= 12;
            acc &= (1 << bits) - 1;
        }
    }
    Some(out)
}

/// Decode pod-family 4b6b traffic. `None` when any symbol is not in [`CODES`].
pub fn decode_4b6b(coded: &[u8]) -> Option<Vec<u8>> {
    decode_symbols(coded)
}

/// Decode Minimed traffic: the first literal zero byte ends the frame.
pub fn decode_4b6b_until_terminator(coded: &[u8]) -> Option<Vec<u8>> {
    let end = coded.iter().position(|&b| b == 0).unwrap_or(coded.len());
    decode_symbols(&coded[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_hex;

    #[test]
    fn encodes_known_frame() {
        let data = parse_hex("a7").unwrap();
        // a -> 42 (101010), 7 -> 22 (010110): 1010 1001 0110 -> a9 60
        assert_eq!(encode_4b6b(&data), vec![0xa9, 0x60]);
    }

    #[test]
    fn round_trip_even_and_odd_lengths() {
        for input in [vec![0xa7u8, 0x35], vec![0xa7, 0x35, 0x05], vec![0x12]] {
            let coded = encode_4b6b(&input);
            assert_eq!(decode_4b6b(&coded).unwrap(), input);
        }
    }

    #[test]
    fn invalid_symbol_fails() {
        // 000000 is not a code
        assert_eq!(decode_4b6b(&[0x00, 0x00]), None);
        assert_eq!(decode_4b6b(&[0xff, 0xff]), None);
    }

    #[test]
    fn minimed_variant_stops_at_zero() {
        let mut coded = encode_4b6b(&[0xa7, 0x35]);
        coded.push(0x00);
        coded.extend_from_slice(&[0xff, 0xff, 0xff]);
        assert_eq!(decode_4b6b_until_terminator(&coded).unwrap(), vec![0xa7, 0x35]);
        // the pod variant reads straight through and hits the bad symbols
        assert_eq!(decode_4b6b(&coded), None);
    }
}
