// libpump-rs/libpump/src/protocol/checksum.rs

//! CRC primitives for both radio families.
//!
//! | function            | width | poly   | init   | used for                         |
//! |---------------------|-------|--------|--------|----------------------------------|
//! | [`crc8`]            | 8     | 0x9b   | 0x00   | Minimed packet trailer           |
//! | [`crc16`]           | 16    | 0x1021 | 0xffff | Minimed history/glucose pages    |
//! | [`pod_packet_crc8`] | 8     | 0x07   | 0x00   | pod packet trailer               |
//! | [`pod_message_crc16`] | 16  | 0x8005 | 0x0000 | pod message trailer (reflected update) |

const fn crc8_table(poly: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ poly
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ poly
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const MINIMED_CRC8: [u8; 256] = crc8_table(0x9b);
const POD_CRC8: [u8; 256] = crc8_table(0x07);
const CCITT_CRC16: [u16; 256] = crc16_table(0x1021);
const POD_CRC16: [u16; 256] = crc16_table(0x8005);

/// CRC-8 trailer of a Minimed radio packet.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &b| MINIMED_CRC8[usize::from(crc ^ b)])
}

/// CRC-16/CCITT (init 0xffff) over a Minimed history or glucose page.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xffffu16, |crc, &b| {
        (crc << 8) ^ CCITT_CRC16[usize::from(((crc >> 8) as u8) ^ b)]
    })
}

/// CRC-8 trailer of a pod radio packet.
pub fn pod_packet_crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &b| POD_CRC8[usize::from(crc ^ b)])
}

/// CRC-16 trailer of a reassembled pod message.
pub fn pod_message_crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        (crc >> 8) ^ POD_CRC16[usize::from((crc as u8) ^ b)]
    })
}

/// Entry of the pod CRC-16 table; the nonce resync derives its offset from it.
pub fn pod_crc16_table_entry(index: u8) -> u16 {
    POD_CRC16[usize::from(index)]
}
