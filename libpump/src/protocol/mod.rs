// libpump-rs/libpump/src/protocol/mod.rs

//! Primitives shared by both radio protocols.

pub mod checksum;
pub mod fourbsixb;
pub mod parser;

pub use checksum::{crc8, crc16, pod_crc16_table_entry, pod_message_crc16, pod_packet_crc8};
pub use fourbsixb::{decode_4b6b, decode_4b6b_until_terminator, encode_4b6b};
