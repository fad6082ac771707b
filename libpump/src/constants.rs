// libpump-rs/libpump/src/constants.rs
//! Wire constants shared across the crate

/// Listen window for a standard Minimed exchange, in milliseconds.
pub const STANDARD_PUMP_RESPONSE_WINDOW_MS: u32 = 180;

/// Length of a Minimed history or glucose page, CRC trailer included.
pub const HISTORY_PAGE_LENGTH: usize = 1024;

/// Data bytes per multi-frame history response.
pub const HISTORY_FRAME_DATA_LENGTH: usize = 64;

/// Body length of a Carelink "long" message.
pub const CARELINK_LONG_BODY_LENGTH: usize = 65;

/// Minimum Minimed message: packet type, 3-byte address, message type, body byte, crc.
pub const MINIMED_MIN_MESSAGE_LENGTH: usize = 7;

/// Minutes in one basal segment.
pub const SEGMENT_MINUTES: u32 = 30;

/// Insulin delivered by one pod motor pulse, in units.
pub const POD_PULSE_SIZE: f64 = 0.05;

/// Maximum payload a single pod packet carries.
pub const POD_MAX_PACKET_PAYLOAD: usize = 31;
