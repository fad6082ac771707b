// libpump-rs/libpump/src/utils/mod.rs

//! Small helpers shared by both pump families.
//!
//! Hex conversion for serials and frame dumps, the send/listen timeout
//! arithmetic, and the bit-field descriptors used by history decoders.

pub mod bits;
pub mod hex;
pub mod timeout;

pub use bits::*;
pub use hex::*;
pub use timeout::*;
