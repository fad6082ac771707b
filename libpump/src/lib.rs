// libpump-rs/libpump/src/lib.rs

//! libpump
//!
//! Pure Rust protocol layer for Minimed pumps and Omnipod (Eros) pods,
//! talking through a RileyLink-style radio bridge.
#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod minimed;
pub mod omnipod;
pub mod prelude;
pub mod protocol;
pub mod test_support;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export common types at crate root so `crate::Error`, `crate::Result`,
// and the newtypes in `types` are available for consumers and for
// convenient `prelude` re-exports.
pub use crate::error::*;
pub use crate::types::*;

pub use prelude::*;
