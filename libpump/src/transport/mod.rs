// libpump-rs/libpump/src/transport/mod.rs

//! The radio seam sessions talk through.

pub mod mock;
pub mod traits;

pub use mock::{MockRadio, MockReply};
pub use traits::{ListenParams, RadioFrame, RadioTransport};
