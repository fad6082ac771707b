// libpump-rs/libpump/src/prelude.rs

//! Commonly used types in one import.

pub use crate::minimed::{PumpMessage, PumpModel, PumpSession, PumpState, SessionSettings};
pub use crate::omnipod::{PodPairing, PodSession, PodSettings, PodState};
pub use crate::transport::{ListenParams, RadioFrame, RadioTransport};
pub use crate::{BasalSchedule, DeliveryCertainty, Error, PodAddress, PumpId, Result};

// Re-export small utilities for convenience
pub use crate::utils::{bytes_to_hex, parse_hex, Clock, SystemClock};
