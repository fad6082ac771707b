// libpump-rs/libpump/src/omnipod/mod.rs

//! Omnipod (Eros) pod family.
//!
//! Packets carry up to 31 bytes of a message; messages carry typed blocks.
//! [`PodMessageTransport`] runs the packet-level exchange, [`PodPairing`]
//! brings a fresh pod up to a [`PodState`], and [`PodSession`] sends the
//! nonce-protected delivery commands against that state.

pub mod alert;
pub mod blocks;
pub mod config;
pub mod dose;
pub mod message;
pub mod nonce;
pub mod packet;
pub mod pod_state;
pub mod progress;
pub mod schedule;
pub mod session;
pub mod transport;

pub use alert::{Alert, AlertConfiguration, AlertSet, AlertTrigger, BeepRepeat, BeepType};
pub use blocks::{
    CancelDeliveryType, DeliveryStatus, DetailedStatus, FaultEventCode, FirmwareVersion, MessageBlock,
    MessageBlockType, PodInfoType, StatusResponse, VersionResponse,
};
pub use config::PodSettings;
pub use dose::PodDose;
pub use message::PodMessage;
pub use nonce::NonceState;
pub use packet::{PodPacket, PodPacketType};
pub use pod_state::{PodInsulinMeasurements, PodState};
pub use progress::{PairingState, PodProgressStatus, SetupProgress};
pub use schedule::{BasalDeliveryTable, RateEntry, SetInsulinSchedule, ZeroBasalEncoding};
pub use session::{PodPairing, PodSession};
pub use transport::{MessageTransportState, PodMessageTransport};
