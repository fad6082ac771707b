// libpump-rs/libpump/src/minimed/mod.rs

//! Minimed pump family.
//!
//! Messages, bodies and packets form the wire layer. History and glucose
//! pages decode the pump's records. [`PumpSession`] drives the radio
//! exchanges, and [`dose`] and [`reconcile`] turn commanded and recorded
//! doses into one consistent list.

pub mod basal_schedule;
pub mod bodies;
pub mod config;
pub mod dose;
pub mod events;
pub mod glucose;
pub mod history_page;
pub mod message;
pub mod message_type;
pub mod packet;
pub mod pump_model;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod time_format;

pub use bodies::{
    BasalProfile, BatteryStatus, ButtonType, CurrentGlucosePage, DataFrame, MessageBody,
    PumpErrorCode, PumpSettings, PumpStatusFlags, TempBasalRateType, TempBasalStatus,
};
pub use config::{PumpRegion, SessionSettings};
pub use dose::{dose_events, DoseEvent, DoseKind, UnfinalizedDose};
pub use events::{EventDetails, PumpEvent, PumpEventType};
pub use glucose::{GlucoseEvent, GlucoseEventType, GlucosePage, TimestampedGlucoseEvent};
pub use history_page::{HistoryPage, HistoryWalk, TimestampedHistoryEvent, WalkProgress};
pub use message::PumpMessage;
pub use message_type::{MessageType, PacketType};
pub use packet::MinimedPacket;
pub use pump_model::PumpModel;
pub use reconcile::{
    reconcile_pending_doses, ReconciledDoseMapping, ReconciliationMappings, ReconciliationResult,
};
pub use session::{FrequencyScanResult, FrequencyTrial, PumpSession, PumpStatus};
pub use state::{DeviceState, PumpState};
