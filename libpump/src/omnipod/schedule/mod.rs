// libpump-rs/libpump/src/omnipod/schedule/mod.rs

//! Insulin delivery programs: the half-hour pulse table, the pulse timing
//! entries, and the command that carries them.

pub mod basal;
pub mod insulin;
pub mod rate_entry;
pub mod table;

pub use basal::{merged_durations, schedule_offset, schedule_rate_entries, segment_position, SegmentPosition};
pub use insulin::{DeliverySchedule, SetInsulinSchedule};
pub use rate_entry::{RateEntry, ZeroBasalEncoding};
pub use table::{BasalDeliveryTable, BasalTableEntry};
