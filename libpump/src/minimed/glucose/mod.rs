// libpump-rs/libpump/src/minimed/glucose/mod.rs

//! Sensor glucose history: record layouts, page decoding and time anchoring.

pub mod events;
pub mod page;
pub mod timestamper;

pub use events::{GlucoseDetails, GlucoseEvent, GlucoseEventType, SensorTimestampType, TimeSource};
pub use page::{GlucosePage, TimestampedGlucoseEvent};
pub use timestamper::{add_timestamps, TimestampedRun};
