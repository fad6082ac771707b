// libpump-rs/libpump/src/minimed/glucose/timestamper.rs

//! Anchoring relative glucose records to the nearest timestamp record.

use chrono::{NaiveDateTime, TimeDelta};

use super::events::{GlucoseEvent, TimeSource};

/// Minutes between consecutive sensor readings.
pub const GLUCOSE_INTERVAL_MINUTES: i64 = 5;

/// Records split at the first anchor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimestampedRun {
    /// Every record from the first anchor on, in page order.
    pub processed: Vec<GlucoseEvent>,
    /// Records before the first anchor.
    pub unprocessed: Vec<GlucoseEvent>,
}

impl TimestampedRun {
    /// True when a relative record could not be placed in time.
    pub fn has_unanchored_relative(&self) -> bool {
        self.unprocessed.iter().any(GlucoseEvent::is_relative)
    }
}

/// Give relative records a time by stepping forward from the preceding anchor.
pub fn add_timestamps(events: Vec<GlucoseEvent>) -> TimestampedRun {
    let mut run = TimestampedRun::default();
    let mut cursor: Option<NaiveDateTime> = None;

    for mut event in events {
        match event.time_source() {
            TimeSource::Reference => {
                cursor = event.timestamp;
                run.processed.push(event);
            }
            TimeSource::Own => match cursor {
                Some(_) => run.processed.push(event),
                None => run.unprocessed.push(event),
            },
            source @ (TimeSource::Relative | TimeSource::RelativeNoAdvance) => match cursor {
                Some(t) => {
                    let t = if source == TimeSource::Relative {
                        t + TimeDelta::minutes(GLUCOSE_INTERVAL_MINUTES)
                    } else {
                        t
                    };
                    cursor = Some(t);
                    event.timestamp = Some(t);
                    run.processed.push(event);
                }
                None => run.unprocessed.push(event),
            },
        }
    }
    run
}
