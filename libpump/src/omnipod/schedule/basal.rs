// libpump-rs/libpump/src/omnipod/schedule/basal.rs

//! Where "now" falls in the daily basal schedule, as the pod needs it.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Timelike, Utc};

use crate::omnipod::schedule::rate_entry::{RateEntry, ZeroBasalEncoding};
use crate::omnipod::schedule::table::{pulses_per_hour, SEGMENT_DURATION};
use crate::types::BasalSchedule;

const DAY_SECONDS: f64 = 86_400.0;

/// Current segment and what is left of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPosition {
    /// Half-hour segment of the day, 0..48.
    pub segment: u8,
    /// Whole seconds left in the segment.
    pub seconds_remaining: u16,
    /// Pulses still due before the segment ends.
    pub pulses_remaining: u16,
}

/// Seconds since local midnight, sub-second precision kept.
pub fn schedule_offset(now: DateTime<Utc>, time_zone: FixedOffset) -> Duration {
    let local = now.with_timezone(&time_zone);
    Duration::new(
        u64::from(local.num_seconds_from_midnight()),
        local.nanosecond() % 1_000_000_000,
    )
}

/// Rate in effect `offset` into the day.
pub fn rate_at_offset(schedule: &BasalSchedule, offset: Duration) -> f64 {
    let seconds = offset.as_secs_f64() % DAY_SECONDS;
    schedule.rate_at((seconds / 60.0) as u32)
}

/// Locate `offset` within its half-hour segment.
///
/// Pulses are counted on a grid of tenths of the pulse interval, so a pulse
/// that would land within the last tenth still counts.
pub fn segment_position(schedule: &BasalSchedule, offset: Duration) -> SegmentPosition {
    let segment_secs = SEGMENT_DURATION.as_secs_f64();
    let seconds = offset.as_secs_f64() % DAY_SECONDS;
    let segment = (seconds / segment_secs) as u8;
    let remaining = segment_secs - seconds % segment_secs;

    let pph = pulses_per_hour(rate_at_offset(schedule, offset));
    let pulses_remaining = if pph == 0 {
        0
    } else {
        let between_pulses = 3600.0 / f64::from(pph);
        let tenth = between_pulses / 10.0;
        ((remaining + tenth - remaining % tenth) / between_pulses) as u16
    };
    SegmentPosition {
        segment,
        seconds_remaining: remaining as u16,
        pulses_remaining,
    }
}

/// Schedule entries with equal neighbours folded together, as `(rate, duration)`.
pub fn merged_durations(schedule: &BasalSchedule) -> Vec<(f64, Duration)> {
    let mut merged: Vec<(f64, Duration)> = Vec::new();
    for (rate, minutes) in schedule.durations() {
        let duration = Duration::from_secs(u64::from(minutes) * 60);
        match merged.last_mut() {
            Some((last_rate, last_duration)) if *last_rate == rate => *last_duration += duration,
            _ => merged.push((rate, duration)),
        }
    }
    merged
}

/// Rate entries covering the whole day.
pub fn schedule_rate_entries(schedule: &BasalSchedule, zero: ZeroBasalEncoding) -> Vec<RateEntry> {
    merged_durations(schedule)
        .into_iter()
        .flat_map(|(rate, duration)| RateEntry::make_entries(rate, duration, zero))
        .collect()
}
