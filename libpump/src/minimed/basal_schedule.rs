// libpump-rs/libpump/src/minimed/basal_schedule.rs

//! Decoder for the pump's stored basal profile.
//!
//! The profile is a run of 3-byte entries `[rate lo, rate hi, offset]`:
//! rate in 0.025 U/h steps (little endian), offset in half hours. A
//! `00 00 00` or `00 00 3f` entry after the first marks the end.

use log::trace;

use crate::constants::SEGMENT_MINUTES;
use crate::types::{BasalSchedule, BasalScheduleEntry};

const ENTRY_LENGTH: usize = 3;
const RATE_STEP: f64 = 0.025;

fn is_terminator(entry: &[u8]) -> bool {
    matches!(entry, [0, 0, 0] | [0, 0, 0x3f])
}

/// Decode profile bytes (one or more concatenated 64-byte frames).
pub fn parse_basal_schedule(data: &[u8]) -> BasalSchedule {
    let entries: Vec<BasalScheduleEntry> = data
        .chunks_exact(ENTRY_LENGTH)
        .enumerate()
        .take_while(|(index, entry)| *index == 0 || !is_terminator(entry))
        .map(|(index, entry)| BasalScheduleEntry {
            index,
            time_offset_minutes: u32::from(entry[2]) * SEGMENT_MINUTES,
            rate: f64::from(u16::from_le_bytes([entry[0], entry[1]])) * RATE_STEP,
        })
        .collect();
    trace!("decoded basal profile with {} entries", entries.len());
    BasalSchedule::from_entries(entries)
}

/// Encode a schedule in the profile layout, terminated and zero padded to `len`.
pub fn encode_basal_schedule(schedule: &BasalSchedule, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len.max(schedule.entries().len() * ENTRY_LENGTH));
    for entry in schedule.entries() {
        let strokes = (entry.rate / RATE_STEP).round() as u16;
        out.extend_from_slice(&strokes.to_le_bytes());
        out.push((entry.time_offset_minutes / SEGMENT_MINUTES) as u8);
    }
    if out.len() < len {
        out.resize(len, 0);
    }
    out
}
