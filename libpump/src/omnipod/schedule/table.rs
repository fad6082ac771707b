// libpump-rs/libpump/src/omnipod/schedule/table.rs

//! Half-hour pulse table carried by the insulin schedule command.
//!
//! A day is 48 segments of 30 minutes. Each entry covers up to 16
//! consecutive segments with the same pulse count; the alternate flag adds
//! one pulse to every second segment so odd hourly pulse counts average out.

use std::time::Duration;

use crate::constants::{POD_PULSE_SIZE, SEGMENT_MINUTES};
use crate::protocol::parser::ensure_len;
use crate::types::BasalSchedule;
use crate::Result;

/// Half-hour segments in a day.
pub const SEGMENTS_PER_DAY: usize = 48;
/// Segments one table entry can cover.
pub const MAX_SEGMENTS_PER_ENTRY: u8 = 16;
/// Length of a segment.
pub const SEGMENT_DURATION: Duration = Duration::from_secs(SEGMENT_MINUTES as u64 * 60);

/// Pulses per hour for `rate` U/h.
pub(crate) fn pulses_per_hour(rate: f64) -> u16 {
    (rate / POD_PULSE_SIZE).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// `[(segments-1)<<4 | alternate<<3 | pulses>>8][pulses & 0xff]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasalTableEntry {
    /// Segments covered, 1..=16.
    pub segments: u8,
    /// Pulses per segment, ten bits.
    pub pulses: u16,
    /// Odd segments get one extra pulse.
    pub alternate_segment_pulse: bool,
}

impl BasalTableEntry {
    /// Encoded length.
    pub const LEN: usize = 2;

    /// Entry from its parts.
    pub fn new(segments: u8, pulses: u16, alternate_segment_pulse: bool) -> Self {
        Self {
            segments,
            pulses,
            alternate_segment_pulse,
        }
    }

    /// Wire bytes.
    pub fn encode(&self) -> [u8; Self::LEN] {
        let alt = if self.alternate_segment_pulse { 0x08 } else { 0 };
        [
            (self.segments.saturating_sub(1) << 4) | alt | ((self.pulses >> 8) & 0x03) as u8,
            (self.pulses & 0xff) as u8,
        ]
    }

    /// Parse two bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, Self::LEN)?;
        Ok(Self {
            segments: (data[0] >> 4) + 1,
            pulses: (u16::from(data[0] & 0x03) << 8) | u16::from(data[1]),
            alternate_segment_pulse: data[0] & 0x08 != 0,
        })
    }

    /// Contribution of this entry to the command checksum.
    pub fn checksum(&self) -> u16 {
        let segments = u16::from(self.segments);
        let per_segment = (self.pulses & 0xff) + (self.pulses >> 8);
        let alt = if self.alternate_segment_pulse { segments / 2 } else { 0 };
        per_segment.wrapping_mul(segments).wrapping_add(alt)
    }

    /// Pulses delivered over all segments of the entry.
    pub fn total_pulses(&self) -> u32 {
        let alt = if self.alternate_segment_pulse {
            u32::from(self.segments) / 2
        } else {
            0
        };
        u32::from(self.pulses) * u32::from(self.segments) + alt
    }
}

/// Run-length encoded pulses per half-hour segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasalDeliveryTable {
    /// Entries in order.
    pub entries: Vec<BasalTableEntry>,
}

impl BasalDeliveryTable {
    /// Table from its entries.
    pub fn new(entries: Vec<BasalTableEntry>) -> Self {
        Self { entries }
    }

    /// Compress a daily schedule into table entries.
    pub fn from_schedule(schedule: &BasalSchedule) -> Self {
        let mut segments = Vec::with_capacity(SEGMENTS_PER_DAY);
        let mut half_pulse_owed = false;
        let mut previous_pph = None;
        for i in 0..SEGMENTS_PER_DAY {
            let pph = pulses_per_hour(schedule.rate_at(i as u32 * SEGMENT_MINUTES));
            // each new rate starts its own alternation
            if previous_pph != Some(pph) {
                half_pulse_owed = false;
            }
            previous_pph = Some(pph);
            let odd = pph & 1 == 1;
            let extra = u16::from(half_pulse_owed && odd);
            segments.push((pph >> 1) + extra);
            half_pulse_owed ^= odd;
        }
        Self::new(compress(&segments))
    }

    /// Table for a temp basal of `rate` U/h lasting `duration`.
    pub fn temp_basal(rate: f64, duration: Duration) -> Self {
        let pph = pulses_per_hour(rate);
        let mut remaining = temp_basal_segments(duration);
        let mut entries = Vec::new();
        while remaining > 0 {
            let segments = remaining.min(MAX_SEGMENTS_PER_ENTRY);
            let alternate = pph & 1 == 1 && segments > 1;
            entries.push(BasalTableEntry::new(segments, pph >> 1, alternate));
            remaining -= segments;
        }
        Self::new(entries)
    }

    /// Segments covered.
    pub fn num_segments(&self) -> usize {
        self.entries.iter().map(|e| usize::from(e.segments)).sum()
    }

    /// Pulses over every segment.
    pub fn total_pulses(&self) -> u32 {
        self.entries.iter().map(BasalTableEntry::total_pulses).sum()
    }

    /// Sum of the entry checksums.
    pub fn checksum(&self) -> u16 {
        self.entries
            .iter()
            .fold(0u16, |acc, e| acc.wrapping_add(e.checksum()))
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.entries.iter().flat_map(BasalTableEntry::encode).collect()
    }

    /// Parse consecutive entries.
    pub fn decode(data: &[u8]) -> Result<Self> {
        data.chunks(BasalTableEntry::LEN)
            .map(BasalTableEntry::decode)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }
}

/// Whole half-hour segments in a temp basal, at least one.
pub(crate) fn temp_basal_segments(duration: Duration) -> u8 {
    let segments = (duration.as_secs_f64() / SEGMENT_DURATION.as_secs_f64()).round();
    segments.clamp(1.0, f64::from(u8::MAX)) as u8
}

/// Greedy merge of per-segment pulse counts.
///
/// An entry keeps growing while each segment matches the pattern set by its
/// first two: equal counts, or (alternating) one extra pulse on odd positions.
fn compress(segments: &[u16]) -> Vec<BasalTableEntry> {
    let mut entries = Vec::new();
    let mut run: Vec<u16> = Vec::new();
    let mut alternate = false;
    for &pulses in segments {
        let Some(&first) = run.first() else {
            run.push(pulses);
            continue;
        };
        let delta = i32::from(pulses) - i32::from(first);
        if run.len() == 1 {
            alternate = delta == 1;
        }
        let expected = if alternate { (run.len() % 2) as i32 } else { 0 };
        if delta != expected || run.len() == usize::from(MAX_SEGMENTS_PER_ENTRY) {
            entries.push(BasalTableEntry::new(run.len() as u8, first, alternate));
            run.clear();
        }
        run.push(pulses);
    }
    if let Some(&first) = run.first() {
        entries.push(BasalTableEntry::new(run.len() as u8, first, alternate));
    }
    entries
}
