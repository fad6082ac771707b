// libpump-rs/libpump/src/omnipod/schedule/rate_entry.rs

//! Pulse timing entries of the basal and temp basal extra commands.
//!
//! Each entry is `[tenths of pulses:2][delay between pulses:4]`, the delay in
//! hundredths of a millisecond.

use std::time::Duration;

use crate::constants::POD_PULSE_SIZE;
use crate::omnipod::config::{MAX_TIME_BETWEEN_PULSES, NEAR_ZERO_BASAL_RATE_FLAG};
use crate::omnipod::schedule::table::{pulses_per_hour, temp_basal_segments, SEGMENT_DURATION};
use crate::protocol::parser::{be_u16_at, be_u32_at};
use crate::Result;

/// Pulse budget that caps how many segments one entry covers.
const MAX_PULSES_PER_ENTRY: f64 = 6400.0;

const HUNDREDTHS_OF_MS_PER_SEC: f64 = 100_000.0;

/// How a zero rate goes on the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ZeroBasalEncoding {
    /// One zero-pulse entry per half hour.
    #[default]
    ZeroPulses,
    /// A single entry at the near-zero rate, for pods that refuse zero pulses.
    NearZero,
}

/// One `[tenths of pulses:2][delay:4]` entry of an extra block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEntry {
    /// Pulses in the entry; zero for a zero-rate half hour.
    pub total_pulses: f64,
    /// Time between pulses.
    pub delay_between_pulses: Duration,
}

impl RateEntry {
    /// Encoded length.
    pub const LEN: usize = 6;

    /// Entry of `total_pulses` spaced by `delay_between_pulses`.
    pub fn new(total_pulses: f64, delay_between_pulses: Duration) -> Self {
        Self {
            total_pulses,
            delay_between_pulses,
        }
    }

    /// Delivery rate in U/h. Zero-pulse entries deliver nothing.
    pub fn rate(&self) -> f64 {
        if self.total_pulses == 0.0 {
            return 0.0;
        }
        3600.0 / self.delay_between_pulses.as_secs_f64() * POD_PULSE_SIZE
    }

    /// How long the entry runs.
    pub fn duration(&self) -> Duration {
        if self.total_pulses == 0.0 {
            return SEGMENT_DURATION;
        }
        self.delay_between_pulses.mul_f64(self.total_pulses)
    }

    /// Wire bytes; a near-zero entry gets the flag bit.
    pub fn encode(&self) -> [u8; Self::LEN] {
        let tenths = (self.total_pulses * 10.0).round().clamp(0.0, f64::from(u16::MAX)) as u16;
        let mut delay = to_hundredths_of_ms(self.delay_between_pulses);
        if self.total_pulses != 0.0 && self.delay_between_pulses == MAX_TIME_BETWEEN_PULSES {
            delay |= NEAR_ZERO_BASAL_RATE_FLAG;
        }
        let mut out = [0u8; Self::LEN];
        out[..2].copy_from_slice(&tenths.to_be_bytes());
        out[2..].copy_from_slice(&delay.to_be_bytes());
        out
    }

    /// Parse six bytes; the near-zero flag is dropped.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let tenths = be_u16_at(data, 0)?;
        let delay = be_u32_at(data, 2)? & !NEAR_ZERO_BASAL_RATE_FLAG;
        Ok(Self::new(f64::from(tenths) / 10.0, from_hundredths_of_ms(delay)))
    }

    /// Entries delivering `rate` U/h for `duration`.
    ///
    /// Long or fast deliveries are split across several entries.
    pub fn make_entries(rate: f64, duration: Duration, zero: ZeroBasalEncoding) -> Vec<Self> {
        let mut remaining_segments = u32::from(temp_basal_segments(duration));
        // pulse count and spacing both come from the rate snapped to whole pulses
        let pph = pulses_per_hour(rate);
        let pulses_per_segment = f64::from(pph) / 2.0;

        if pulses_per_segment == 0.0 {
            return match zero {
                ZeroBasalEncoding::ZeroPulses => (0..remaining_segments)
                    .map(|_| Self::new(0.0, MAX_TIME_BETWEEN_PULSES))
                    .collect(),
                ZeroBasalEncoding::NearZero => vec![Self::new(
                    f64::from(remaining_segments) / 10.0,
                    MAX_TIME_BETWEEN_PULSES,
                )],
            };
        }

        let max_segments = ((MAX_PULSES_PER_ENTRY / pulses_per_segment).floor() as u32).max(1);
        let delay = Duration::from_secs_f64(3600.0 / f64::from(pph));
        let mut entries = Vec::new();
        while remaining_segments > 0 {
            let segments = remaining_segments.min(max_segments);
            entries.push(Self::new(pulses_per_segment * f64::from(segments), delay));
            remaining_segments -= segments;
        }
        entries
    }
}

pub(crate) fn to_hundredths_of_ms(d: Duration) -> u32 {
    (d.as_nanos() / 10_000).min(u128::from(u32::MAX)) as u32
}

pub(crate) fn from_hundredths_of_ms(raw: u32) -> Duration {
    Duration::from_nanos(u64::from(raw) * 10_000)
}

/// `seconds` as hundredths of a millisecond, rounded.
pub(crate) fn round_hundredths_of_ms(seconds: f64) -> u32 {
    (seconds * HUNDREDTHS_OF_MS_PER_SEC).round().clamp(0.0, f64::from(u32::MAX)) as u32
}
