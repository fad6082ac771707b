// libpump-rs/libpump/src/types.rs

//! Identifiers and schedules shared across the crate.

use crate::Error;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// Minimed pump serial - Newtype Pattern (3 バイト, 6 hex digits on the label)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PumpId([u8; 3]);

impl PumpId {
    /// Serial from its three bytes.
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    /// The three bytes.
    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    /// Six hex digits, as on the label.
    pub fn to_hex(&self) -> String {
        crate::utils::bytes_to_hex(self.as_bytes())
    }
}

impl TryFrom<&[u8]> for PumpId {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != 3 {
            return Err(Error::InvalidLength {
                expected: 3,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 3];
        arr.copy_from_slice(&bytes[..3]);
        Ok(Self(arr))
    }
}

impl FromStr for PumpId {
    type Err = Error;

    /// Parses the six-digit serial printed on the pump, e.g. `"350535"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = crate::utils::parse_hex(s).map_err(Error::InvalidData)?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for PumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Pod radio address (4 バイト, big-endian on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PodAddress(u32);

impl PodAddress {
    /// Address every unpaired pod listens on.
    pub const BROADCAST: PodAddress = PodAddress(0xffff_ffff);

    /// Address from its value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Big-endian bytes, as sent.
    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl TryFrom<&[u8]> for PodAddress {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != 4 {
            return Err(Error::InvalidLength {
                expected: 4,
                actual: bytes.len(),
            });
        }
        Ok(Self(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])))
    }
}

impl fmt::Display for PodAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// One entry of a daily basal schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasalScheduleEntry {
    /// Position in the schedule.
    pub index: usize,
    /// Minutes after midnight, a multiple of 30.
    pub time_offset_minutes: u32,
    /// Units per hour.
    pub rate: f64,
}

/// Daily basal schedule: entries sorted by offset, the first starting at midnight.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasalSchedule {
    entries: Vec<BasalScheduleEntry>,
}

impl BasalSchedule {
    /// Minutes in the repeating day.
    pub const DAY_MINUTES: u32 = 24 * 60;

    /// Build a validated schedule from `(offset minutes, rate)` pairs.
    pub fn new(items: &[(u32, f64)]) -> crate::Result<Self> {
        let first = items
            .first()
            .ok_or_else(|| Error::InvalidState("basal schedule has no entries".into()))?;
        if first.0 != 0 {
            return Err(Error::InvalidState(
                "first basal entry must start at midnight".into(),
            ));
        }
        let mut previous: Option<u32> = None;
        for &(offset, rate) in items {
            if offset % 30 != 0 || offset >= Self::DAY_MINUTES {
                return Err(Error::InvalidState(format!(
                    "basal offset {} is not a half-hour boundary within the day",
                    offset
                )));
            }
            if previous.is_some_and(|p| offset <= p) {
                return Err(Error::InvalidState(
                    "basal offsets must be strictly increasing".into(),
                ));
            }
            if rate.is_nan() || rate < 0.0 {
                return Err(Error::InvalidState(format!("invalid basal rate {}", rate)));
            }
            previous = Some(offset);
        }
        Ok(Self::from_entries(
            items
                .iter()
                .enumerate()
                .map(|(index, &(time_offset_minutes, rate))| BasalScheduleEntry {
                    index,
                    time_offset_minutes,
                    rate,
                })
                .collect(),
        ))
    }

    /// Wrap entries already decoded from a device.
    pub(crate) fn from_entries(entries: Vec<BasalScheduleEntry>) -> Self {
        Self { entries }
    }

    /// Entries ordered by start.
    pub fn entries(&self) -> &[BasalScheduleEntry] {
        &self.entries
    }

    /// No entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rate in effect `minutes` after midnight.
    pub fn rate_at(&self, minutes: u32) -> f64 {
        let minutes = minutes % Self::DAY_MINUTES;
        self.entries
            .iter()
            .take_while(|e| e.time_offset_minutes <= minutes)
            .last()
            .map(|e| e.rate)
            .unwrap_or(0.0)
    }

    /// Each entry paired with the minutes it lasts; the last entry runs to midnight.
    pub fn durations(&self) -> Vec<(f64, u32)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let end = self
                    .entries
                    .get(i + 1)
                    .map(|next| next.time_offset_minutes)
                    .unwrap_or(Self::DAY_MINUTES);
                (e.rate, end.saturating_sub(e.time_offset_minutes))
            })
            .collect()
    }
}
