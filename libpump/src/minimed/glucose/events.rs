// libpump-rs/libpump/src/minimed/glucose/events.rs

//! Sensor glucose records.
//!
//! Glucose pages are read back to front, so each record arrives opcode first
//! followed by its payload in reversed order. The layouts below are written
//! against that reversed view.

use chrono::NaiveDateTime;

use crate::minimed::time_format::parse_glucose_date;
use crate::protocol::parser::{be_u16_at, byte_at, slice_at};
use crate::{Error, Result};

/// Glucose history record opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GlucoseEventType {
    /// `0x01` End of data.
    DataEnd,
    /// `0x02` Weak sensor signal.
    SensorWeakSignal,
    /// `0x03` Calibration state.
    SensorCal,
    /// `0x07` Undocumented.
    Fokko7,
    /// `0x08` Reference timestamp.
    SensorTimestamp,
    /// `0x0a` Transmitter battery changed.
    BatteryChange,
    /// `0x0b` Sensor status.
    SensorStatus,
    /// `0x0c` Clock changed.
    DateTimeChange,
    /// `0x0d` Sensor sync.
    SensorSync,
    /// `0x0e` Calibration BG.
    CalBgForGh,
    /// `0x0f` Calibration factor.
    SensorCalFactor,
    /// `0x10` Undocumented.
    TenSomething,
    /// `0x13` Undocumented; untimed.
    NineteenSomething,
    /// Any opcode of 20 or above is a sensor reading.
    SensorData,
}

/// How a record gets its time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Carries an absolute time that anchors the relative records after it.
    Reference,
    /// Carries its own absolute time but anchors nothing.
    Own,
    /// Five minutes after the previous relative record.
    Relative,
    /// Same time as the previous relative record.
    RelativeNoAdvance,
}

use GlucoseEventType as G;

/// Opcode, type, length, time source.
const GLUCOSE_TABLE: &[(u8, GlucoseEventType, usize, TimeSource)] = &[
    (0x01, G::DataEnd, 1, TimeSource::Relative),
    (0x02, G::SensorWeakSignal, 1, TimeSource::Relative),
    (0x03, G::SensorCal, 2, TimeSource::Relative),
    (0x07, G::Fokko7, 2, TimeSource::Relative),
    (0x08, G::SensorTimestamp, 5, TimeSource::Reference),
    (0x0a, G::BatteryChange, 5, TimeSource::Own),
    (0x0b, G::SensorStatus, 5, TimeSource::Own),
    (0x0c, G::DateTimeChange, 5, TimeSource::Own),
    (0x0d, G::SensorSync, 5, TimeSource::Own),
    (0x0e, G::CalBgForGh, 6, TimeSource::Own),
    (0x0f, G::SensorCalFactor, 7, TimeSource::Own),
    (0x10, G::TenSomething, 5, TimeSource::Own),
    (0x13, G::NineteenSomething, 1, TimeSource::RelativeNoAdvance),
];

const SENSOR_DATA_MIN_OPCODE: u8 = 20;

impl GlucoseEventType {
    /// Type, length and time source for an opcode. Opcodes below 20 that are
    /// not in the table are unknown.
    pub fn lookup(opcode: u8) -> Option<(Self, usize, TimeSource)> {
        GLUCOSE_TABLE
            .iter()
            .find(|(op, ..)| *op == opcode)
            .map(|(_, t, len, src)| (*t, *len, *src))
            .or_else(|| {
                (opcode >= SENSOR_DATA_MIN_OPCODE).then_some((
                    G::SensorData,
                    1,
                    TimeSource::Relative,
                ))
            })
    }

    /// How records of this type are timed.
    pub fn time_source(self) -> TimeSource {
        GLUCOSE_TABLE
            .iter()
            .find(|(_, t, ..)| *t == self)
            .map(|(.., src)| *src)
            .unwrap_or(TimeSource::Relative)
    }
}

/// Why a sensor timestamp was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorTimestampType {
    /// Last RF contact.
    LastRf,
    /// End of a page.
    PageEnd,
    /// Gap in readings.
    Gap,
    /// Any other code.
    Unknown,
}

impl SensorTimestampType {
    /// Decode the timestamp kind.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::LastRf,
            1 => Self::PageEnd,
            2 => Self::Gap,
            _ => Self::Unknown,
        }
    }
}

/// Decoded fields of the glucose records that carry any.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GlucoseDetails {
    /// Nothing beyond the type and time.
    None,
    /// Sensor glucose in mg/dL.
    SensorData {
        /// Sensor glucose.
        sgv: u16,
    },
    /// `true` while the sensor waits for a calibration.
    SensorCal {
        /// Waiting for a calibration.
        waiting: bool,
    },
    /// Reference timestamp.
    SensorTimestamp {
        /// Why it was written.
        kind: SensorTimestampType,
    },
    /// Calibration BG.
    CalBgForGh {
        /// Meter BG in mg/dL.
        amount: u16,
    },
    /// Calibration factor.
    SensorCalFactor {
        /// Calibration factor.
        factor: f64,
    },
}

/// A decoded glucose history record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlucoseEvent {
    /// Opcode kind.
    pub event_type: GlucoseEventType,
    /// The record as read.
    pub raw_data: Vec<u8>,
    /// Absolute records are stamped at decode time; relative ones once anchored.
    pub timestamp: Option<NaiveDateTime>,
    /// Decoded fields.
    pub details: GlucoseDetails,
}

impl GlucoseEvent {
    /// Decode the record at the start of `data` (reversed page order).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let opcode = byte_at(data, 0)?;
        let (event_type, length, source) =
            GlucoseEventType::lookup(opcode).ok_or(Error::UnknownEventType(opcode))?;
        let raw = slice_at(data, 0, length).map_err(|_| Error::NotEnoughData {
            needed: length,
            available: data.len(),
        })?;

        let timestamp = match source {
            TimeSource::Reference | TimeSource::Own => parse_glucose_date(raw, 1)?,
            _ => None,
        };

        let details = match event_type {
            G::SensorData => GlucoseDetails::SensorData {
                sgv: u16::from(opcode) * 2,
            },
            G::SensorCal => GlucoseDetails::SensorCal {
                waiting: raw[1] == 1,
            },
            G::SensorTimestamp => GlucoseDetails::SensorTimestamp {
                kind: SensorTimestampType::from_code((raw[3] >> 5) & 0x03),
            },
            G::CalBgForGh => GlucoseDetails::CalBgForGh {
                amount: (u16::from(raw[3] & 0x20) << 3) | u16::from(raw[5]),
            },
            G::SensorCalFactor => GlucoseDetails::SensorCalFactor {
                factor: f64::from(be_u16_at(raw, 5)?) / 1000.0,
            },
            _ => GlucoseDetails::None,
        };

        Ok(Self {
            event_type,
            raw_data: raw.to_vec(),
            timestamp,
            details,
        })
    }

    /// Record length in bytes.
    pub fn length(&self) -> usize {
        self.raw_data.len()
    }

    /// How this record is timed; sensor readings are always relative.
    pub fn time_source(&self) -> TimeSource {
        if self.event_type == G::SensorData {
            TimeSource::Relative
        } else {
            self.event_type.time_source()
        }
    }

    /// Timed from the previous reference.
    pub fn is_relative(&self) -> bool {
        matches!(
            self.time_source(),
            TimeSource::Relative | TimeSource::RelativeNoAdvance
        )
    }

    /// Anchors the relative records after it.
    pub fn is_reference(&self) -> bool {
        self.time_source() == TimeSource::Reference
    }
}
