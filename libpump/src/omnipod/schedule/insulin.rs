// libpump-rs/libpump/src/omnipod/schedule/insulin.rs

//! The set-insulin-schedule command for basal, temp basal and bolus.

use std::time::Duration;

use crate::constants::POD_PULSE_SIZE;
use crate::omnipod::config::pulses_for;
use crate::omnipod::schedule::basal::segment_position;
use crate::omnipod::schedule::table::{pulses_per_hour, BasalDeliveryTable, SEGMENT_DURATION};
use crate::protocol::parser::{be_u16_at, be_u32_at, byte_at, length_prefixed_block};
use crate::types::BasalSchedule;
use crate::{Error, Result};

/// Tag of the set-insulin-schedule block.
pub const SET_INSULIN_SCHEDULE_TAG: u8 = 0x1a;

/// What a set-insulin-schedule command programs.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliverySchedule {
    /// Type 0: the daily basal schedule.
    BasalSchedule {
        /// Segment delivering now.
        current_segment: u8,
        /// Whole seconds left in that segment.
        seconds_remaining: u16,
        /// Pulses still due in that segment.
        pulses_remaining: u16,
        /// All 48 segments.
        table: BasalDeliveryTable,
    },
    /// Type 1: a temp basal.
    TempBasal {
        /// Whole seconds left in the first segment.
        seconds_remaining: u16,
        /// Pulses in the first segment.
        first_segment_pulses: u16,
        /// Segments of the temp basal.
        table: BasalDeliveryTable,
    },
    /// Type 2: an immediate bolus.
    Bolus {
        /// Units.
        units: f64,
        /// Time between pulses.
        time_between_pulses: Duration,
    },
}

impl DeliverySchedule {
    /// Type byte.
    pub fn type_code(&self) -> u8 {
        match self {
            Self::BasalSchedule { .. } => 0,
            Self::TempBasal { .. } => 1,
            Self::Bolus { .. } => 2,
        }
    }

    /// Schedule data after the checksum.
    fn data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        match self {
            Self::BasalSchedule {
                current_segment,
                seconds_remaining,
                pulses_remaining,
                table,
            } => {
                data.push(*current_segment);
                data.extend_from_slice(&(seconds_remaining << 3).to_be_bytes());
                data.extend_from_slice(&pulses_remaining.to_be_bytes());
                data.extend_from_slice(&table.encode());
            }
            Self::TempBasal {
                seconds_remaining,
                first_segment_pulses,
                table,
            } => {
                data.push(table.num_segments() as u8);
                data.extend_from_slice(&(seconds_remaining << 3).to_be_bytes());
                data.extend_from_slice(&first_segment_pulses.to_be_bytes());
                data.extend_from_slice(&table.encode());
            }
            Self::Bolus {
                units,
                time_between_pulses,
            } => {
                let pulses = pulses_for(*units);
                let eighths = (time_between_pulses.as_secs_f64() * 8.0).round() as u16;
                let field_a = pulses.wrapping_mul(eighths);
                data.push(1);
                data.extend_from_slice(&field_a.to_be_bytes());
                data.extend_from_slice(&pulses.to_be_bytes());
                data.extend_from_slice(&pulses.to_be_bytes());
            }
        }
        data
    }

    fn checksum(&self, data: &[u8]) -> u16 {
        let header = |n: usize| data.iter().take(n).fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)));
        match self {
            Self::BasalSchedule { table, .. } | Self::TempBasal { table, .. } => {
                header(5).wrapping_add(table.checksum())
            }
            Self::Bolus { .. } => header(7),
        }
    }

    fn decode(type_code: u8, data: &[u8]) -> Result<Self> {
        match type_code {
            0 => Ok(Self::BasalSchedule {
                current_segment: byte_at(data, 0)?,
                seconds_remaining: be_u16_at(data, 1)? >> 3,
                pulses_remaining: be_u16_at(data, 3)?,
                table: BasalDeliveryTable::decode(data.get(5..).unwrap_or_default())?,
            }),
            1 => Ok(Self::TempBasal {
                seconds_remaining: be_u16_at(data, 1)? >> 3,
                first_segment_pulses: be_u16_at(data, 3)?,
                table: BasalDeliveryTable::decode(data.get(5..).unwrap_or_default())?,
            }),
            2 => {
                let field_a = be_u16_at(data, 1)?;
                let pulses = be_u16_at(data, 3)?;
                let time_between_pulses = if pulses == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_secs_f64(f64::from(field_a) / 8.0 / f64::from(pulses))
                };
                Ok(Self::Bolus {
                    units: f64::from(pulses) * POD_PULSE_SIZE,
                    time_between_pulses,
                })
            }
            other => Err(Error::UnknownValue {
                value: other,
                what: "insulin schedule type",
            }),
        }
    }
}

/// `1a len [nonce:4][type][checksum:2][schedule data]`
#[derive(Debug, Clone, PartialEq)]
pub struct SetInsulinSchedule {
    /// Command nonce.
    pub nonce: u32,
    /// What to program.
    pub schedule: DeliverySchedule,
}

impl SetInsulinSchedule {
    /// Program the daily schedule, picking up `offset` into the day.
    pub fn basal_schedule(nonce: u32, schedule: &BasalSchedule, offset: Duration) -> Self {
        let position = segment_position(schedule, offset);
        Self {
            nonce,
            schedule: DeliverySchedule::BasalSchedule {
                current_segment: position.segment,
                seconds_remaining: position.seconds_remaining,
                pulses_remaining: position.pulses_remaining,
                table: BasalDeliveryTable::from_schedule(schedule),
            },
        }
    }

    /// Temp basal of `rate` U/h for `duration`.
    pub fn temp_basal(nonce: u32, rate: f64, duration: Duration) -> Self {
        Self {
            nonce,
            schedule: DeliverySchedule::TempBasal {
                seconds_remaining: SEGMENT_DURATION.as_secs() as u16,
                first_segment_pulses: pulses_per_hour(rate) / 2,
                table: BasalDeliveryTable::temp_basal(rate, duration),
            },
        }
    }

    /// Immediate bolus of `units`.
    pub fn bolus(nonce: u32, units: f64, time_between_pulses: Duration) -> Self {
        Self {
            nonce,
            schedule: DeliverySchedule::Bolus {
                units,
                time_between_pulses,
            },
        }
    }

    /// Wire bytes, checksum included.
    pub fn encode(&self) -> Vec<u8> {
        let data = self.schedule.data();
        let checksum = self.schedule.checksum(&data);
        let mut out = Vec::with_capacity(data.len() + 9);
        out.push(SET_INSULIN_SCHEDULE_TAG);
        out.push((data.len() + 7) as u8);
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.push(self.schedule.type_code());
        out.extend_from_slice(&checksum.to_be_bytes());
        out.extend_from_slice(&data);
        out
    }

    /// Parse from the tag byte on; the checksum must match.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(raw)?;
        let nonce = be_u32_at(block, 2)?;
        let type_code = byte_at(block, 6)?;
        let expected = be_u16_at(block, 7)?;
        let data = block.get(9..).unwrap_or_default();
        let schedule = DeliverySchedule::decode(type_code, data)?;
        let actual = schedule.checksum(data);
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }
        Ok(Self { nonce, schedule })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omnipod::schedule::table::BasalTableEntry;
    use crate::utils::{bytes_to_hex, parse_hex};

    #[test]
    fn temp_basal_commands() {
        let small = SetInsulinSchedule::temp_basal(0xea2d0a3b, 0.2, Duration::from_secs(1800));
        assert_eq!(bytes_to_hex(&small.encode()), "1a0eea2d0a3b01007d01384000020002");

        let larger = SetInsulinSchedule::temp_basal(0x87e8d03a, 2.0, Duration::from_secs(5400));
        assert_eq!(bytes_to_hex(&larger.encode()), "1a0e87e8d03a0100cb03384000142014");

        let decoded = SetInsulinSchedule::decode(&parse_hex("1a0e87e8d03a0100cb03384000142014").unwrap()).unwrap();
        match decoded.schedule {
            DeliverySchedule::TempBasal {
                seconds_remaining,
                first_segment_pulses,
                table,
            } => {
                assert_eq!(seconds_remaining, 1800);
                assert_eq!(first_segment_pulses, 20);
                assert_eq!(table.entries, vec![BasalTableEntry::new(3, 20, false)]);
                assert_eq!(table.total_pulses(), 60);
            }
            other => panic!("expected temp basal, got {:?}", other),
        }
    }

    #[test]
    fn prime_bolus_command() {
        let cmd = SetInsulinSchedule::bolus(0xbed2e16b, 2.6, Duration::from_secs(1));
        assert_eq!(bytes_to_hex(&cmd.encode()), "1a0ebed2e16b02010a0101a000340034");
        let back = SetInsulinSchedule::decode(&cmd.encode()).unwrap();
        match back.schedule {
            DeliverySchedule::Bolus {
                units,
                time_between_pulses,
            } => {
                assert!((units - 2.6).abs() < 1e-9);
                assert_eq!(time_between_pulses, Duration::from_secs(1));
            }
            other => panic!("expected bolus, got {:?}", other),
        }
    }

    #[test]
    fn basal_schedule_commands_match_captures() {
        let three = BasalSchedule::new(&[(0, 1.05), (630, 0.9), (1110, 1.0)]).unwrap();
        let cmd = SetInsulinSchedule::basal_schedule(0x0d6612db, &three, Duration::from_secs(83_707));
        assert_eq!(bytes_to_hex(&cmd.encode()), "1a140d6612db0003102e1be80005f80a480af009a00a");

        let four = BasalSchedule::new(&[(0, 1.05), (510, 0.55), (540, 0.9), (1410, 1.15)]).unwrap();
        let cmd = SetInsulinSchedule::basal_schedule(0x671ab0b2, &four, Duration::from_secs_f64(2278.840_24));
        assert_eq!(
            bytes_to_hex(&cmd.encode()),
            "1a18671ab0b20002400129480007f80a000a0005f009c009000b"
        );
        let cmd = SetInsulinSchedule::basal_schedule(0x6a51490b, &four, Duration::from_secs_f64(2768.873_59));
        assert_eq!(
            bytes_to_hex(&cmd.encode()),
            "1a186a51490b0002dd0119f80004f80a000a0005f009c009000b"
        );

        let flat = BasalSchedule::new(&[(0, 1.0)]).unwrap();
        let cmd = SetInsulinSchedule::basal_schedule(0x0a229e93, &flat, Duration::ZERO);
        assert_eq!(bytes_to_hex(&cmd.encode()), "1a120a229e93000262003840000af00af00af00a");
    }

    #[test]
    fn minimal_rate_schedule_decodes() {
        let cmd = SetInsulinSchedule::decode(&parse_hex("1a1201020304000065101c200001f800f800f800").unwrap()).unwrap();
        assert_eq!(cmd.nonce, 0x01020304);
        match cmd.schedule {
            DeliverySchedule::BasalSchedule {
                current_segment,
                seconds_remaining,
                table,
                ..
            } => {
                assert_eq!(current_segment, 16);
                assert_eq!(seconds_remaining, 900);
                assert_eq!(table.entries.len(), 3);
                for entry in &table.entries {
                    assert_eq!(entry.segments, 16);
                    assert_eq!(entry.pulses, 0);
                    assert!(entry.alternate_segment_pulse);
                }
            }
            other => panic!("expected basal schedule, got {:?}", other),
        }
    }

    #[test]
    fn minimal_rate_schedule_encodes() {
        let minimal = BasalSchedule::new(&[(0, 0.05)]).unwrap();
        let offset = Duration::from_secs(8 * 3600 + 15 * 60);
        let cmd = SetInsulinSchedule::basal_schedule(0x01020304, &minimal, offset);
        // half a pulse per segment leaves no whole pulse in the last quarter hour
        assert_eq!(bytes_to_hex(&cmd.encode()), "1a1201020304000064101c200000f800f800f800");

        // the reference capture only differs in the pending pulse and its checksum
        let captured =
            SetInsulinSchedule::decode(&parse_hex("1a1201020304000065101c200001f800f800f800").unwrap()).unwrap();
        match (&cmd.schedule, &captured.schedule) {
            (
                DeliverySchedule::BasalSchedule {
                    current_segment,
                    seconds_remaining,
                    pulses_remaining,
                    table,
                },
                DeliverySchedule::BasalSchedule {
                    current_segment: captured_segment,
                    seconds_remaining: captured_seconds,
                    pulses_remaining: captured_pulses,
                    table: captured_table,
                },
            ) => {
                assert_eq!(current_segment, captured_segment);
                assert_eq!(seconds_remaining, captured_seconds);
                assert_eq!(table, captured_table);
                assert_eq!((*pulses_remaining, *captured_pulses), (0, 1));
            }
            other => panic!("expected basal schedules, got {:?}", other),
        }
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let mut raw = parse_hex("1a0eea2d0a3b01007d01384000020002").unwrap();
        raw[8] ^= 0x01;
        assert!(matches!(
            SetInsulinSchedule::decode(&raw),
            Err(Error::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            SetInsulinSchedule::decode(&raw[..10]),
            Err(Error::NotEnoughData { .. })
        ));
    }
}
