// libpump-rs/libpump/src/omnipod/blocks/extras.rs

//! The "extra" blocks that follow a set-insulin-schedule block and tell the
//! pod how to time its pulses.

use std::time::Duration;

use crate::omnipod::config::pulses_for;
use crate::omnipod::schedule::rate_entry::{from_hundredths_of_ms, round_hundredths_of_ms};
use crate::omnipod::schedule::{schedule_rate_entries, RateEntry, ZeroBasalEncoding};
use crate::protocol::parser::{be_u16_at, be_u32_at, byte_at, length_prefixed_block};
use crate::types::BasalSchedule;
use crate::{Error, Result};

const BASAL_SCHEDULE_EXTRA_TAG: u8 = 0x13;
const TEMP_BASAL_EXTRA_TAG: u8 = 0x16;
const BOLUS_EXTRA_TAG: u8 = 0x17;

const DAY_SECONDS: f64 = 86_400.0;

/// Beep flags shared by the extra blocks:
/// `[acknowledgement:1][completion:1][reminder minutes:6]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BeepOptions {
    /// Beep when the command is accepted.
    pub acknowledgement_beep: bool,
    /// Beep when the delivery ends.
    pub completion_beep: bool,
    /// Minutes between reminders, 0 for none.
    pub program_reminder_minutes: u8,
}

impl BeepOptions {
    /// Beep flags.
    pub fn new(acknowledgement_beep: bool, completion_beep: bool, program_reminder_minutes: u8) -> Self {
        Self {
            acknowledgement_beep,
            completion_beep,
            program_reminder_minutes,
        }
    }

    /// Packed byte.
    pub fn encode(self) -> u8 {
        u8::from(self.acknowledgement_beep) << 7
            | u8::from(self.completion_beep) << 6
            | (self.program_reminder_minutes & 0x3f)
    }

    /// Unpack a byte.
    pub fn decode(raw: u8) -> Self {
        Self::new(raw & 0x80 != 0, raw & 0x40 != 0, raw & 0x3f)
    }
}

fn encode_entries(out: &mut Vec<u8>, entries: &[RateEntry]) {
    for entry in entries {
        out.extend_from_slice(&entry.encode());
    }
}

fn decode_entries(block: &[u8]) -> Result<Vec<RateEntry>> {
    let entries = block.get(10..).unwrap_or_default();
    if block.len() < 10 || entries.len() % RateEntry::LEN != 0 {
        return Err(Error::InvalidData(format!(
            "extra block of {} bytes does not hold whole rate entries",
            block.len()
        )));
    }
    entries.chunks(RateEntry::LEN).map(RateEntry::decode).collect()
}

fn tenths_of_pulses(pulses: f64) -> u16 {
    (pulses * 10.0).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Rate entry holding `offset`, pulses left in it to a tenth, and seconds
/// until the next pulse.
fn entry_position(entries: &[RateEntry], offset: f64) -> (usize, f64, f64) {
    let mut start = 0.0;
    for (index, entry) in entries.iter().enumerate() {
        let length = entry.duration().as_secs_f64();
        if offset < start + length || index + 1 == entries.len() {
            let elapsed = offset - start;
            let left = (length - elapsed).max(0.0);
            if entry.total_pulses == 0.0 {
                return (index, 0.0, left);
            }
            let between = entry.delay_between_pulses.as_secs_f64();
            let next = (elapsed / between - 0.5).ceil();
            let delay = (next + 0.5) * between - elapsed;
            let remaining = (left / between * 10.0 + 1e-9).floor() / 10.0;
            return (index, remaining, delay);
        }
        start += length;
    }
    (0, 0.0, 0.0)
}

/// `13 len [beeps] [entry index] [remaining tenths:2] [delay:4] [entries]`
#[derive(Debug, Clone, PartialEq)]
pub struct BasalScheduleExtra {
    /// Beep flags.
    pub beeps: BeepOptions,
    /// Entry delivering now.
    pub current_entry_index: u8,
    /// Pulses left in the current entry.
    pub remaining_pulses: f64,
    /// Time to the next pulse.
    pub delay_until_next_pulse: Duration,
    /// Whole schedule as rate entries.
    pub rate_entries: Vec<RateEntry>,
}

impl BasalScheduleExtra {
    /// Timing for `schedule` picked up `offset` into the day.
    ///
    /// Pulses are assumed to fall halfway through each pulse interval,
    /// counted from the start of the rate entry.
    pub fn for_schedule(
        schedule: &BasalSchedule,
        offset: Duration,
        beeps: BeepOptions,
        zero: ZeroBasalEncoding,
    ) -> Self {
        let rate_entries = schedule_rate_entries(schedule, zero);
        let (index, remaining_pulses, delay) = entry_position(&rate_entries, offset.as_secs_f64().round() % DAY_SECONDS);
        Self {
            beeps,
            current_entry_index: index as u8,
            remaining_pulses,
            delay_until_next_pulse: from_hundredths_of_ms(round_hundredths_of_ms(delay)),
            rate_entries,
        }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![
            BASAL_SCHEDULE_EXTRA_TAG,
            (8 + self.rate_entries.len() * RateEntry::LEN) as u8,
            self.beeps.encode(),
            self.current_entry_index,
        ];
        out.extend_from_slice(&tenths_of_pulses(self.remaining_pulses).to_be_bytes());
        out.extend_from_slice(&round_hundredths_of_ms(self.delay_until_next_pulse.as_secs_f64()).to_be_bytes());
        encode_entries(&mut out, &self.rate_entries);
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self {
            beeps: BeepOptions::decode(byte_at(block, 2)?),
            current_entry_index: byte_at(block, 3)?,
            remaining_pulses: f64::from(be_u16_at(block, 4)?) / 10.0,
            delay_until_next_pulse: from_hundredths_of_ms(be_u32_at(block, 6)?),
            rate_entries: decode_entries(block)?,
        })
    }
}

/// `16 len [beeps] 00 [remaining tenths:2] [delay:4] [entries]`
#[derive(Debug, Clone, PartialEq)]
pub struct TempBasalExtra {
    /// Beep flags.
    pub beeps: BeepOptions,
    /// Pulses in the first entry.
    pub remaining_pulses: f64,
    /// Time to the first pulse.
    pub delay_until_first_pulse: Duration,
    /// Rate entries for the whole temp basal.
    pub rate_entries: Vec<RateEntry>,
}

impl TempBasalExtra {
    /// Temp basal of `rate` U/h for `duration`.
    pub fn new(rate: f64, duration: Duration, beeps: BeepOptions, zero: ZeroBasalEncoding) -> Self {
        let rate_entries = RateEntry::make_entries(rate, duration, zero);
        let (remaining_pulses, delay_until_first_pulse) = rate_entries
            .first()
            .map(|e| (e.total_pulses, e.delay_between_pulses))
            .unwrap_or_default();
        Self {
            beeps,
            remaining_pulses,
            delay_until_first_pulse,
            rate_entries,
        }
    }

    /// Rate the entries program, in U/h.
    pub fn rate(&self) -> f64 {
        self.rate_entries.first().map(RateEntry::rate).unwrap_or(0.0)
    }

    /// Sum of the entry durations.
    pub fn duration(&self) -> Duration {
        self.rate_entries.iter().map(RateEntry::duration).sum()
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![
            TEMP_BASAL_EXTRA_TAG,
            (8 + self.rate_entries.len() * RateEntry::LEN) as u8,
            self.beeps.encode(),
            0,
        ];
        out.extend_from_slice(&tenths_of_pulses(self.remaining_pulses).to_be_bytes());
        out.extend_from_slice(&round_hundredths_of_ms(self.delay_until_first_pulse.as_secs_f64()).to_be_bytes());
        encode_entries(&mut out, &self.rate_entries);
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self {
            beeps: BeepOptions::decode(byte_at(block, 2)?),
            remaining_pulses: f64::from(be_u16_at(block, 4)?) / 10.0,
            delay_until_first_pulse: from_hundredths_of_ms(be_u32_at(block, 6)?),
            rate_entries: decode_entries(block)?,
        })
    }
}

/// `17 0d [beeps] [tenths:2] [delay:4] [extended tenths:2] [extended delay:4]`
#[derive(Debug, Clone, PartialEq)]
pub struct BolusExtra {
    /// Beep flags.
    pub beeps: BeepOptions,
    /// Immediate units.
    pub units: f64,
    /// Time between immediate pulses.
    pub time_between_pulses: Duration,
    /// Extended units; zero here.
    pub extended_units: f64,
    /// Time between extended pulses.
    pub time_between_extended_pulses: Duration,
}

impl BolusExtra {
    const LEN: u8 = 0x0d;

    /// Immediate bolus of `units`.
    pub fn new(units: f64, time_between_pulses: Duration, beeps: BeepOptions) -> Self {
        Self {
            beeps,
            units,
            time_between_pulses,
            extended_units: 0.0,
            time_between_extended_pulses: Duration::ZERO,
        }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![BOLUS_EXTRA_TAG, Self::LEN, self.beeps.encode()];
        out.extend_from_slice(&pulses_for(self.units).saturating_mul(10).to_be_bytes());
        out.extend_from_slice(&round_hundredths_of_ms(self.time_between_pulses.as_secs_f64()).to_be_bytes());
        out.extend_from_slice(&pulses_for(self.extended_units).saturating_mul(10).to_be_bytes());
        out.extend_from_slice(
            &round_hundredths_of_ms(self.time_between_extended_pulses.as_secs_f64()).to_be_bytes(),
        );
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self {
            beeps: BeepOptions::decode(byte_at(block, 2)?),
            units: f64::from(be_u16_at(block, 3)?) / 200.0,
            time_between_pulses: from_hundredths_of_ms(be_u32_at(block, 5)?),
            extended_units: f64::from(be_u16_at(block, 9)?) / 200.0,
            time_between_extended_pulses: from_hundredths_of_ms(be_u32_at(block, 11)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{bytes_to_hex, parse_hex};

    fn confidence() -> BeepOptions {
        BeepOptions::new(false, true, 0)
    }

    #[test]
    fn flat_schedule_timing() {
        let flat = BasalSchedule::new(&[(0, 1.0)]).unwrap();
        let cases = [
            (Duration::ZERO, "130e400012c00089544012c00112a880"),
            (Duration::from_secs(120), "130e400012b900e4e1c012c00112a880"),
            (Duration::from_secs(3 * 3600 + 46 * 60), "130e40000fce002dc6c012c00112a880"),
        ];
        for (offset, expected) in cases {
            let cmd = BasalScheduleExtra::for_schedule(&flat, offset, confidence(), ZeroBasalEncoding::ZeroPulses);
            assert_eq!(bytes_to_hex(&cmd.encode()), expected, "offset {:?}", offset);
        }
    }

    #[test]
    fn decodes_captured_basal_extra() {
        let cmd = BasalScheduleExtra::decode(&parse_hex("130e40001aea001e84803840005b8d80").unwrap()).unwrap();
        assert!(cmd.beeps.completion_beep);
        assert_eq!(cmd.beeps.program_reminder_minutes, 0);
        assert_eq!(cmd.current_entry_index, 0);
        assert_eq!(cmd.remaining_pulses, 689.0);
        assert_eq!(cmd.delay_until_next_pulse, Duration::from_secs(20));
        assert_eq!(cmd.rate_entries.len(), 1);
        assert_eq!(cmd.rate_entries[0].total_pulses, 1440.0);
        assert_eq!(cmd.rate_entries[0].delay_between_pulses, Duration::from_secs(60));
        assert_eq!(cmd.rate_entries[0].duration(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn multi_rate_schedule_entries() {
        let four = BasalSchedule::new(&[(0, 1.05), (510, 0.55), (540, 0.9), (1410, 1.15)]).unwrap();
        let cmd = BasalScheduleExtra::for_schedule(
            &four,
            Duration::from_secs_f64(2278.840_24),
            BeepOptions::default(),
            ZeroBasalEncoding::ZeroPulses,
        );
        let raw = bytes_to_hex(&cmd.encode());
        assert!(raw.starts_with("13200000"));
        assert!(raw.ends_with("06f901059449003701f360e80a3201312d00007300eed54d"));
        assert_eq!(cmd.current_entry_index, 0);

        let late = BasalScheduleExtra::for_schedule(
            &four,
            Duration::from_secs(23 * 3600 + 45 * 60),
            BeepOptions::default(),
            ZeroBasalEncoding::ZeroPulses,
        );
        assert_eq!(late.current_entry_index, 3);
        assert!(late.remaining_pulses <= 11.5);
    }

    #[test]
    fn temp_basal_extra_timing() {
        let fast = TempBasalExtra::new(30.0, Duration::from_secs(1800), BeepOptions::new(false, true, 60), ZeroBasalEncoding::ZeroPulses);
        assert_eq!(bytes_to_hex(&fast.encode()), "160e7c000bb8000927c00bb8000927c0");
        assert!((fast.rate() - 30.0).abs() < 1e-9);
        assert_eq!(fast.duration(), Duration::from_secs(1800));

        let zero = TempBasalExtra::new(0.0, Duration::from_secs(3600), BeepOptions::default(), ZeroBasalEncoding::ZeroPulses);
        assert_eq!(zero.rate(), 0.0);
        assert_eq!(zero.rate_entries.len(), 2);
        assert_eq!(zero.duration(), Duration::from_secs(3600));
        let back = TempBasalExtra::decode(&zero.encode()).unwrap();
        assert_eq!(back.remaining_pulses, 0.0);
        assert_eq!(back.rate_entries, zero.rate_entries);
    }

    #[test]
    fn temp_basal_split_differently_has_same_effect() {
        // same delivery as `fast` above, spread over two entries
        let split =
            TempBasalExtra::decode(&parse_hex("16147c0005dc000927c005dc000927c005dc000927c0").unwrap()).unwrap();
        let ours = TempBasalExtra::new(30.0, Duration::from_secs(1800), BeepOptions::new(false, true, 60), ZeroBasalEncoding::ZeroPulses);
        assert_ne!(split.encode(), ours.encode());
        assert_eq!(split.rate_entries.len(), 2);
        assert!((split.rate() - ours.rate()).abs() < 1e-9);
        assert_eq!(split.duration(), ours.duration());
        let pulses: f64 = split.rate_entries.iter().map(|e| e.total_pulses).sum();
        assert!((pulses - 300.0).abs() < 1e-9);
    }

    #[test]
    fn bolus_extra_commands() {
        let bolus = BolusExtra::new(30.0, Duration::from_secs(2), BeepOptions::new(false, true, 60));
        assert_eq!(bytes_to_hex(&bolus.encode()), "170d7c177000030d40000000000000");

        let prime = BolusExtra::new(2.6, Duration::from_secs(1), BeepOptions::default());
        assert_eq!(bytes_to_hex(&prime.encode()), "170d000208000186a0000000000000");

        let back = BolusExtra::decode(&prime.encode()).unwrap();
        assert!((back.units - 2.6).abs() < 1e-9);
        assert_eq!(back.time_between_pulses, Duration::from_secs(1));
        assert_eq!(back.extended_units, 0.0);
    }

    #[test]
    fn partial_rate_entries_are_rejected() {
        let raw = parse_hex("130d40001aea001e84803840005b8d").unwrap();
        assert!(matches!(BasalScheduleExtra::decode(&raw), Err(Error::InvalidData(_))));
    }
}
