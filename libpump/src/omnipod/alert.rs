// libpump-rs/libpump/src/omnipod/alert.rs

//! Pod alerts and the beeps that announce them.

use std::fmt;
use std::time::Duration;

use derive_more::Display;

use crate::constants::POD_PULSE_SIZE;
use crate::protocol::parser::{be_u16_at, ensure_len};
use crate::{Error, Result};

/// The eight alert slots of a pod.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Alert {
    /// Slot 0: pod left idle too long.
    #[display(fmt = "auto-off")]
    AutoOff,
    /// Slot 1, never configured.
    #[display(fmt = "unused")]
    Unused,
    /// "Change pod now" advisory.
    #[display(fmt = "expiration advisory")]
    ExpirationAdvisory,
    /// Slot 3: pod life ended.
    #[display(fmt = "expiration")]
    ExpirationAlert,
    /// Slot 4: reservoir below the set level.
    #[display(fmt = "low reservoir")]
    LowReservoir,
    /// Slot 5: suspend reminder.
    #[display(fmt = "suspend in progress")]
    SuspendInProgress,
    /// Slot 6: suspend is over.
    #[display(fmt = "suspend ended")]
    SuspendEnded,
    /// Slot 7: programming timer ran out.
    #[display(fmt = "timer limit")]
    TimerLimit,
}

impl Alert {
    /// Every slot, in slot order.
    pub const ALL: [Alert; 8] = [
        Self::AutoOff,
        Self::Unused,
        Self::ExpirationAdvisory,
        Self::ExpirationAlert,
        Self::LowReservoir,
        Self::SuspendInProgress,
        Self::SuspendEnded,
        Self::TimerLimit,
    ];

    /// Slot number, 0..=7.
    pub fn slot(self) -> u8 {
        self as u8
    }

    /// Alert in `slot`.
    pub fn from_slot(slot: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(slot))
            .copied()
            .ok_or(Error::UnknownValue {
                value: slot,
                what: "alert slot",
            })
    }

    /// Bit of the slot in an [`AlertSet`].
    pub fn mask(self) -> u8 {
        1 << self.slot()
    }
}

/// Set of alerts as the pod reports and acknowledges them, one bit per slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlertSet(u8);

impl AlertSet {
    /// No alerts.
    pub const NONE: AlertSet = AlertSet(0);

    /// From the raw mask.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw mask.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// `alert` is in the set.
    pub fn contains(self, alert: Alert) -> bool {
        self.0 & alert.mask() != 0
    }

    /// Add `alert`.
    pub fn insert(&mut self, alert: Alert) {
        self.0 |= alert.mask();
    }

    /// No alert set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Alerts in slot order.
    pub fn iter(self) -> impl Iterator<Item = Alert> {
        Alert::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl FromIterator<Alert> for AlertSet {
    fn from_iter<I: IntoIterator<Item = Alert>>(iter: I) -> Self {
        let mut set = Self::NONE;
        for alert in iter {
            set.insert(alert);
        }
        set
    }
}

impl fmt::Display for AlertSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no alerts");
        }
        let names: Vec<String> = self.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Beep patterns. Codes 0..=8 are used by alerts; cancel and beep-config
/// commands also accept the high codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BeepType {
    /// Code 0x0.
    NoBeep,
    /// Code 0x1.
    BeepBeepBeepBeep,
    /// Code 0x2.
    BipBeepBipBeepBipBeepBipBeep,
    /// Code 0x3.
    BipBip,
    /// Code 0x4.
    Beep,
    /// Code 0x5.
    BeepBeepBeep,
    /// Code 0x6.
    Beeeeeep,
    /// Code 0x7.
    BipBipBipbipBipBip,
    /// Code 0x8.
    BeeepBeeep,
    /// Code 0xb.
    BeepBeep,
    /// Code 0xc.
    Beeep,
    /// Code 0xd.
    BipBeeeeep,
    /// Code 0xe.
    FiveSecondBeep,
    /// Leaves the configured beep untouched in a beep-config command.
    BeepConfigNoBeep,
}

const BEEP_CODES: &[(u8, BeepType)] = &[
    (0x0, BeepType::NoBeep),
    (0x1, BeepType::BeepBeepBeepBeep),
    (0x2, BeepType::BipBeepBipBeepBipBeepBipBeep),
    (0x3, BeepType::BipBip),
    (0x4, BeepType::Beep),
    (0x5, BeepType::BeepBeepBeep),
    (0x6, BeepType::Beeeeeep),
    (0x7, BeepType::BipBipBipbipBipBip),
    (0x8, BeepType::BeeepBeeep),
    (0xb, BeepType::BeepBeep),
    (0xc, BeepType::Beeep),
    (0xd, BeepType::BipBeeeeep),
    (0xe, BeepType::FiveSecondBeep),
    (0xf, BeepType::BeepConfigNoBeep),
];

impl BeepType {
    /// Four-bit code.
    pub fn code(self) -> u8 {
        BEEP_CODES
            .iter()
            .find(|(_, b)| *b == self)
            .map(|(c, _)| *c)
            .unwrap_or(0)
    }

    /// Decode a four-bit code.
    pub fn from_code(code: u8) -> Result<Self> {
        BEEP_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, b)| *b)
            .ok_or(Error::UnknownValue {
                value: code,
                what: "beep type",
            })
    }
}

/// How often an alert repeats its beep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BeepRepeat {
    /// Code 0.
    Once,
    /// Code 1.
    Every1MinuteFor3MinutesAndRepeatEvery60Minutes,
    /// Code 2.
    Every1MinuteFor15Minutes,
    /// Code 3.
    Every1MinuteFor3MinutesAndRepeatEvery15Minutes,
    /// Code 4.
    Every3MinutesFor60MinutesStartingAt2Minutes,
    /// Code 5.
    Every60Minutes,
    /// Code 6.
    Every15Minutes,
    /// Code 7.
    Every15MinutesFor60MinutesStartingAt14Minutes,
    /// Code 8.
    Every5Minutes,
}

impl BeepRepeat {
    const ALL: [BeepRepeat; 9] = [
        Self::Once,
        Self::Every1MinuteFor3MinutesAndRepeatEvery60Minutes,
        Self::Every1MinuteFor15Minutes,
        Self::Every1MinuteFor3MinutesAndRepeatEvery15Minutes,
        Self::Every3MinutesFor60MinutesStartingAt2Minutes,
        Self::Every60Minutes,
        Self::Every15Minutes,
        Self::Every15MinutesFor60MinutesStartingAt14Minutes,
        Self::Every5Minutes,
    ];

    /// Wire value.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire value.
    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(Error::UnknownValue {
                value: code,
                what: "beep repeat",
            })
    }
}

/// What makes an alert fire.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlertTrigger {
    /// Reservoir falls to this many units.
    UnitsRemaining(f64),
    /// This long after the command is accepted.
    TimeUntilAlert(Duration),
}

/// One six-byte alert slot configuration.
///
/// `[slot<<4 | audible<<3 | reservoir<<2 | auto_off<<1 | duration>>8]
/// [duration & 0xff][trigger:2][beep_repeat][beep_type]`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlertConfiguration {
    /// Slot being configured.
    pub alert: Alert,
    /// Beep when active.
    pub audible: bool,
    /// Counts against the auto-off timer.
    pub auto_off_modifier: bool,
    /// How long the alert stays active, minute resolution.
    pub duration: Duration,
    /// Reservoir level or timer.
    pub trigger: AlertTrigger,
    /// Repeat pattern.
    pub beep_repeat: BeepRepeat,
    /// Beep pattern.
    pub beep_type: BeepType,
}

impl AlertConfiguration {
    /// Encoded length.
    pub const LEN: usize = 6;

    /// Configuration without the auto-off modifier.
    pub fn new(
        alert: Alert,
        audible: bool,
        duration: Duration,
        trigger: AlertTrigger,
        beep_repeat: BeepRepeat,
        beep_type: BeepType,
    ) -> Self {
        Self {
            alert,
            audible,
            auto_off_modifier: false,
            duration,
            trigger,
            beep_repeat,
            beep_type,
        }
    }

    /// Set the auto-off modifier.
    pub fn with_auto_off_modifier(mut self) -> Self {
        self.auto_off_modifier = true;
        self
    }

    /// Six wire bytes.
    pub fn encode(&self) -> [u8; Self::LEN] {
        let minutes = (self.duration.as_secs() / 60).min(0x1ff) as u16;
        let mut first = self.alert.slot() << 4;
        if self.audible {
            first |= 1 << 3;
        }
        if matches!(self.trigger, AlertTrigger::UnitsRemaining(_)) {
            first |= 1 << 2;
        }
        if self.auto_off_modifier {
            first |= 1 << 1;
        }
        first |= ((minutes >> 8) & 0x01) as u8;
        let trigger = match self.trigger {
            // one tick is two pulses
            AlertTrigger::UnitsRemaining(units) => (units / POD_PULSE_SIZE / 2.0) as u16,
            AlertTrigger::TimeUntilAlert(t) => (t.as_secs() / 60) as u16,
        };
        let [t_hi, t_lo] = trigger.to_be_bytes();
        [
            first,
            (minutes & 0xff) as u8,
            t_hi,
            t_lo,
            self.beep_repeat.code(),
            self.beep_type.code(),
        ]
    }

    /// Parse six bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, Self::LEN)?;
        let alert = Alert::from_slot(data[0] >> 4)?;
        let minutes = (u64::from(data[0] & 0x01) << 8) | u64::from(data[1]);
        let raw = be_u16_at(data, 2)? & 0x3fff;
        let trigger = if data[0] & 0b100 != 0 {
            AlertTrigger::UnitsRemaining(f64::from(raw) * 2.0 * POD_PULSE_SIZE)
        } else {
            AlertTrigger::TimeUntilAlert(Duration::from_secs(u64::from(raw) * 60))
        };
        Ok(Self {
            alert,
            audible: data[0] & 0b1000 != 0,
            auto_off_modifier: data[0] & 0b10 != 0,
            duration: Duration::from_secs(minutes * 60),
            trigger,
            beep_repeat: BeepRepeat::from_code(data[4])?,
            beep_type: BeepType::from_code(data[5])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_set_bits() {
        let set = AlertSet::from_bits(0x10);
        assert!(set.contains(Alert::LowReservoir));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Alert::LowReservoir]);
        assert_eq!(set.to_string(), "low reservoir");
        let both: AlertSet = [Alert::AutoOff, Alert::TimerLimit].into_iter().collect();
        assert_eq!(both.bits(), 0x81);
        assert_eq!(AlertSet::NONE.to_string(), "no alerts");
    }

    #[test]
    fn beep_codes() {
        assert_eq!(BeepType::Beeeeeep.code(), 6);
        assert_eq!(BeepType::BeepConfigNoBeep.code(), 0xf);
        assert_eq!(BeepType::from_code(0xb).unwrap(), BeepType::BeepBeep);
        assert!(BeepType::from_code(0x9).is_err());
        assert!(BeepRepeat::from_code(9).is_err());
    }

    #[test]
    fn low_reservoir_configuration() {
        let config = AlertConfiguration::new(
            Alert::LowReservoir,
            true,
            Duration::ZERO,
            AlertTrigger::UnitsRemaining(20.0),
            BeepRepeat::Every1MinuteFor3MinutesAndRepeatEvery60Minutes,
            BeepType::BipBeepBipBeepBipBeepBipBeep,
        );
        assert_eq!(config.encode(), [0x4c, 0x00, 0x00, 0xc8, 0x01, 0x02]);
        assert_eq!(AlertConfiguration::decode(&config.encode()).unwrap(), config);
    }

    #[test]
    fn long_durations_use_the_high_bit() {
        let config = AlertConfiguration::new(
            Alert::TimerLimit,
            true,
            Duration::from_secs(300 * 60),
            AlertTrigger::TimeUntilAlert(Duration::from_secs(5 * 60)),
            BeepRepeat::Every15Minutes,
            BeepType::BeeepBeeep,
        )
        .with_auto_off_modifier();
        let raw = config.encode();
        assert_eq!(raw[0], 0x7b);
        assert_eq!(raw[1], (300u16 - 256) as u8);
        let back = AlertConfiguration::decode(&raw).unwrap();
        assert_eq!(back.duration, Duration::from_secs(300 * 60));
        assert!(back.auto_off_modifier);
    }
}
