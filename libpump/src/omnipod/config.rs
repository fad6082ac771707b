// libpump-rs/libpump/src/omnipod/config.rs

//! Pod constants and session configuration

use std::time::Duration;

pub use crate::constants::{POD_MAX_PACKET_PAYLOAD, POD_PULSE_SIZE};
use crate::omnipod::alert::{Alert, AlertConfiguration, AlertTrigger, BeepRepeat, BeepType};
use crate::omnipod::schedule::ZeroBasalEncoding;

/// Pulses per unit of insulin.
pub const PULSES_PER_UNIT: f64 = 1.0 / POD_PULSE_SIZE;

/// Immediate bolus delivery speed, units per second.
pub const BOLUS_DELIVERY_RATE: f64 = 0.025;

/// Seconds between pulses of an immediate bolus.
pub const SECONDS_PER_BOLUS_PULSE: f64 = 2.0;

/// Seconds between pulses while priming or inserting the cannula.
pub const SECONDS_PER_PRIME_PULSE: f64 = 1.0;

/// Units the prime delivers.
pub const PRIME_UNITS: f64 = 2.6;
/// Units the cannula insertion delivers.
pub const CANNULA_INSERTION_UNITS: f64 = 0.5;

/// Extra wait after the prime pulses before the cannula may be inserted.
pub const PRIME_SETTLE_TIME: Duration = Duration::from_secs(3);

/// Largest single bolus the pod accepts.
pub const MAX_BOLUS_UNITS: f64 = 30.0;

/// Highest temp basal rate, units per hour.
pub const MAX_TEMP_BASAL_RATE: f64 = 30.0;

/// Longest temp basal.
pub const MAX_TEMP_BASAL_DURATION: Duration = Duration::from_secs(12 * 3600);

/// Reservoir readings above this many units are reported as "above 50".
pub const MAX_RESERVOIR_READING: f64 = 50.0;

/// Rate used for timing when a zero rate cannot be encoded as zero pulses.
pub const NEAR_ZERO_BASAL_RATE: f64 = 0.01;

/// Delay used by zero-pulse and near-zero rate entries.
pub const MAX_TIME_BETWEEN_PULSES: Duration = Duration::from_secs(5 * 3600);

/// Marks a rate entry's delay as a near-zero rate.
pub const NEAR_ZERO_BASAL_RATE_FLAG: u32 = 0x8000_0000;

/// Pods warn one minute short of three days.
pub const SOFT_EXPIRATION: Duration = Duration::from_secs(72 * 3600 - 60);

/// Pods stop delivering one minute short of 79 hours.
pub const HARD_EXPIRATION: Duration = Duration::from_secs(79 * 3600 - 60);

/// Advisory shown this long after activation.
pub const EXPIRATION_ADVISORY: Duration = Duration::from_secs(68 * 3600);

/// Reservoir level that raises the low reservoir alert, in units.
pub const LOW_RESERVOIR_UNITS: f64 = 20.0;

/// Pairing addresses are `0x1f000000` with random low 20 bits.
pub const PAIRING_ADDRESS_PREFIX: u32 = 0x1f00_0000;
/// Random part of a pairing address.
pub const PAIRING_ADDRESS_MASK: u32 = 0x000f_ffff;

/// Packet timeout byte sent with the setup command.
pub const SETUP_PACKET_TIMEOUT: u8 = 0x04;

/// Listen window for one pod packet exchange, in milliseconds.
pub const PACKET_RESPONSE_WINDOW_MS: u32 = 165;

/// Listen window while an exchange is being acked until quiet.
pub const ACK_QUIET_WINDOW_MS: u32 = 600;

/// Repeats of the final ack.
pub const ACK_QUIET_REPEATS: u8 = 5;

/// Repeats of the ack asking for the next continuation packet.
pub const CON_ACK_REPEATS: u8 = 3;

/// Give up on a packet exchange after this long without a valid reply.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Retries per packet send.
pub const PACKET_RETRY_COUNT: u8 = 3;

/// Radio frequency pods listen on, in MHz.
pub const POD_FREQUENCY_MHZ: f64 = 433.91;

/// Overridable pod session knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct PodSettings {
    /// Listen window per packet, in ms.
    pub response_window_ms: u32,
    /// Sends per packet before giving up.
    pub retry_count: u8,
    /// Give up on an exchange after this long.
    pub exchange_timeout: Duration,
    /// Listen window while acking until quiet, in ms.
    pub ack_quiet_window_ms: u32,
    /// Beep when a bolus or temp basal command is acknowledged.
    pub acknowledgement_beeps: bool,
    /// Beep when a bolus or temp basal finishes.
    pub completion_beeps: bool,
    /// Minutes between program reminder beeps, 0 disables.
    pub program_reminder_minutes: u8,
    /// Level for the low reservoir alert.
    pub low_reservoir_units: f64,
    /// How temp basals of zero are encoded.
    pub zero_basal_encoding: ZeroBasalEncoding,
}

impl Default for PodSettings {
    fn default() -> Self {
        Self {
            response_window_ms: PACKET_RESPONSE_WINDOW_MS,
            retry_count: PACKET_RETRY_COUNT,
            exchange_timeout: EXCHANGE_TIMEOUT,
            ack_quiet_window_ms: ACK_QUIET_WINDOW_MS,
            acknowledgement_beeps: false,
            completion_beeps: false,
            program_reminder_minutes: 0,
            low_reservoir_units: LOW_RESERVOIR_UNITS,
            zero_basal_encoding: ZeroBasalEncoding::default(),
        }
    }
}

// ---- alert presets ----

/// Reservoir warning at `units` remaining.
pub fn low_reservoir_alert(units: f64) -> AlertConfiguration {
    AlertConfiguration::new(
        Alert::LowReservoir,
        true,
        Duration::ZERO,
        AlertTrigger::UnitsRemaining(units),
        BeepRepeat::Every1MinuteFor3MinutesAndRepeatEvery60Minutes,
        BeepType::BipBeepBipBeepBipBeepBipBeep,
    )
}

/// Nags if setup stalls between priming and cannula insertion.
pub fn setup_reminder_alert() -> AlertConfiguration {
    AlertConfiguration::new(
        Alert::TimerLimit,
        true,
        Duration::from_secs(55 * 60),
        AlertTrigger::TimeUntilAlert(Duration::from_secs(5 * 60)),
        BeepRepeat::Every1MinuteFor15Minutes,
        BeepType::BeeepBeeep,
    )
}

/// Silent advisory `after` from now.
pub fn expiration_advisory_alert(after: Duration) -> AlertConfiguration {
    AlertConfiguration::new(
        Alert::ExpirationAdvisory,
        false,
        Duration::ZERO,
        AlertTrigger::TimeUntilAlert(after),
        BeepRepeat::Every1MinuteFor15Minutes,
        BeepType::BipBip,
    )
}

/// Audible warnings at soft expiration and shortly before the pod shuts down.
pub fn expiration_alerts(until_soft: Duration, until_hard: Duration) -> [AlertConfiguration; 2] {
    [
        AlertConfiguration::new(
            Alert::ExpirationAlert,
            true,
            Duration::from_secs(164 * 60),
            AlertTrigger::TimeUntilAlert(until_soft),
            BeepRepeat::Every1MinuteFor15Minutes,
            BeepType::BeepBeepBeep,
        ),
        AlertConfiguration::new(
            Alert::TimerLimit,
            true,
            Duration::ZERO,
            AlertTrigger::TimeUntilAlert(until_hard),
            BeepRepeat::Every1MinuteFor15Minutes,
            BeepType::Beeeeeep,
        ),
    ]
}

/// Round `units` down to whole pulses, forgiving float noise just below a pulse.
pub fn round_to_pulses(units: f64) -> f64 {
    (units * PULSES_PER_UNIT + 1e-6).floor() / PULSES_PER_UNIT
}

/// Whole pulses for `units`, rounding to the nearest pulse.
pub fn pulses_for(units: f64) -> u16 {
    (units * PULSES_PER_UNIT).round().clamp(0.0, f64::from(u16::MAX)) as u16
}
