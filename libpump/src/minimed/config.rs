// libpump-rs/libpump/src/minimed/config.rs

//! Minimed session configuration

use std::time::Duration;

pub use crate::constants::STANDARD_PUMP_RESPONSE_WINDOW_MS;

/// Retries for a normal command exchange.
pub const COMMAND_RETRY_COUNT: u8 = 3;

/// Listen window while the pump wakes from the short power-on burst.
pub const WAKE_LISTEN_TIMEOUT_MS: u32 = 12_000;

/// Repeats of the short power-on probe (the bridge caps this at 255).
pub const WAKE_BURST_REPEATS: u8 = 200;

/// How long the pump is asked to keep its radio on.
pub const DEFAULT_AWAKE_MINUTES: u8 = 1;

/// The pump stays awake about this long past the last exchange.
pub const AWAKE_EXTENSION: Duration = Duration::from_secs(60);

/// Minimum time between two full wake attempts.
pub const MIN_TIME_BETWEEN_WAKE_ATTEMPTS: Duration = Duration::from_secs(60);

/// Probes sent on each candidate frequency while tuning.
pub const TUNE_TRIES_PER_FREQUENCY: u32 = 3;

/// RSSI assigned to a probe that got no answer.
pub const TUNE_FAILURE_RSSI: i32 = -99;

/// Temp basal set and verify attempts.
pub const TEMP_BASAL_ATTEMPTS: usize = 3;

/// Oldest history page the pump keeps.
pub const MAX_HISTORY_PAGE: u8 = 15;

/// Glucose pages read back from the current one.
pub const GLUCOSE_PAGE_LOOKBACK: u32 = 15;

/// Tolerance when matching a history event to a commanded dose.
pub const RECONCILE_WINDOW: Duration = Duration::from_secs(2 * 60);

const NORTH_AMERICA_MHZ: [f64; 8] = [
    916.45, 916.50, 916.55, 916.60, 916.65, 916.70, 916.75, 916.80,
];
const WORLD_WIDE_MHZ: [f64; 9] = [
    868.25, 868.30, 868.35, 868.40, 868.45, 868.50, 868.55, 868.60, 868.65,
];

/// Radio band the pump was sold for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PumpRegion {
    /// 916.5 MHz band.
    #[default]
    NorthAmerica,
    /// 868 MHz band.
    WorldWide,
}

impl PumpRegion {
    /// Candidate frequencies scanned when tuning, in MHz.
    pub fn scan_frequencies(self) -> &'static [f64] {
        match self {
            PumpRegion::NorthAmerica => &NORTH_AMERICA_MHZ,
            PumpRegion::WorldWide => &WORLD_WIDE_MHZ,
        }
    }

    /// The frequency the radio returns to when a scan finds nothing.
    pub fn middle_frequency(self) -> f64 {
        let f = self.scan_frequencies();
        f[f.len() / 2]
    }
}

/// Overridable session knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// How long to wait for a reply, in ms.
    pub response_window_ms: u32,
    /// Sends per command before giving up.
    pub retry_count: u8,
    /// Listen time after a wake burst, in ms.
    pub wake_listen_timeout_ms: u32,
    /// Power-on packets in a wake burst.
    pub wake_burst_repeats: u8,
    /// Minutes the pump keeps its radio on after a wake.
    pub awake_minutes: u8,
    /// Tries per frequency when tuning.
    pub tune_tries: u32,
    /// Attempts at setting a temp basal.
    pub temp_basal_attempts: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            response_window_ms: STANDARD_PUMP_RESPONSE_WINDOW_MS,
            retry_count: COMMAND_RETRY_COUNT,
            wake_listen_timeout_ms: WAKE_LISTEN_TIMEOUT_MS,
            wake_burst_repeats: WAKE_BURST_REPEATS,
            awake_minutes: DEFAULT_AWAKE_MINUTES,
            tune_tries: TUNE_TRIES_PER_FREQUENCY,
            temp_basal_attempts: TEMP_BASAL_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_tables() {
        let na = PumpRegion::NorthAmerica.scan_frequencies();
        assert_eq!(na.len(), 8);
        assert_eq!(na[0], 916.45);
        assert_eq!(PumpRegion::NorthAmerica.middle_frequency(), 916.65);
        let ww = PumpRegion::WorldWide.scan_frequencies();
        assert_eq!(ww.len(), 9);
        assert_eq!(PumpRegion::WorldWide.middle_frequency(), 868.45);
    }

    #[test]
    fn default_settings() {
        let s = SessionSettings::default();
        assert_eq!(s.response_window_ms, 180);
        assert_eq!(s.wake_burst_repeats, 200);
        assert_eq!(s.wake_listen_timeout_ms, 12_000);
    }
}
