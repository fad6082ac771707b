// libpump-rs/libpump/src/minimed/state.rs

//! State carried between Minimed sessions.
//!
//! Sessions borrow these records mutably and leave them updated; persisting
//! them between runs is up to the caller (see `to_blob`/`from_blob` under the
//! `serde` feature).

use chrono::{DateTime, FixedOffset, Offset, TimeDelta, Utc};

use super::config::PumpRegion;
use super::pump_model::PumpModel;
use crate::types::PumpId;

/// What the session knows about one pump.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PumpState {
    /// Serial number.
    pub pump_id: PumpId,
    /// Radio band.
    pub region: PumpRegion,
    /// Offset of the pump clock from UTC, in seconds.
    pub utc_offset_seconds: i32,
    /// Cached once the pump has answered `GetPumpModel`.
    pub pump_model: Option<PumpModel>,
    /// Radio is on until this time.
    pub awake_until: Option<DateTime<Utc>>,
    /// Last wake burst sent.
    pub last_wake_attempt: Option<DateTime<Utc>>,
    /// Time of the last history read, used as the next walk's start.
    pub last_history_read: Option<DateTime<Utc>>,
}

impl PumpState {
    /// State for a pump never talked to.
    pub fn new(pump_id: PumpId, region: PumpRegion, time_zone: FixedOffset) -> Self {
        Self {
            pump_id,
            region,
            utc_offset_seconds: time_zone.local_minus_utc(),
            pump_model: None,
            awake_until: None,
            last_wake_attempt: None,
            last_history_read: None,
        }
    }

    /// The pump's fixed time zone. Out-of-range offsets fall back to UTC.
    pub fn time_zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or(Utc.fix())
    }

    /// Set the pump clock offset.
    pub fn set_time_zone(&mut self, zone: FixedOffset) {
        self.utc_offset_seconds = zone.local_minus_utc();
    }

    /// Radio still on at `now`.
    pub fn is_awake(&self, now: DateTime<Utc>) -> bool {
        self.awake_until.is_some_and(|until| until > now)
    }

    pub(crate) fn mark_awake_for(&mut self, now: DateTime<Utc>, duration: TimeDelta) {
        self.awake_until = Some(now + duration);
    }

    /// Forget the wake window, e.g. after the pump stopped answering.
    pub fn mark_asleep(&mut self) {
        self.awake_until = None;
    }

    /// JSON blob for persisting.
    #[cfg(feature = "serde")]
    pub fn to_blob(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore from [`Self::to_blob`].
    #[cfg(feature = "serde")]
    pub fn from_blob(blob: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(blob)?)
    }
}

/// Radio bridge state: what frequency last worked and when it was found.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceState {
    /// When the last scan ran.
    pub last_tuned: Option<DateTime<Utc>>,
    /// Frequency found by the last scan.
    pub last_valid_frequency: Option<f64>,
}

impl DeviceState {
    /// JSON blob for persisting.
    #[cfg(feature = "serde")]
    pub fn to_blob(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore from [`Self::to_blob`].
    #[cfg(feature = "serde")]
    pub fn from_blob(blob: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(blob)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn state() -> PumpState {
        PumpState::new(
            PumpId::from_bytes([0x35, 0x05, 0x35]),
            PumpRegion::NorthAmerica,
            FixedOffset::west_opt(4 * 3600).unwrap(),
        )
    }

    #[test]
    fn time_zone_round_trip() {
        let s = state();
        assert_eq!(s.utc_offset_seconds, -14_400);
        assert_eq!(s.time_zone(), FixedOffset::west_opt(4 * 3600).unwrap());
    }

    #[test]
    fn bogus_offset_falls_back_to_utc() {
        let mut s = state();
        s.utc_offset_seconds = 90_000;
        assert_eq!(s.time_zone().local_minus_utc(), 0);
    }

    #[test]
    fn awake_window() {
        let now = Utc.with_ymd_and_hms(2022, 9, 11, 3, 0, 0).unwrap();
        let mut s = state();
        assert!(!s.is_awake(now));
        s.mark_awake_for(now, TimeDelta::minutes(1));
        assert!(s.is_awake(now + TimeDelta::seconds(59)));
        assert!(!s.is_awake(now + TimeDelta::seconds(60)));
        s.mark_asleep();
        assert!(!s.is_awake(now));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn blob_round_trip() {
        let mut s = state();
        s.pump_model = Some(PumpModel::MODEL_523);
        let blob = s.to_blob().unwrap();
        assert_eq!(PumpState::from_blob(&blob).unwrap(), s);

        let d = DeviceState {
            last_tuned: Some(Utc.with_ymd_and_hms(2022, 9, 11, 3, 0, 0).unwrap()),
            last_valid_frequency: Some(916.6),
        };
        assert_eq!(DeviceState::from_blob(&d.to_blob().unwrap()).unwrap(), d);
    }
}
