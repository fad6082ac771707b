// libpump-rs/libpump/src/minimed/dose.rs

//! Insulin doses, as confirmed by pump history and as tracked while in flight.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Display;
use uuid::Uuid;

use super::events::{EventDetails, PumpEventType, TempBasalKind};
use super::history_page::TimestampedHistoryEvent;
use super::pump_model::PumpModel;

/// Temp basal deliveries are rounded down to whole pulses of this size.
const TEMP_BASAL_PULSE_UNITS: f64 = 0.05;

/// Kind of dose.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DoseKind {
    /// A bolus.
    #[display(fmt = "Bolus")]
    Bolus,
    /// A temp basal.
    #[display(fmt = "TempBasal")]
    TempBasal,
    /// Delivery suspended.
    #[display(fmt = "Suspend")]
    Suspend,
    /// Delivery resumed.
    #[display(fmt = "Resume")]
    Resume,
}

/// A dose read back from pump history.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DoseEvent {
    /// Kind of dose.
    pub kind: DoseKind,
    /// Start, UTC.
    pub start: DateTime<Utc>,
    /// End, UTC; equals `start` for suspend and resume.
    pub end: DateTime<Utc>,
    /// Programmed units for a bolus, U/h for a temp basal, zero otherwise.
    pub value: f64,
    /// Known once the pump can no longer change the record.
    pub delivered_units: Option<f64>,
    /// Raw bytes of the history record this came from.
    pub raw: Vec<u8>,
    /// The pump may still rewrite the record.
    pub is_mutable: bool,
}

impl DoseEvent {
    /// `end - start`.
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::zero())
}

/// Convert timestamped history into doses.
///
/// A temp basal is written as a rate record plus a duration record sharing
/// its timestamp; the pair becomes one dose keyed by the rate record's bytes.
/// Percent temp basals have no fixed rate and are skipped.
pub fn dose_events(
    events: &[TimestampedHistoryEvent],
    model: PumpModel,
    now: DateTime<Utc>,
) -> Vec<DoseEvent> {
    let mut doses = Vec::new();
    for (i, entry) in events.iter().enumerate() {
        let event = &entry.event;
        match (&event.event_type, &event.details) {
            (PumpEventType::BolusNormal, EventDetails::BolusNormal(bolus)) => {
                let duration = if bolus.duration.is_zero() {
                    model.bolus_delivery_time(bolus.programmed)
                } else {
                    bolus.duration
                };
                let is_mutable = entry.is_mutable(now);
                doses.push(DoseEvent {
                    kind: DoseKind::Bolus,
                    start: entry.date,
                    end: entry.date + to_delta(duration),
                    value: bolus.programmed,
                    delivered_units: (!is_mutable).then_some(bolus.amount),
                    raw: event.raw_data.clone(),
                    is_mutable,
                });
            }
            (
                PumpEventType::TempBasal,
                EventDetails::TempBasal {
                    kind: TempBasalKind::Absolute,
                    rate,
                },
            ) => {
                let Some(duration) = temp_basal_duration(events, i) else {
                    continue;
                };
                let end = entry.date + to_delta(duration);
                doses.push(DoseEvent {
                    kind: DoseKind::TempBasal,
                    start: entry.date,
                    end,
                    value: *rate,
                    delivered_units: None,
                    raw: event.raw_data.clone(),
                    is_mutable: end > now,
                });
            }
            (PumpEventType::Suspend, _) | (PumpEventType::Resume, _) => {
                let kind = if event.event_type == PumpEventType::Suspend {
                    DoseKind::Suspend
                } else {
                    DoseKind::Resume
                };
                doses.push(DoseEvent {
                    kind,
                    start: entry.date,
                    end: entry.date,
                    value: 0.0,
                    delivered_units: None,
                    raw: event.raw_data.clone(),
                    is_mutable: false,
                });
            }
            _ => {}
        }
    }
    doses
}

/// The duration record written next to the rate record at `index`.
fn temp_basal_duration(events: &[TimestampedHistoryEvent], index: usize) -> Option<Duration> {
    let date = events[index].date;
    let neighbours = [index.checked_sub(1), index.checked_add(1)];
    neighbours
        .into_iter()
        .flatten()
        .filter_map(|i| events.get(i))
        .filter(|e| e.date == date)
        .find_map(|e| match e.event.details {
            EventDetails::TempBasalDuration { duration } => Some(duration),
            _ => None,
        })
}

/// A dose commanded by this host that history has not yet fully confirmed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnfinalizedDose {
    /// Kind of dose.
    pub kind: DoseKind,
    /// Units for a bolus or temp basal; updated to the delivered amount once known.
    pub units: f64,
    /// What was asked for, kept once `units` no longer says so.
    pub programmed_units: Option<f64>,
    /// Temp basal rate asked for, kept after a cancel.
    pub programmed_temp_rate: Option<f64>,
    /// When the command was accepted.
    pub start_time: DateTime<Utc>,
    /// Scheduled length; shortened by a cancel.
    pub duration: Duration,
    /// History has confirmed the dose.
    pub is_reconciled_with_history: bool,
    /// Stable identity for callers.
    pub uuid: Uuid,
}

impl UnfinalizedDose {
    fn with(kind: DoseKind, units: f64, start_time: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            kind,
            units,
            programmed_units: None,
            programmed_temp_rate: None,
            start_time,
            duration,
            is_reconciled_with_history: false,
            uuid: Uuid::new_v4(),
        }
    }

    /// A bolus of `units` spread over `duration`.
    pub fn bolus(units: f64, start_time: DateTime<Utc>, duration: Duration) -> Self {
        Self::with(DoseKind::Bolus, units, start_time, duration)
    }

    /// A temp basal of `rate` U/h.
    pub fn temp_basal(rate: f64, start_time: DateTime<Utc>, duration: Duration) -> Self {
        let hours = duration.as_secs_f64() / 3600.0;
        Self::with(DoseKind::TempBasal, rate * hours, start_time, duration)
    }

    /// A suspend at `start_time`.
    pub fn suspend(start_time: DateTime<Utc>) -> Self {
        Self::with(DoseKind::Suspend, 0.0, start_time, Duration::ZERO)
    }

    /// A resume at `start_time`.
    pub fn resume(start_time: DateTime<Utc>) -> Self {
        Self::with(DoseKind::Resume, 0.0, start_time, Duration::ZERO)
    }

    /// Scheduled end.
    pub fn finish_time(&self) -> DateTime<Utc> {
        self.start_time + to_delta(self.duration)
    }

    /// Fraction delivered at `now`, between 0 and 1.
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = (now - self.start_time).num_milliseconds() as f64 / 1000.0;
        (elapsed / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// The scheduled end has passed.
    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.progress(now) >= 1.0
    }

    /// Units per hour over the dose's duration.
    pub fn rate(&self) -> f64 {
        let hours = self.duration.as_secs_f64() / 3600.0;
        if hours > 0.0 { self.units / hours } else { 0.0 }
    }

    /// Delivered units once the dose has finished.
    pub fn finalized_units(&self, now: DateTime<Utc>) -> Option<f64> {
        self.is_finished(now).then_some(self.units)
    }

    /// What the host asked for, for matching against history.
    pub fn programmed_value(&self) -> f64 {
        match self.kind {
            DoseKind::Bolus => self.programmed_units.unwrap_or(self.units),
            DoseKind::TempBasal => self.programmed_temp_rate.unwrap_or_else(|| self.rate()),
            DoseKind::Suspend | DoseKind::Resume => 0.0,
        }
    }

    /// Stop the dose at `at`, keeping the delivered share.
    pub fn cancel(&mut self, at: DateTime<Utc>) {
        if at >= self.finish_time() {
            return;
        }
        let rate = self.rate();
        let elapsed = (at - self.start_time).to_std().unwrap_or(Duration::ZERO);
        let hours = elapsed.as_secs_f64() / 3600.0;
        self.programmed_units = Some(self.units);
        match self.kind {
            DoseKind::Bolus => self.units = rate * hours,
            DoseKind::TempBasal => {
                self.programmed_temp_rate = Some(rate);
                self.units = (rate * hours / TEMP_BASAL_PULSE_UNITS).floor() * TEMP_BASAL_PULSE_UNITS;
            }
            DoseKind::Suspend | DoseKind::Resume => {}
        }
        self.duration = elapsed;
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

impl fmt::Display for UnfinalizedDose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DoseKind::Bolus => write!(
                f,
                "Bolus units:{} {}",
                self.programmed_units.unwrap_or(self.units),
                self.start_time
            ),
            DoseKind::TempBasal => write!(
                f,
                "TempBasal rate:{} {} duration:{}s",
                self.programmed_temp_rate.unwrap_or_else(|| self.rate()),
                self.start_time,
                self.duration.as_secs()
            ),
            kind => write!(f, "{} {}", kind, self.start_time),
        }
    }
}
