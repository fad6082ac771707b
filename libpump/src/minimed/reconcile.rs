// libpump-rs/libpump/src/minimed/reconcile.rs

//! Matching locally commanded doses against confirmed pump history.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use uuid::Uuid;

use super::config::RECONCILE_WINDOW;
use super::dose::{DoseEvent, DoseKind, UnfinalizedDose};

/// Values closer than this are the same programmed dose.
const VALUE_TOLERANCE: f64 = 0.001;

/// Links one history record to the commanded dose it confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReconciledDoseMapping {
    /// Start of the commanded dose.
    pub start_time: DateTime<Utc>,
    /// Identity of the commanded dose.
    pub uuid: Uuid,
    /// Raw history record that confirmed it.
    pub event_raw: Vec<u8>,
}

/// Mappings keyed by the raw bytes of the history record.
pub type ReconciliationMappings = HashMap<Vec<u8>, ReconciledDoseMapping>;

/// Output of [`reconcile_pending_doses`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    /// Doses history has not yet confirmed.
    pub pending_doses: Vec<UnfinalizedDose>,
    /// Confirmed links, old and new.
    pub reconciliation_mappings: ReconciliationMappings,
    /// History not attributable to any commanded dose.
    pub remaining_events: Vec<DoseEvent>,
}

fn matches(dose: &UnfinalizedDose, event: &DoseEvent, window: TimeDelta) -> bool {
    if dose.kind != event.kind || (event.start - dose.start_time).abs() >= window {
        return false;
    }
    match dose.kind {
        DoseKind::Bolus | DoseKind::TempBasal => {
            (event.value - dose.programmed_value()).abs() < VALUE_TOLERANCE
        }
        DoseKind::Suspend | DoseKind::Resume => true,
    }
}

/// Reconcile with the default two minute window.
pub fn reconcile_pending_doses(
    events: Vec<DoseEvent>,
    mappings: ReconciliationMappings,
    pending: Vec<UnfinalizedDose>,
) -> ReconciliationResult {
    reconcile_pending_doses_within(events, mappings, pending, RECONCILE_WINDOW)
}

/// Every event either ends up keyed in the returned mappings or in
/// `remaining_events`, never both.
pub fn reconcile_pending_doses_within(
    events: Vec<DoseEvent>,
    mut mappings: ReconciliationMappings,
    mut pending: Vec<UnfinalizedDose>,
    window: Duration,
) -> ReconciliationResult {
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::zero());
    let mut remaining = Vec::new();

    for event in events {
        if mappings.contains_key(&event.raw) {
            continue;
        }
        let found = pending
            .iter()
            .position(|dose| !dose.is_reconciled_with_history && matches(dose, &event, window));
        let Some(index) = found else {
            remaining.push(event);
            continue;
        };

        let dose = &mut pending[index];
        debug!("reconciled {} with history at {}", dose, event.start);
        mappings.insert(
            event.raw.clone(),
            ReconciledDoseMapping {
                start_time: dose.start_time,
                uuid: dose.uuid,
                event_raw: event.raw.clone(),
            },
        );

        if dose.kind == DoseKind::Bolus {
            let history_duration = event.duration().to_std().unwrap_or(Duration::ZERO);
            if let Some(delivered) = event.delivered_units {
                if delivered + VALUE_TOLERANCE < dose.units {
                    // interrupted: the pump stopped early
                    dose.programmed_units = Some(dose.units);
                    dose.units = delivered;
                }
            }
            dose.duration = history_duration;
        } else if dose.kind == DoseKind::TempBasal {
            let history_duration = event.duration().to_std().unwrap_or(Duration::ZERO);
            if history_duration < dose.duration {
                dose.programmed_temp_rate = Some(dose.rate());
                dose.duration = history_duration;
                dose.units = event.value * history_duration.as_secs_f64() / 3600.0;
            }
        }
        dose.is_reconciled_with_history = true;
    }

    ReconciliationResult {
        pending_doses: pending,
        reconciliation_mappings: mappings,
        remaining_events: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimed::pump_model::PumpModel;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 9, 11, 3, 0, 0).unwrap()
    }

    fn bolus_event(start: DateTime<Utc>, length: TimeDelta, value: f64, delivered: f64) -> DoseEvent {
        DoseEvent {
            kind: DoseKind::Bolus,
            start,
            end: start + length,
            value,
            delivered_units: Some(delivered),
            raw: vec![0xab, 0xcd, 0xef],
            is_mutable: false,
        }
    }

    #[test]
    fn interrupted_bolus_takes_delivered_amount() {
        let bolus_time = now() - TimeDelta::minutes(5);
        let event_time = bolus_time + TimeDelta::seconds(2);
        let pending = UnfinalizedDose::bolus(5.4, bolus_time, Duration::from_secs(200));
        let event = bolus_event(event_time, TimeDelta::minutes(1), 5.4, 1.0);

        let result = reconcile_pending_doses(vec![event], HashMap::new(), vec![pending]);

        assert_eq!(result.pending_doses.len(), 1);
        let dose = &result.pending_doses[0];
        assert!(dose.is_reconciled_with_history);
        assert_eq!(dose.units, 1.0);
        assert_eq!(dose.programmed_units, Some(5.4));
        assert_eq!(dose.duration, Duration::from_secs(60));
        assert!(dose.is_finished(now()));
    }

    #[test]
    fn reconciled_bolus_only_appears_as_pending() {
        let bolus_time = now() - TimeDelta::minutes(5);
        let event_time = bolus_time + TimeDelta::seconds(2);
        let duration = PumpModel::MODEL_523.bolus_delivery_time(1.5);
        let pending = UnfinalizedDose::bolus(1.5, bolus_time, duration);
        let uuid = pending.uuid;
        let event = bolus_event(
            event_time,
            TimeDelta::from_std(duration).unwrap(),
            1.5,
            1.5,
        );
        let raw = event.raw.clone();

        let result = reconcile_pending_doses(vec![event], HashMap::new(), vec![pending]);

        assert!(result.pending_doses[0].is_reconciled_with_history);
        assert_eq!(result.pending_doses[0].units, 1.5);
        assert_eq!(result.pending_doses[0].programmed_units, None);
        assert_eq!(result.reconciliation_mappings.len(), 1);
        let mapping = &result.reconciliation_mappings[&raw];
        assert_eq!(mapping.uuid, uuid);
        assert_eq!(mapping.start_time, bolus_time);
        assert!(result.remaining_events.is_empty());
    }

    #[test]
    fn mapped_event_is_not_returned_again() {
        let bolus_time = now() - TimeDelta::minutes(5);
        let event = bolus_event(bolus_time + TimeDelta::seconds(2), TimeDelta::minutes(1), 1.5, 1.5);
        let mut mappings = HashMap::new();
        mappings.insert(
            event.raw.clone(),
            ReconciledDoseMapping {
                start_time: bolus_time,
                uuid: Uuid::new_v4(),
                event_raw: event.raw.clone(),
            },
        );

        let result = reconcile_pending_doses(vec![event], mappings, Vec::new());
        assert!(result.remaining_events.is_empty());
        assert_eq!(result.reconciliation_mappings.len(), 1);
    }

    #[test]
    fn event_outside_window_is_new_history() {
        let bolus_time = now() - TimeDelta::minutes(30);
        let pending = UnfinalizedDose::bolus(1.5, bolus_time, Duration::from_secs(60));
        let event = bolus_event(bolus_time + TimeDelta::minutes(3), TimeDelta::minutes(1), 1.5, 1.5);

        let result = reconcile_pending_doses(vec![event], HashMap::new(), vec![pending]);
        assert!(!result.pending_doses[0].is_reconciled_with_history);
        assert!(result.reconciliation_mappings.is_empty());
        assert_eq!(result.remaining_events.len(), 1);
    }

    #[test]
    fn different_amount_does_not_match() {
        let bolus_time = now() - TimeDelta::minutes(5);
        let pending = UnfinalizedDose::bolus(2.0, bolus_time, Duration::from_secs(80));
        let event = bolus_event(bolus_time, TimeDelta::minutes(1), 1.5, 1.5);

        let result = reconcile_pending_doses(vec![event], HashMap::new(), vec![pending]);
        assert_eq!(result.remaining_events.len(), 1);
    }

    #[test]
    fn cancelled_temp_basal_shortens_dose() {
        let start = now() - TimeDelta::minutes(20);
        let pending = UnfinalizedDose::temp_basal(1.0, start, Duration::from_secs(1800));
        let event = DoseEvent {
            kind: DoseKind::TempBasal,
            start: start + TimeDelta::seconds(3),
            end: start + TimeDelta::seconds(3) + TimeDelta::minutes(15),
            value: 1.0,
            delivered_units: None,
            raw: vec![0x33, 0x28],
            is_mutable: false,
        };

        let result = reconcile_pending_doses(vec![event], HashMap::new(), vec![pending]);
        let dose = &result.pending_doses[0];
        assert!(dose.is_reconciled_with_history);
        assert_eq!(dose.duration, Duration::from_secs(900));
        assert_eq!(dose.programmed_temp_rate, Some(1.0));
        assert!((dose.units - 0.25).abs() < 1e-9);
    }

    #[test]
    fn one_event_reconciles_one_dose() {
        let t = now() - TimeDelta::minutes(5);
        let a = UnfinalizedDose::suspend(t);
        let b = UnfinalizedDose::suspend(t + TimeDelta::seconds(30));
        let event = DoseEvent {
            kind: DoseKind::Suspend,
            start: t,
            end: t,
            value: 0.0,
            delivered_units: None,
            raw: vec![0x1e],
            is_mutable: false,
        };
        let result = reconcile_pending_doses(vec![event], HashMap::new(), vec![a, b]);
        let reconciled = result
            .pending_doses
            .iter()
            .filter(|d| d.is_reconciled_with_history)
            .count();
        assert_eq!(reconciled, 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn kind() -> impl Strategy<Value = DoseKind> {
            prop_oneof![
                Just(DoseKind::Bolus),
                Just(DoseKind::TempBasal),
                Just(DoseKind::Suspend),
                Just(DoseKind::Resume),
            ]
        }

        proptest! {
            #[test]
            fn events_partition_into_mappings_and_remaining(
                specs in proptest::collection::vec((kind(), 0i64..600, 0u8..4), 0..12),
                doses in proptest::collection::vec((kind(), 0i64..600, 0u8..4), 0..6),
            ) {
                let base = now() - TimeDelta::hours(1);
                let events: Vec<DoseEvent> = specs
                    .iter()
                    .enumerate()
                    .map(|(i, (kind, secs, v))| DoseEvent {
                        kind: *kind,
                        start: base + TimeDelta::seconds(*secs),
                        end: base + TimeDelta::seconds(*secs + 60),
                        value: f64::from(*v),
                        delivered_units: Some(f64::from(*v)),
                        raw: vec![i as u8],
                        is_mutable: false,
                    })
                    .collect();
                let pending: Vec<UnfinalizedDose> = doses
                    .iter()
                    .map(|(kind, secs, v)| match kind {
                        DoseKind::Bolus => UnfinalizedDose::bolus(
                            f64::from(*v), base + TimeDelta::seconds(*secs), Duration::from_secs(60)),
                        DoseKind::TempBasal => UnfinalizedDose::temp_basal(
                            f64::from(*v), base + TimeDelta::seconds(*secs), Duration::from_secs(3600)),
                        DoseKind::Suspend => UnfinalizedDose::suspend(base + TimeDelta::seconds(*secs)),
                        DoseKind::Resume => UnfinalizedDose::resume(base + TimeDelta::seconds(*secs)),
                    })
                    .collect();

                let raws: Vec<Vec<u8>> = events.iter().map(|e| e.raw.clone()).collect();
                let result = reconcile_pending_doses(events, HashMap::new(), pending);

                for raw in &raws {
                    let mapped = result.reconciliation_mappings.contains_key(raw);
                    let remaining = result.remaining_events.iter().any(|e| &e.raw == raw);
                    prop_assert!(mapped != remaining);
                }
                let reconciled = result
                    .pending_doses
                    .iter()
                    .filter(|d| d.is_reconciled_with_history)
                    .count();
                prop_assert_eq!(reconciled, result.reconciliation_mappings.len());
            }
        }
    }
}
