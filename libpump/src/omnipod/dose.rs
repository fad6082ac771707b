// libpump-rs/libpump/src/omnipod/dose.rs

//! Doses a pod is delivering, tracked until they finish.
//!
//! The pod keeps no history the host can read back, so a dose commanded by
//! this host stays unfinalized until its scheduled end. A dose whose command
//! got no reply is kept as uncertain until the next status read settles it.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::config::BOLUS_DELIVERY_RATE;
use crate::error::DeliveryCertainty;
use crate::minimed::{DoseKind, UnfinalizedDose};

/// A bolus or temp basal commanded on the pod.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PodDose {
    /// Timing and amount.
    pub dose: UnfinalizedDose,
    /// Whether the pod is known to have accepted the command.
    pub scheduled_certainty: DeliveryCertainty,
}

impl PodDose {
    /// Immediate bolus, delivered at the pod's fixed bolus speed.
    pub fn bolus(units: f64, start_time: DateTime<Utc>, scheduled_certainty: DeliveryCertainty) -> Self {
        let duration = Duration::from_secs_f64((units / BOLUS_DELIVERY_RATE).max(0.0));
        Self {
            dose: UnfinalizedDose::bolus(units, start_time, duration),
            scheduled_certainty,
        }
    }

    /// Temp basal of `rate` U/h for `duration`.
    pub fn temp_basal(
        rate: f64,
        start_time: DateTime<Utc>,
        duration: Duration,
        scheduled_certainty: DeliveryCertainty,
    ) -> Self {
        Self {
            dose: UnfinalizedDose::temp_basal(rate, start_time, duration),
            scheduled_certainty,
        }
    }

    /// Bolus or temp basal.
    pub fn kind(&self) -> DoseKind {
        self.dose.kind
    }

    /// Units scheduled.
    pub fn units(&self) -> f64 {
        self.dose.units
    }

    /// When the pod accepted it.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.dose.start_time
    }

    /// Scheduled end.
    pub fn finish_time(&self) -> DateTime<Utc> {
        self.dose.finish_time()
    }

    /// The scheduled end has passed.
    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.dose.is_finished(now)
    }

    /// The pod may not have accepted the command.
    pub fn is_uncertain(&self) -> bool {
        self.scheduled_certainty == DeliveryCertainty::Uncertain
    }

    /// Units per hour for a temp basal.
    pub fn rate(&self) -> f64 {
        self.dose.rate()
    }

    /// Cut the dose short at `at`.
    pub fn cancel(&mut self, at: DateTime<Utc>) {
        self.dose.cancel(at);
    }
}
