// libpump-rs/libpump/src/omnipod/pod_state.rs

//! State carried between pod sessions.
//!
//! One `PodState` exists per paired pod. Sessions borrow it mutably and leave
//! it updated: the nonce, transport counters, doses in flight and the last
//! status the pod reported. Persisting it is up to the caller (`to_blob` /
//! `from_blob` under the `serde` feature).

use chrono::{DateTime, TimeDelta, Utc};
use log::{error, warn};

use super::alert::AlertSet;
use super::blocks::{DeliveryStatus, DetailedStatus, FirmwareVersion, StatusResponse};
use super::config::{HARD_EXPIRATION, SOFT_EXPIRATION};
use super::dose::PodDose;
use super::nonce::NonceState;
use super::progress::SetupProgress;
use super::transport::MessageTransportState;
use crate::error::DeliveryCertainty;
use crate::types::PodAddress;

fn to_delta(d: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::zero())
}

/// Insulin totals from the last status read.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PodInsulinMeasurements {
    /// When the status was read.
    pub valid_time: DateTime<Utc>,
    /// Units delivered since activation.
    pub delivered: f64,
    /// Bolus units the pod never delivered.
    pub not_delivered: f64,
    /// `None` while the reservoir is above the measurable level.
    pub reservoir_level: Option<f64>,
}

impl PodInsulinMeasurements {
    /// Measurements from `status`, read at `valid_time`.
    pub fn from_status(status: &StatusResponse, valid_time: DateTime<Utc>) -> Self {
        Self {
            valid_time,
            delivered: status.delivered_units,
            not_delivered: status.not_delivered_units,
            reservoir_level: status.reservoir_level,
        }
    }
}

/// Everything the host keeps about one pod across sessions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PodState {
    /// Radio address.
    pub address: PodAddress,
    nonce: NonceState,
    /// Lot number.
    pub lot: u32,
    /// TID.
    pub tid: u32,
    /// PM firmware.
    pub pm_version: FirmwareVersion,
    /// PI firmware.
    pub pi_version: FirmwareVersion,
    /// When setup started.
    pub activated_at: DateTime<Utc>,
    /// When the pod stops delivering.
    pub expires_at: DateTime<Utc>,
    /// Host-side setup step.
    pub setup_progress: SetupProgress,
    /// When the prime pulses will be done and the cannula can go in.
    pub prime_finish_time: Option<DateTime<Utc>>,
    /// Alerts the pod last reported.
    pub alerts: AlertSet,
    /// Delivery is suspended.
    pub suspended: bool,
    /// Detailed status of the fault that stopped the pod.
    pub fault: Option<DetailedStatus>,
    /// Bolus still running or not yet confirmed.
    pub unfinalized_bolus: Option<PodDose>,
    /// Temp basal still running or not yet confirmed.
    pub unfinalized_temp_basal: Option<PodDose>,
    /// Doses waiting to be taken by the caller.
    pub finalized_doses: Vec<PodDose>,
    /// Last status read.
    pub last_insulin_measurements: Option<PodInsulinMeasurements>,
    /// Packet and message sequence numbers.
    pub message_transport_state: MessageTransportState,
}

impl PodState {
    /// State for a pod that just accepted its address.
    pub fn new(
        address: PodAddress,
        activated_at: DateTime<Utc>,
        pm_version: FirmwareVersion,
        pi_version: FirmwareVersion,
        lot: u32,
        tid: u32,
    ) -> Self {
        Self {
            address,
            nonce: NonceState::new(lot, tid),
            lot,
            tid,
            pm_version,
            pi_version,
            activated_at,
            expires_at: activated_at + to_delta(SOFT_EXPIRATION),
            setup_progress: SetupProgress::AddressAssigned,
            prime_finish_time: None,
            alerts: AlertSet::default(),
            suspended: false,
            fault: None,
            unfinalized_bolus: None,
            unfinalized_temp_basal: None,
            finalized_doses: Vec::new(),
            last_insulin_measurements: None,
            message_transport_state: MessageTransportState::default(),
        }
    }

    // ---- lifecycle ----

    /// Setup is not complete.
    pub fn unfinished_pairing(&self) -> bool {
        self.setup_progress != SetupProgress::Completed
    }

    /// Prime is done and its pulses have finished.
    pub fn ready_for_cannula_insertion(&self, now: DateTime<Utc>) -> bool {
        !self.setup_progress.priming_needed()
            && self.prime_finish_time.is_some_and(|finish| finish <= now)
    }

    /// Set up and not faulted.
    pub fn is_active(&self) -> bool {
        self.setup_progress == SetupProgress::Completed && self.fault.is_none()
    }

    /// A fault was recorded.
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Past this the pod warns that it needs replacing.
    pub fn soft_expiration(&self) -> DateTime<Utc> {
        self.activated_at + to_delta(SOFT_EXPIRATION)
    }

    /// Past this the pod stops delivering.
    pub fn hard_expiration(&self) -> DateTime<Utc> {
        self.activated_at + to_delta(HARD_EXPIRATION)
    }

    /// Past the hard expiration.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.hard_expiration()
    }

    // ---- nonce ----

    /// Nonce for the next command.
    pub fn current_nonce(&self) -> u32 {
        self.nonce.current()
    }

    /// Move to the next nonce.
    pub fn advance_nonce(&mut self) {
        self.nonce.advance();
    }

    /// Re-seed from the sync word of a bad-nonce reply to `sent_nonce`.
    pub fn resync_nonce(&mut self, sync_word: u16, sent_nonce: u32, message_sequence: u8) {
        self.nonce = NonceState::resync(self.lot, self.tid, sync_word, sent_nonce, message_sequence);
    }

    // ---- doses ----

    /// A bolus or temp basal whose command may or may not have reached the pod.
    pub fn delivery_schedule_uncertain(&self) -> bool {
        [&self.unfinalized_bolus, &self.unfinalized_temp_basal]
            .into_iter()
            .flatten()
            .any(PodDose::is_uncertain)
    }

    /// Move doses that have run their course to the finalized list.
    pub fn finalize_finished_doses(&mut self, now: DateTime<Utc>) {
        for slot in [&mut self.unfinalized_bolus, &mut self.unfinalized_temp_basal] {
            if slot.as_ref().is_some_and(|d| d.is_finished(now)) {
                if let Some(done) = slot.take() {
                    self.finalized_doses.push(done);
                }
            }
        }
    }

    /// Hand finalized doses to the caller, emptying the list.
    pub fn take_finalized_doses(&mut self) -> Vec<PodDose> {
        std::mem::take(&mut self.finalized_doses)
    }

    // ---- status ----

    /// Record a status reply read at `now`.
    pub fn update_from_status_response(&mut self, status: &StatusResponse, now: DateTime<Utc>) {
        self.update_delivery_status(status.delivery_status, now);
        self.last_insulin_measurements = Some(PodInsulinMeasurements::from_status(status, now));
        self.alerts = status.alerts;
    }

    /// Record what a detailed status says; a faulted pod keeps its fault.
    pub fn update_from_detailed_status(&mut self, status: &DetailedStatus, now: DateTime<Utc>) {
        self.update_delivery_status(status.delivery_status, now);
        self.alerts = status.unacknowledged_alerts;
        if status.is_faulted() {
            error!("pod {} faulted: {}", self.address, status.fault_event_code());
            self.fault = Some(status.clone());
        }
    }

    /// Settle doses against what the pod says it is delivering.
    ///
    /// Finished doses are finalized. An uncertain dose becomes certain when the
    /// pod reports that kind of delivery running, and is dropped otherwise.
    fn update_delivery_status(&mut self, delivery_status: DeliveryStatus, now: DateTime<Utc>) {
        self.finalize_finished_doses(now);

        let checks = [
            (&mut self.unfinalized_bolus, delivery_status.bolusing()),
            (&mut self.unfinalized_temp_basal, delivery_status.temp_basal_running()),
        ];
        for (slot, running) in checks {
            let Some(dose) = slot.as_mut() else { continue };
            if !dose.is_uncertain() {
                continue;
            }
            if running {
                dose.scheduled_certainty = DeliveryCertainty::Certain;
            } else {
                warn!("dropping {} the pod never started", dose.kind());
                *slot = None;
            }
        }

        self.suspended = delivery_status.suspended();
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
