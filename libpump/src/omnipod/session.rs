// libpump-rs/libpump/src/omnipod/session.rs

//! Command sessions with a pod.
//!
//! [`PodPairing`] assigns an address to a fresh pod and configures it, which
//! yields the [`PodState`] every later [`PodSession`] borrows. Commands that
//! change delivery carry the current nonce; the nonce is advanced only once
//! the pod has accepted the command. A bad-nonce reply re-seeds the nonce
//! and fails the command, leaving any retry to the caller.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use log::{debug, error, info, warn};
use rand::Rng;

use super::alert::{AlertConfiguration, AlertSet, BeepType};
use super::blocks::{
    AcknowledgeAlert, AssignAddress, BasalScheduleExtra, BeepConfig, BeepOptions, BolusExtra,
    CancelDelivery, CancelDeliveryType, ConfigureAlerts, DeactivatePod, DetailedStatus,
    ErrorResponse, FaultConfig, GetStatus, MessageBlock, MessageBlockType, PodInfoType, SetupPod,
    StatusResponse, TempBasalExtra, VersionResponse,
};
use super::config::{
    expiration_advisory_alert, expiration_alerts, low_reservoir_alert, setup_reminder_alert,
    PodSettings, CANNULA_INSERTION_UNITS, EXPIRATION_ADVISORY, HARD_EXPIRATION, MAX_BOLUS_UNITS,
    MAX_TEMP_BASAL_DURATION, MAX_TEMP_BASAL_RATE, PAIRING_ADDRESS_MASK, PAIRING_ADDRESS_PREFIX,
    POD_FREQUENCY_MHZ, POD_PULSE_SIZE, PRIME_SETTLE_TIME, PRIME_UNITS, SECONDS_PER_BOLUS_PULSE,
    SECONDS_PER_PRIME_PULSE, SETUP_PACKET_TIMEOUT, SOFT_EXPIRATION, round_to_pulses,
};
use super::dose::PodDose;
use super::message::PodMessage;
use super::pod_state::PodState;
use super::progress::{PairingState, PodProgressStatus, SetupProgress};
use super::schedule::{schedule_offset, SetInsulinSchedule};
use super::transport::{MessageTransportState, PodMessageTransport};
use crate::error::DeliveryCertainty;
use crate::transport::RadioTransport;
use crate::types::{BasalSchedule, PodAddress};
use crate::utils::Clock;
use crate::{Error, Result};

/// Temp basal durations are whole half hours.
const TEMP_BASAL_STEP: Duration = Duration::from_secs(30 * 60);

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::zero())
}

/// Whether a failed delivery command may have reached the pod.
///
/// A reply refusing the command settles it; anything else might have been
/// heard and acted on.
fn certainty_of(error: &Error) -> DeliveryCertainty {
    match error {
        Error::BadNonce { .. } | Error::RejectedMessage { .. } | Error::PodFault { .. } => {
            DeliveryCertainty::Certain
        }
        _ => DeliveryCertainty::Uncertain,
    }
}

fn unexpected(response: &PodMessage, expected: MessageBlockType) -> Error {
    match response.first_block_type() {
        Some(actual) => Error::UnexpectedResponse {
            expected: expected.tag(),
            actual: actual.tag(),
        },
        None => Error::EmptyResponse,
    }
}

fn expect_version(response: &PodMessage) -> Result<VersionResponse> {
    if let Some(fault) = response.fault() {
        error!("pod faulted during pairing: {}", fault.fault_event_code());
        return Err(Error::PodFault {
            code: fault.fault_code,
        });
    }
    match response.blocks.first() {
        Some(MessageBlock::VersionResponse(version)) => Ok(version.clone()),
        Some(MessageBlock::ErrorResponse(e)) => Err(e.to_error()),
        _ => Err(unexpected(response, MessageBlockType::VersionResponse)),
    }
}

/// Pairs a new pod: assigns its address, then sets it up.
pub struct PodPairing<'a, T: RadioTransport, C: Clock> {
    radio: &'a mut T,
    clock: C,
    settings: PodSettings,
}

impl<'a, T: RadioTransport, C: Clock> PodPairing<'a, T, C> {
    /// Pairing over `radio`.
    pub fn new(radio: &'a mut T, clock: C) -> Self {
        Self {
            radio,
            clock,
            settings: PodSettings::default(),
        }
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: PodSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Assign address then set up, in one go.
    pub fn pair(&mut self, time_zone: FixedOffset) -> Result<PodState> {
        let mut pod = self.assign_address()?;
        self.setup_pod(&mut pod, time_zone)?;
        Ok(pod)
    }

    /// Give the listening pod a random address in the pairing range.
    pub fn assign_address(&mut self) -> Result<PodState> {
        let suffix = rand::thread_rng().gen_range(0..=PAIRING_ADDRESS_MASK);
        self.assign_address_to(PodAddress::new(PAIRING_ADDRESS_PREFIX | suffix))
    }

    /// Assign `address` and return the state for the new pod.
    pub fn assign_address_to(&mut self, address: PodAddress) -> Result<PodState> {
        self.radio.set_base_frequency(POD_FREQUENCY_MHZ)?;
        let mut transport_state = MessageTransportState::default();
        let response = PodMessageTransport::new(
            &mut *self.radio,
            &mut transport_state,
            PodAddress::BROADCAST,
            &self.settings,
        )
        .with_ack_address(address)
        .send(vec![MessageBlock::AssignAddress(AssignAddress::new(address))])?;

        let version = expect_version(&response)?;
        if !version.is_assign_address_response() {
            return Err(Error::InvalidData("setup reply to assign address".into()));
        }
        info!(
            "assigned {} to pod lot {} tid {} (pi {}, pm {})",
            address, version.lot, version.tid, version.pi_version, version.pm_version
        );
        let mut pod = PodState::new(
            address,
            self.clock.now(),
            version.pm_version,
            version.pi_version,
            version.lot,
            version.tid,
        );
        pod.message_transport_state = transport_state;
        Ok(pod)
    }

    /// Send the setup command with the pod's lot, tid and local time.
    ///
    /// A pod that acks instead of answering has taken the setup.
    pub fn setup_pod(&mut self, pod: &mut PodState, time_zone: FixedOffset) -> Result<()> {
        if pod.setup_progress >= SetupProgress::PodConfigured {
            debug!("pod {} already set up", pod.address);
            return Ok(());
        }
        let date = self.clock.now().with_timezone(&time_zone).naive_local();
        let setup = SetupPod::new(pod.address, date, pod.lot, pod.tid, SETUP_PACKET_TIMEOUT);
        let result = PodMessageTransport::new(
            &mut *self.radio,
            &mut pod.message_transport_state,
            PodAddress::BROADCAST,
            &self.settings,
        )
        .with_ack_address(pod.address)
        .send(vec![MessageBlock::SetupPod(setup)]);

        let response = match result {
            Err(Error::PodAckedInsteadOfReturningResponse) => {
                debug!("pod acked setup");
                pod.setup_progress = SetupProgress::PodConfigured;
                return Ok(());
            }
            other => other?,
        };
        let version = expect_version(&response)?;
        pod.setup_progress = SetupProgress::PodConfigured;
        if version.progress_status.pairing_state() != PairingState::Paired {
            return Err(Error::InvalidData(format!(
                "pod reports {} after setup",
                version.progress_status
            )));
        }
        Ok(())
    }
}

/// Commands to one paired pod.
///
/// Borrows the pod state for its lifetime; nonce and sequence changes are written through.
pub struct PodSession<'a, T: RadioTransport, C: Clock> {
    radio: &'a mut T,
    pod: &'a mut PodState,
    clock: C,
    settings: PodSettings,
}

impl<'a, T: RadioTransport, C: Clock> PodSession<'a, T, C> {
    /// Session with the default settings.
    pub fn new(radio: &'a mut T, pod: &'a mut PodState, clock: C) -> Self {
        Self {
            radio,
            pod,
            clock,
            settings: PodSettings::default(),
        }
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: PodSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The pod record.
    pub fn pod_state(&self) -> &PodState {
        self.pod
    }

    fn beeps(&self) -> BeepOptions {
        BeepOptions::new(
            self.settings.acknowledgement_beeps,
            self.settings.completion_beeps,
            self.settings.program_reminder_minutes,
        )
    }

    /// One message exchange. Error replies fail here; a bad nonce re-seeds first.
    fn exchange(&mut self, blocks: Vec<MessageBlock>) -> Result<PodMessage> {
        let sent_nonce = blocks.iter().find_map(MessageBlock::nonce);
        let sequence = self.pod.message_transport_state.message_number;
        let response = PodMessageTransport::new(
            &mut *self.radio,
            &mut self.pod.message_transport_state,
            self.pod.address,
            &self.settings,
        )
        .send(blocks)?;

        if let Some(MessageBlock::ErrorResponse(reply)) = response.blocks.first() {
            if let (ErrorResponse::BadNonce { nonce_search_key }, Some(sent)) = (reply, sent_nonce) {
                warn!("pod rejected nonce {:#010x}", sent);
                self.pod.resync_nonce(*nonce_search_key, sent, sequence);
            }
            return Err(reply.to_error());
        }
        Ok(response)
    }

    /// Record a fault carried by the reply and fail with it.
    fn check_fault(&mut self, response: &PodMessage) -> Result<()> {
        if let Some(fault) = response.fault() {
            let code = fault.fault_code;
            self.pod.update_from_detailed_status(fault, self.clock.now());
            return Err(Error::PodFault { code });
        }
        Ok(())
    }

    fn expect_status(&mut self, response: &PodMessage) -> Result<StatusResponse> {
        self.check_fault(response)?;
        match response.blocks.first() {
            Some(MessageBlock::StatusResponse(status)) => {
                self.pod.update_from_status_response(status, self.clock.now());
                Ok(status.clone())
            }
            _ => Err(unexpected(response, MessageBlockType::StatusResponse)),
        }
    }

    /// Send a nonce-carrying command and advance the nonce once it is accepted.
    fn send_command<F>(&mut self, build: F) -> Result<StatusResponse>
    where
        F: FnOnce(u32) -> Vec<MessageBlock>,
    {
        let blocks = build(self.pod.current_nonce());
        let response = self.exchange(blocks)?;
        let status = self.expect_status(&response)?;
        self.pod.advance_nonce();
        Ok(status)
    }

    fn ensure_active(&self) -> Result<()> {
        if let Some(fault) = &self.pod.fault {
            return Err(Error::PodFault {
                code: fault.fault_code,
            });
        }
        if self.pod.unfinished_pairing() {
            return Err(Error::SetupIncomplete(self.pod.setup_progress.to_string()));
        }
        Ok(())
    }

    // ---- status ----

    /// Plain status read.
    pub fn get_status(&mut self) -> Result<StatusResponse> {
        let response = self.exchange(vec![MessageBlock::GetStatus(GetStatus::new(PodInfoType::Normal))])?;
        self.expect_status(&response)
    }

    /// Detailed status. A faulted pod is reported here rather than as an error.
    pub fn get_detailed_status(&mut self) -> Result<DetailedStatus> {
        let response = self.exchange(vec![MessageBlock::GetStatus(GetStatus::new(
            PodInfoType::DetailedStatus,
        ))])?;
        let detailed = match response.blocks.first() {
            Some(MessageBlock::PodInfoResponse(info)) => info.detailed_status().cloned(),
            _ => None,
        };
        let Some(detailed) = detailed else {
            return Err(unexpected(&response, MessageBlockType::PodInfoResponse));
        };
        self.pod.update_from_detailed_status(&detailed, self.clock.now());
        Ok(detailed)
    }

    // ---- alerts ----

    /// Program alert slots.
    pub fn configure_alerts(&mut self, configurations: Vec<AlertConfiguration>) -> Result<StatusResponse> {
        self.send_command(|nonce| {
            vec![MessageBlock::ConfigureAlerts(ConfigureAlerts::new(nonce, configurations))]
        })
    }

    /// Silence `alerts`.
    pub fn acknowledge_alerts(&mut self, alerts: AlertSet) -> Result<StatusResponse> {
        let status =
            self.send_command(|nonce| vec![MessageBlock::AcknowledgeAlert(AcknowledgeAlert::new(nonce, alerts))])?;
        debug!("acknowledged {}", alerts);
        Ok(status)
    }

    /// Play `beep_type` once.
    pub fn beep(&mut self, beep_type: BeepType) -> Result<StatusResponse> {
        let response = self.exchange(vec![MessageBlock::BeepConfig(BeepConfig::play(beep_type))])?;
        self.expect_status(&response)
    }

    // ---- setup ----

    /// Arm the setup alerts and start priming.
    ///
    /// Returns how long to wait before the cannula can be inserted.
    pub fn prime(&mut self) -> Result<Duration> {
        if self.pod.setup_progress < SetupProgress::PodConfigured {
            return Err(Error::SetupIncomplete("pod is not set up".into()));
        }
        if !self.pod.setup_progress.priming_needed() {
            return Err(Error::InvalidState("pod is already primed".into()));
        }
        if self.pod.setup_progress < SetupProgress::StartingPrime {
            self.send_command(|nonce| vec![MessageBlock::FaultConfig(FaultConfig::new(nonce, 0, 0))])?;
            let alerts = vec![
                low_reservoir_alert(self.settings.low_reservoir_units),
                setup_reminder_alert(),
            ];
            self.configure_alerts(alerts)?;
            self.pod.setup_progress = SetupProgress::StartingPrime;
        }

        let pulse_interval = Duration::from_secs_f64(SECONDS_PER_PRIME_PULSE);
        self.send_command(|nonce| setup_bolus(nonce, PRIME_UNITS, pulse_interval))?;
        self.pod.setup_progress = SetupProgress::Priming;

        let wait = setup_bolus_time(PRIME_UNITS) + PRIME_SETTLE_TIME;
        self.pod.prime_finish_time = Some(self.clock.now() + to_delta(wait));
        info!("priming pod {}, done in {}s", self.pod.address, wait.as_secs());
        Ok(wait)
    }

    /// Confirm priming finished and arm the expiration advisory.
    pub fn finish_prime(&mut self) -> Result<StatusResponse> {
        let now = self.clock.now();
        if !self.pod.ready_for_cannula_insertion(now) {
            return Err(Error::SetupIncomplete("priming is still running".into()));
        }
        let status = self.get_status()?;
        if status.progress_status < PodProgressStatus::ReadyForBasalSchedule {
            return Err(Error::SetupIncomplete(format!(
                "pod reports {}",
                status.progress_status
            )));
        }
        let after = EXPIRATION_ADVISORY.saturating_sub(self.pod_age(now));
        self.configure_alerts(vec![expiration_advisory_alert(after)])
    }

    /// Program the first basal schedule, arm the expiration alerts and insert
    /// the cannula. Returns how long insertion takes.
    pub fn insert_cannula(&mut self, schedule: &BasalSchedule, time_zone: FixedOffset) -> Result<Duration> {
        if self.pod.setup_progress.priming_needed() {
            return Err(Error::SetupIncomplete("pod is not primed".into()));
        }
        if !self.pod.setup_progress.needs_cannula_insertion() {
            return Err(Error::InvalidState("cannula is already inserted".into()));
        }
        let now = self.clock.now();
        if !self.pod.ready_for_cannula_insertion(now) {
            return Err(Error::SetupIncomplete("priming is still running".into()));
        }

        if self.pod.setup_progress.needs_initial_basal_schedule() {
            self.pod.setup_progress = SetupProgress::SettingInitialBasalSchedule;
            self.set_time(schedule, time_zone)?;
            self.pod.setup_progress = SetupProgress::InitialBasalScheduleSet;
        }

        if self.pod.setup_progress < SetupProgress::StartingInsertCannula {
            let age = self.pod_age(now);
            let alerts = expiration_alerts(
                SOFT_EXPIRATION.saturating_sub(age),
                HARD_EXPIRATION.saturating_sub(age),
            );
            self.configure_alerts(alerts.to_vec())?;
            self.pod.setup_progress = SetupProgress::StartingInsertCannula;
        }

        let pulse_interval = Duration::from_secs_f64(SECONDS_PER_PRIME_PULSE);
        self.send_command(|nonce| setup_bolus(nonce, CANNULA_INSERTION_UNITS, pulse_interval))?;
        self.pod.setup_progress = SetupProgress::CannulaInserting;
        Ok(setup_bolus_time(CANNULA_INSERTION_UNITS) + PRIME_SETTLE_TIME)
    }

    /// True once the pod reports normal delivery after cannula insertion.
    pub fn check_insertion_completed(&mut self) -> Result<bool> {
        if self.pod.setup_progress < SetupProgress::CannulaInserting {
            return Err(Error::SetupIncomplete("cannula insertion has not started".into()));
        }
        let status = self.get_status()?;
        if status.progress_status.ready_for_delivery() {
            self.pod.setup_progress = SetupProgress::Completed;
            info!("pod {} is running", self.pod.address);
            return Ok(true);
        }
        Ok(false)
    }

    fn pod_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.pod.activated_at).to_std().unwrap_or(Duration::ZERO)
    }

    // ---- delivery ----

    /// Immediate bolus. Refused while an earlier bolus is still running.
    pub fn bolus(&mut self, units: f64) -> Result<StatusResponse> {
        let units = round_to_pulses(units);
        if units <= 0.0 || units > MAX_BOLUS_UNITS {
            return Err(Error::InvalidData(format!("bolus of {} U", units)));
        }
        self.ensure_active()?;
        let now = self.clock.now();
        self.pod.finalize_finished_doses(now);
        if self.pod.unfinalized_bolus.is_some() {
            return Err(Error::UnfinalizedBolus);
        }

        let pulse_interval = Duration::from_secs_f64(SECONDS_PER_BOLUS_PULSE);
        let beeps = self.beeps();
        let result = self.send_command(|nonce| {
            vec![
                MessageBlock::SetInsulinSchedule(SetInsulinSchedule::bolus(nonce, units, pulse_interval)),
                MessageBlock::BolusExtra(BolusExtra::new(units, pulse_interval, beeps)),
            ]
        });
        match result {
            Ok(status) => {
                debug!("bolus of {} U accepted", units);
                self.pod.unfinalized_bolus = Some(PodDose::bolus(units, now, DeliveryCertainty::Certain));
                Ok(status)
            }
            Err(e) => {
                let certainty = certainty_of(&e);
                if certainty == DeliveryCertainty::Uncertain {
                    warn!("bolus of {} U may have been delivered: {}", units, e);
                    self.pod.unfinalized_bolus = Some(PodDose::bolus(units, now, certainty));
                }
                Err(e.into_delivery(certainty))
            }
        }
    }

    /// Temp basal of `rate` U/h for a whole number of half hours.
    pub fn set_temp_basal(&mut self, rate: f64, duration: Duration) -> Result<StatusResponse> {
        if !(0.0..=MAX_TEMP_BASAL_RATE).contains(&rate) {
            return Err(Error::InvalidData(format!("temp basal rate {} U/h", rate)));
        }
        if duration.is_zero()
            || duration > MAX_TEMP_BASAL_DURATION
            || duration.as_secs() % TEMP_BASAL_STEP.as_secs() != 0
        {
            return Err(Error::InvalidData(format!(
                "temp basal duration {} min",
                duration.as_secs() / 60
            )));
        }
        self.ensure_active()?;
        let now = self.clock.now();
        self.pod.finalize_finished_doses(now);
        if self.pod.unfinalized_temp_basal.is_some() {
            return Err(Error::UnfinalizedTempBasal);
        }

        let beeps = self.beeps();
        let zero = self.settings.zero_basal_encoding;
        let result = self.send_command(|nonce| {
            vec![
                MessageBlock::SetInsulinSchedule(SetInsulinSchedule::temp_basal(nonce, rate, duration)),
                MessageBlock::TempBasalExtra(TempBasalExtra::new(rate, duration, beeps, zero)),
            ]
        });
        match result {
            Ok(status) => {
                self.pod.unfinalized_temp_basal =
                    Some(PodDose::temp_basal(rate, now, duration, DeliveryCertainty::Certain));
                Ok(status)
            }
            Err(e) => {
                let certainty = certainty_of(&e);
                if certainty == DeliveryCertainty::Uncertain {
                    self.pod.unfinalized_temp_basal = Some(PodDose::temp_basal(rate, now, duration, certainty));
                }
                Err(e.into_delivery(certainty))
            }
        }
    }

    /// Stop the given deliveries. Stopped doses are finalized with what they delivered.
    pub fn cancel_delivery(
        &mut self,
        delivery_type: CancelDeliveryType,
        beep_type: BeepType,
    ) -> Result<StatusResponse> {
        let now = self.clock.now();
        let result = self.send_command(|nonce| {
            vec![MessageBlock::CancelDelivery(CancelDelivery::new(nonce, delivery_type, beep_type))]
        });
        let status = result.map_err(|e| {
            let certainty = certainty_of(&e);
            e.into_delivery(certainty)
        })?;

        debug!("cancelled {}", delivery_type);
        let slots = [
            (CancelDeliveryType::BOLUS, &mut self.pod.unfinalized_bolus),
            (CancelDeliveryType::TEMP_BASAL, &mut self.pod.unfinalized_temp_basal),
        ];
        for (kind, slot) in slots {
            if !delivery_type.contains(kind) {
                continue;
            }
            if let Some(mut dose) = slot.take() {
                dose.cancel(now);
                self.pod.finalized_doses.push(dose);
            }
        }
        Ok(status)
    }

    /// Stop all delivery quietly.
    pub fn suspend_delivery(&mut self) -> Result<StatusResponse> {
        self.cancel_delivery(CancelDeliveryType::ALL, BeepType::NoBeep)
    }

    /// Program `schedule`, picking up `offset` into the day.
    pub fn set_basal_schedule(&mut self, schedule: &BasalSchedule, offset: Duration) -> Result<StatusResponse> {
        if let Some(fault) = &self.pod.fault {
            return Err(Error::PodFault {
                code: fault.fault_code,
            });
        }
        let beeps = self.beeps();
        let zero = self.settings.zero_basal_encoding;
        self.send_command(|nonce| {
            vec![
                MessageBlock::SetInsulinSchedule(SetInsulinSchedule::basal_schedule(nonce, schedule, offset)),
                MessageBlock::BasalScheduleExtra(BasalScheduleExtra::for_schedule(schedule, offset, beeps, zero)),
            ]
        })
        .map_err(|e| {
            let certainty = certainty_of(&e);
            e.into_delivery(certainty)
        })
    }

    /// Reprogram `schedule` at the current time in `time_zone`.
    ///
    /// Also how delivery resumes after a suspend.
    pub fn set_time(&mut self, schedule: &BasalSchedule, time_zone: FixedOffset) -> Result<StatusResponse> {
        let offset = schedule_offset(self.clock.now(), time_zone);
        self.set_basal_schedule(schedule, offset)
    }

    // ---- end of life ----

    /// Deactivate the pod; it stops delivering and stops answering.
    pub fn deactivate(&mut self) -> Result<StatusResponse> {
        let status = self.send_command(|nonce| vec![MessageBlock::DeactivatePod(DeactivatePod::new(nonce))])?;
        let now = self.clock.now();
        for slot in [&mut self.pod.unfinalized_bolus, &mut self.pod.unfinalized_temp_basal] {
            if let Some(mut dose) = slot.take() {
                dose.cancel(now);
                self.pod.finalized_doses.push(dose);
            }
        }
        info!("pod {} deactivated", self.pod.address);
        Ok(status)
    }

    /// Stop delivery with a beep, then deactivate. A faulted pod is deactivated directly.
    pub fn change_pod(&mut self) -> Result<StatusResponse> {
        if !self.pod.is_faulted() && !self.pod.suspended {
            self.cancel_delivery(CancelDeliveryType::ALL, BeepType::BeeepBeeep)?;
        }
        self.deactivate()
    }
}

/// Bolus used for priming and cannula insertion.
fn setup_bolus(nonce: u32, units: f64, pulse_interval: Duration) -> Vec<MessageBlock> {
    vec![
        MessageBlock::SetInsulinSchedule(SetInsulinSchedule::bolus(nonce, units, pulse_interval)),
        MessageBlock::BolusExtra(BolusExtra::new(units, pulse_interval, BeepOptions::default())),
    ]
}

fn setup_bolus_time(units: f64) -> Duration {
    Duration::from_secs_f64(units / POD_PULSE_SIZE * SECONDS_PER_PRIME_PULSE)
}
