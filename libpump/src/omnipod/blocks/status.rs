// libpump-rs/libpump/src/omnipod/blocks/status.rs

//! Status requests and the two shapes of reply: the fixed ten-byte status
//! response and the pod info response carrying a detailed status.

use std::fmt;
use std::time::Duration;

use derive_more::Display;

use crate::constants::POD_PULSE_SIZE;
use crate::omnipod::alert::AlertSet;
use crate::omnipod::config::MAX_RESERVOIR_READING;
use crate::omnipod::progress::PodProgressStatus;
use crate::protocol::parser::{be_u16_at, byte_at, ensure_len, expect_response_code, length_prefixed_block};
use crate::{Error, Result};

const GET_STATUS_TAG: u8 = 0x0e;
const POD_INFO_RESPONSE_TAG: u8 = 0x02;
const STATUS_RESPONSE_TAG: u8 = 0x1d;

/// Reservoir field value meaning "more than the pod can measure".
const RESERVOIR_OVER_RANGE: u16 = 0x3ff;

/// What a get-status request asks for.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodInfoType {
    /// Plain status response.
    #[display(fmt = "normal")]
    Normal,
    /// Alert slots as configured.
    #[display(fmt = "configured alerts")]
    ConfiguredAlerts,
    /// Detailed status, fault included.
    #[display(fmt = "detailed status")]
    DetailedStatus,
    /// Pulse log around the last fault.
    #[display(fmt = "data log")]
    DataLog,
    /// Fault details.
    #[display(fmt = "fault")]
    Fault,
    /// Factory test pattern.
    #[display(fmt = "hardcoded test")]
    HardcodedTest,
    /// Reset history.
    #[display(fmt = "reset status")]
    ResetStatus,
    /// Most recent pulse log.
    #[display(fmt = "recent pulse log")]
    PulseLogRecent,
    /// Previous pulse log.
    #[display(fmt = "previous pulse log")]
    PulseLogPrevious,
}

const INFO_TYPES: &[(u8, PodInfoType)] = &[
    (0x00, PodInfoType::Normal),
    (0x01, PodInfoType::ConfiguredAlerts),
    (0x02, PodInfoType::DetailedStatus),
    (0x03, PodInfoType::DataLog),
    (0x05, PodInfoType::Fault),
    (0x06, PodInfoType::HardcodedTest),
    (0x46, PodInfoType::ResetStatus),
    (0x50, PodInfoType::PulseLogRecent),
    (0x51, PodInfoType::PulseLogPrevious),
];

impl PodInfoType {
    /// Wire value.
    pub fn code(self) -> u8 {
        INFO_TYPES
            .iter()
            .find(|(_, t)| *t == self)
            .map(|(c, _)| *c)
            .unwrap_or_default()
    }

    /// Decode a wire value.
    pub fn from_code(code: u8) -> Result<Self> {
        INFO_TYPES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, t)| *t)
            .ok_or(Error::UnknownValue {
                value: code,
                what: "pod info type",
            })
    }
}

/// `0e 01 [info type]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetStatus {
    /// What to report.
    pub info_type: PodInfoType,
}

impl GetStatus {
    /// Request `info_type`.
    pub fn new(info_type: PodInfoType) -> Self {
        Self { info_type }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        vec![GET_STATUS_TAG, 1, self.info_type.code()]
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self::new(PodInfoType::from_code(byte_at(block, 2)?)?))
    }
}

/// Delivery in progress, high nibble of the status byte.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeliveryStatus {
    /// No delivery running.
    #[display(fmt = "suspended")]
    Suspended = 0,
    /// Basal schedule running.
    #[display(fmt = "scheduled basal")]
    ScheduledBasal = 1,
    /// Temp basal running.
    #[display(fmt = "temp basal running")]
    TempBasalRunning = 2,
    /// Priming.
    #[display(fmt = "priming")]
    Priming = 4,
    /// Bolus running.
    #[display(fmt = "bolusing")]
    BolusInProgress = 5,
    /// Bolus and temp basal running.
    #[display(fmt = "bolusing with temp basal")]
    BolusAndTempBasal = 6,
}

impl DeliveryStatus {
    /// Decode the status nibble.
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Self::Suspended,
            1 => Self::ScheduledBasal,
            2 => Self::TempBasalRunning,
            4 => Self::Priming,
            5 => Self::BolusInProgress,
            6 => Self::BolusAndTempBasal,
            other => {
                return Err(Error::UnknownValue {
                    value: other,
                    what: "delivery status",
                })
            }
        })
    }

    /// The status nibble.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// A bolus is running.
    pub fn bolusing(self) -> bool {
        matches!(self, Self::BolusInProgress | Self::BolusAndTempBasal)
    }

    /// A temp basal is running.
    pub fn temp_basal_running(self) -> bool {
        matches!(self, Self::TempBasalRunning | Self::BolusAndTempBasal)
    }

    /// Nothing is running.
    pub fn suspended(self) -> bool {
        self == Self::Suspended
    }
}

/// Fault code reported by a pod that has stopped delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultEventCode(pub u8);

impl FaultEventCode {
    /// No fault.
    pub const NO_FAULTS: FaultEventCode = FaultEventCode(0x00);
    /// Reservoir ran out.
    pub const RESERVOIR_EMPTY: FaultEventCode = FaultEventCode(0x18);
    /// Pod reached its end of life.
    pub const EXCEEDED_MAXIMUM_POD_LIFE: FaultEventCode = FaultEventCode(0x1c);
    /// Occlusion detected.
    pub const OCCLUSION: FaultEventCode = FaultEventCode(0x14);
    /// Delivery failed while priming.
    pub const DELIVERY_ERROR_DURING_PRIMING: FaultEventCode = FaultEventCode(0x5c);

    /// Anything other than [`Self::NO_FAULTS`].
    pub fn is_fault(self) -> bool {
        self != Self::NO_FAULTS
    }
}

impl fmt::Display for FaultEventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault 0x{:02x}", self.0)
    }
}

fn reservoir_from_raw(raw: u16) -> Option<f64> {
    let units = f64::from(raw & RESERVOIR_OVER_RANGE) * POD_PULSE_SIZE;
    (units <= MAX_RESERVOIR_READING).then_some(units)
}

fn reservoir_to_raw(level: Option<f64>) -> u16 {
    level
        .map(|units| ((units / POD_PULSE_SIZE).round() as u16).min(RESERVOIR_OVER_RANGE))
        .unwrap_or(RESERVOIR_OVER_RANGE)
}

fn units_to_pulses(units: f64) -> u16 {
    (units / POD_PULSE_SIZE).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// `1d [delivery:4|progress:4] [bit-packed counters:8]`
///
/// Bytes 2..10 pack pulses delivered (13 bits), the pod's message sequence
/// (4), pulses not delivered (10), unacknowledged alerts (8), minutes active
/// (13) and the reservoir (10, in pulses).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusResponse {
    /// Delivery in progress.
    pub delivery_status: DeliveryStatus,
    /// Pod lifecycle stage.
    pub progress_status: PodProgressStatus,
    /// Time since activation, whole minutes.
    pub time_active: Duration,
    /// Units delivered since the pod was activated, priming included.
    pub delivered_units: f64,
    /// The pod's message sequence number.
    pub message_sequence: u8,
    /// Bolus units still owed when the pod last stopped a bolus.
    pub not_delivered_units: f64,
    /// Alerts not yet acknowledged.
    pub alerts: AlertSet,
    /// `None` when the reservoir holds more than the pod can measure.
    pub reservoir_level: Option<f64>,
}

impl StatusResponse {
    /// Block length with tag.
    pub const LEN: usize = 10;

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                needed: Self::LEN,
                available: data.len(),
            });
        }
        expect_response_code(data, STATUS_RESPONSE_TAG)?;
        let d = &data[..Self::LEN];

        let pulses = (u16::from(d[2] & 0x0f) << 9) | (u16::from(d[3]) << 1) | u16::from(d[4] >> 7);
        let not_delivered = (u16::from(d[4] & 0x03) << 8) | u16::from(d[5]);
        let alerts = ((d[6] & 0x7f) << 1) | (d[7] >> 7);
        let minutes = (u64::from(d[7] & 0x7f) << 6) | u64::from(d[8] >> 2);
        let reservoir = (u16::from(d[8] & 0x03) << 8) | u16::from(d[9]);

        Ok(Self {
            delivery_status: DeliveryStatus::from_code(d[1] >> 4)?,
            progress_status: PodProgressStatus::from_code(d[1] & 0x0f)?,
            time_active: Duration::from_secs(minutes * 60),
            delivered_units: f64::from(pulses) * POD_PULSE_SIZE,
            message_sequence: (d[4] >> 3) & 0x0f,
            not_delivered_units: f64::from(not_delivered) * POD_PULSE_SIZE,
            alerts: AlertSet::from_bits(alerts),
            reservoir_level: reservoir_from_raw(reservoir),
        })
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let pulses = units_to_pulses(self.delivered_units) & 0x1fff;
        let not_delivered = units_to_pulses(self.not_delivered_units) & 0x3ff;
        let alerts = self.alerts.bits();
        let minutes = (self.time_active.as_secs() / 60).min(0x1fff) as u16;
        let reservoir = reservoir_to_raw(self.reservoir_level);
        vec![
            STATUS_RESPONSE_TAG,
            (self.delivery_status.code() << 4) | self.progress_status.code(),
            (pulses >> 9) as u8 & 0x0f,
            (pulses >> 1) as u8,
            ((pulses & 1) as u8) << 7 | (self.message_sequence & 0x0f) << 3 | (not_delivered >> 8) as u8,
            not_delivered as u8,
            (alerts >> 1) & 0x7f,
            (alerts & 1) << 7 | (minutes >> 6) as u8 & 0x7f,
            ((minutes & 0x3f) as u8) << 2 | (reservoir >> 8) as u8,
            reservoir as u8,
        ]
    }
}

/// Pod-side details of the last error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorEventInfo {
    /// Insulin state table was corrupted.
    pub insulin_state_table_corruption: bool,
    /// Occlusion type, two bits.
    pub occlusion_type: u8,
    /// An immediate bolus was running.
    pub immediate_bolus_in_progress: bool,
    /// Progress stage before the event.
    pub previous_progress: PodProgressStatus,
}

impl ErrorEventInfo {
    fn decode(raw: u8) -> Result<Option<Self>> {
        if raw == 0 {
            return Ok(None);
        }
        Ok(Some(Self {
            insulin_state_table_corruption: raw & 0x80 != 0,
            occlusion_type: (raw >> 5) & 0x03,
            immediate_bolus_in_progress: raw & 0x10 != 0,
            previous_progress: PodProgressStatus::from_code(raw & 0x0f)?,
        }))
    }

    fn encode(info: Option<&Self>) -> u8 {
        info.map_or(0, |i| {
            u8::from(i.insulin_state_table_corruption) << 7
                | (i.occlusion_type & 0x03) << 5
                | u8::from(i.immediate_bolus_in_progress) << 4
                | i.previous_progress.code()
        })
    }
}

/// Pod info type 2: everything the pod knows about its state, including the
/// fault that stopped it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetailedStatus {
    /// Pod lifecycle stage.
    pub progress_status: PodProgressStatus,
    /// Delivery in progress.
    pub delivery_status: DeliveryStatus,
    /// Bolus units not delivered.
    pub bolus_not_delivered: f64,
    /// Sequence of the last programming command.
    pub last_programming_sequence: u8,
    /// Units delivered since activation.
    pub total_insulin_delivered: f64,
    /// Raw fault code.
    pub fault_code: u8,
    /// Pod age at the fault, when one was recorded.
    pub fault_event_time_since_activation: Option<Duration>,
    /// `None` when above the measurable range.
    pub reservoir_level: Option<f64>,
    /// Time since activation.
    pub time_active: Duration,
    /// Alerts not yet acknowledged.
    pub unacknowledged_alerts: AlertSet,
    /// The pod failed reading its tables.
    pub fault_accessing_tables: bool,
    /// Details of the last error event.
    pub error_event_info: Option<ErrorEventInfo>,
    /// Receiver low gain, two bits.
    pub receiver_low_gain: u8,
    /// Signal strength, six bits.
    pub radio_rssi: u8,
    /// Trailing bytes the pod appends, kept for re-encoding.
    pub trailer: Vec<u8>,
}

impl DetailedStatus {
    /// Bytes from the info type through the rssi byte.
    pub const MIN_LEN: usize = 19;

    /// Fault code as a [`FaultEventCode`].
    pub fn fault_event_code(&self) -> FaultEventCode {
        FaultEventCode(self.fault_code)
    }

    /// The pod recorded a fault.
    pub fn is_faulted(&self) -> bool {
        self.fault_event_code().is_fault()
    }

    /// `data` starts at the info type byte.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, Self::MIN_LEN)?;
        let fault_minutes = be_u16_at(data, 9)?;
        Ok(Self {
            progress_status: PodProgressStatus::from_code(data[1])?,
            delivery_status: DeliveryStatus::from_code(data[2] & 0x0f)?,
            bolus_not_delivered: f64::from(be_u16_at(data, 3)? & 0x3ff) * POD_PULSE_SIZE,
            last_programming_sequence: data[5],
            total_insulin_delivered: f64::from(be_u16_at(data, 6)?) * POD_PULSE_SIZE,
            fault_code: data[8],
            fault_event_time_since_activation: (fault_minutes != 0xffff)
                .then(|| Duration::from_secs(u64::from(fault_minutes) * 60)),
            reservoir_level: reservoir_from_raw(be_u16_at(data, 11)?),
            time_active: Duration::from_secs(u64::from(be_u16_at(data, 13)?) * 60),
            unacknowledged_alerts: AlertSet::from_bits(data[15]),
            fault_accessing_tables: data[16] & 0x02 != 0,
            error_event_info: ErrorEventInfo::decode(data[17])?,
            receiver_low_gain: data[18] >> 6,
            radio_rssi: data[18] & 0x3f,
            trailer: data[Self::MIN_LEN..].to_vec(),
        })
    }

    /// Encoded from the info type byte on.
    pub fn encode(&self) -> Vec<u8> {
        let fault_minutes = self
            .fault_event_time_since_activation
            .map_or(0xffff, |d| (d.as_secs() / 60).min(0xfffe) as u16);
        let mut out = Vec::with_capacity(Self::MIN_LEN + self.trailer.len());
        out.push(PodInfoType::DetailedStatus.code());
        out.push(self.progress_status.code());
        out.push(self.delivery_status.code());
        out.extend_from_slice(&(units_to_pulses(self.bolus_not_delivered) & 0x3ff).to_be_bytes());
        out.push(self.last_programming_sequence);
        out.extend_from_slice(&units_to_pulses(self.total_insulin_delivered).to_be_bytes());
        out.push(self.fault_code);
        out.extend_from_slice(&fault_minutes.to_be_bytes());
        out.extend_from_slice(&reservoir_to_raw(self.reservoir_level).to_be_bytes());
        out.extend_from_slice(&((self.time_active.as_secs() / 60).min(0xffff) as u16).to_be_bytes());
        out.push(self.unacknowledged_alerts.bits());
        out.push(if self.fault_accessing_tables { 0x02 } else { 0 });
        out.push(ErrorEventInfo::encode(self.error_event_info.as_ref()));
        out.push((self.receiver_low_gain & 0x03) << 6 | (self.radio_rssi & 0x3f));
        out.extend_from_slice(&self.trailer);
        out
    }
}

/// Info carried by a pod info response.
#[derive(Debug, Clone, PartialEq)]
pub enum PodInfo {
    /// Info type 2.
    DetailedStatus(DetailedStatus),
    /// Info types this crate carries without interpreting.
    Other {
        /// The info type byte.
        info_type: PodInfoType,
        /// Info bytes after the type.
        data: Vec<u8>,
    },
}

/// `02 len [info type][info]`
#[derive(Debug, Clone, PartialEq)]
pub struct PodInfoResponse {
    /// The info.
    pub info: PodInfo,
}

impl PodInfoResponse {
    /// Info type byte this carries.
    pub fn info_type(&self) -> PodInfoType {
        match &self.info {
            PodInfo::DetailedStatus(_) => PodInfoType::DetailedStatus,
            PodInfo::Other { info_type, .. } => *info_type,
        }
    }

    /// The detailed status, if that is what this is.
    pub fn detailed_status(&self) -> Option<&DetailedStatus> {
        match &self.info {
            PodInfo::DetailedStatus(status) => Some(status),
            PodInfo::Other { .. } => None,
        }
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        expect_response_code(block, POD_INFO_RESPONSE_TAG)?;
        let body = &block[2..];
        let info_type = PodInfoType::from_code(byte_at(body, 0)?)?;
        let info = match info_type {
            PodInfoType::DetailedStatus => PodInfo::DetailedStatus(DetailedStatus::decode(body)?),
            other => PodInfo::Other {
                info_type: other,
                data: body[1..].to_vec(),
            },
        };
        Ok(Self { info })
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let body = match &self.info {
            PodInfo::DetailedStatus(status) => status.encode(),
            PodInfo::Other { info_type, data } => {
                let mut body = vec![info_type.code()];
                body.extend_from_slice(data);
                body
            }
        };
        let mut out = vec![POD_INFO_RESPONSE_TAG, body.len() as u8];
        out.extend_from_slice(&body);
        out
    }
}
