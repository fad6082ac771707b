// libpump-rs/libpump/src/minimed/bodies.rs

//! Message bodies: request encoders and response decoders.
//!
//! Carelink requests come in two shapes. A "short" body is the single byte
//! `00` and asks the pump whether it will accept the command; the "long"
//! body carries the arguments as `[argc, args.., 0-pad]` padded to 65 bytes.
//! Responses to read commands use the same 65-byte layout with the payload
//! length in byte 0.

use std::fmt;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use derive_more::Display;

use super::basal_schedule::{encode_basal_schedule, parse_basal_schedule};
use super::message_type::{MessageType, PacketType};
use super::pump_model::PumpModel;
use crate::constants::{CARELINK_LONG_BODY_LENGTH, HISTORY_FRAME_DATA_LENGTH};
use crate::protocol::parser::{be_u16_at, be_u32_at, byte_at, ensure_len, slice_at};
use crate::types::BasalSchedule;
use crate::{Error, Result};

/// Error byte returned in an `ErrorResponse` message.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PumpErrorCode {
    /// Refused while suspended, in the prime menu, or with temp basal type set to percent.
    #[display(fmt = "command refused")]
    CommandRefused,
    /// The requested setting is above the pump's limit.
    #[display(fmt = "max setting exceeded")]
    MaxSettingExceeded,
    /// A bolus is still being delivered.
    #[display(fmt = "bolus in progress")]
    BolusInProgress,
    /// Any other error byte.
    #[display(fmt = "unknown error {:#04x}", _0)]
    Unknown(u8),
}

impl PumpErrorCode {
    /// Decode an error byte.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x08 => Self::CommandRefused,
            0x09 => Self::MaxSettingExceeded,
            0x0c => Self::BolusInProgress,
            other => Self::Unknown(other),
        }
    }

    /// Raw error byte.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::CommandRefused => 0x08,
            Self::MaxSettingExceeded => 0x09,
            Self::BolusInProgress => 0x0c,
            Self::Unknown(v) => v,
        }
    }
}

/// Buttons a `ButtonPress` command can push.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ButtonType {
    /// Easy bolus button.
    #[display(fmt = "easy")]
    Easy = 0x00,
    /// Escape.
    #[display(fmt = "esc")]
    Esc = 0x01,
    /// Act (confirm).
    #[display(fmt = "act")]
    Act = 0x02,
    /// Up arrow.
    #[display(fmt = "up")]
    Up = 0x03,
    /// Down arrow.
    #[display(fmt = "down")]
    Down = 0x04,
}

/// Basal profile selected on the pump.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BasalProfile {
    /// The standard profile.
    #[display(fmt = "standard")]
    Standard,
    /// Pattern A.
    #[display(fmt = "A")]
    ProfileA,
    /// Pattern B.
    #[display(fmt = "B")]
    ProfileB,
}

impl BasalProfile {
    /// Profile byte as stored in settings; unknown values read as standard.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::ProfileA,
            2 => Self::ProfileB,
            _ => Self::Standard,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Standard => 0,
            Self::ProfileA => 1,
            Self::ProfileB => 2,
        }
    }
}

/// Whether a temp basal is programmed as an absolute rate or a percentage.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TempBasalRateType {
    /// Rate in U/h.
    #[display(fmt = "absolute")]
    Absolute,
    /// Percentage of the scheduled rate.
    #[display(fmt = "percent")]
    Percent,
}

/// One frame of a multi-frame page transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Position of the frame in the page, from 1.
    pub frame_number: u8,
    /// Set on the final frame.
    pub is_last_frame: bool,
    /// Frame payload.
    pub contents: Vec<u8>,
}

impl DataFrame {
    fn decode(body: &[u8]) -> Result<Self> {
        let header = byte_at(body, 0)?;
        let contents = slice_at(body, 1, HISTORY_FRAME_DATA_LENGTH)?.to_vec();
        Ok(Self {
            frame_number: header & 0x7f,
            is_last_frame: header & 0x80 != 0,
            contents,
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CARELINK_LONG_BODY_LENGTH);
        out.push((self.frame_number & 0x7f) | if self.is_last_frame { 0x80 } else { 0 });
        out.extend_from_slice(&self.contents);
        out.resize(CARELINK_LONG_BODY_LENGTH, 0);
        out
    }
}

/// Battery reading from `GetBattery`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStatus {
    /// The pump flags the battery as low.
    pub low: bool,
    /// Battery voltage.
    pub volts: f64,
}

/// Reservoir level in raw strokes; the scale depends on the pump model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingInsulin {
    raw: [u8; 4],
}

impl RemainingInsulin {
    /// Units left for `model`.
    pub fn units(&self, model: PumpModel) -> f64 {
        let strokes_per_unit = model.strokes_per_unit();
        let strokes = if strokes_per_unit > 10 {
            u16::from_be_bytes([self.raw[2], self.raw[3]])
        } else {
            u16::from_be_bytes([self.raw[0], self.raw[1]])
        };
        f64::from(strokes) / f64::from(strokes_per_unit)
    }
}

/// Delivery flags from `ReadPumpStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpStatusFlags {
    /// A bolus is running.
    pub bolusing: bool,
    /// Delivery is suspended.
    pub suspended: bool,
}

/// Values from `ReadSettings`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpSettings {
    /// Maximum bolus in U.
    pub max_bolus: f64,
    /// Maximum basal rate in U/h.
    pub max_basal: f64,
    /// Active basal profile.
    pub selected_basal_profile: BasalProfile,
    /// Duration of insulin action.
    pub insulin_action_curve_hours: u8,
}

/// Running temp basal from `ReadTempBasal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempBasalStatus {
    /// Absolute or percent.
    pub rate_type: TempBasalRateType,
    /// U/h for absolute temps, percent otherwise.
    pub rate: f64,
    /// Time left; zero when none is running.
    pub time_remaining: Duration,
}

/// Where the sensor is writing from `ReadCurrentGlucosePage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentGlucosePage {
    /// Page being written.
    pub page_number: u32,
    /// Glucose record count on that page.
    pub glucose: u8,
    /// ISIG record count on that page.
    pub isig: u8,
}

/// `DeviceLink` and `FindDevice` bodies sent by MySentry-capable pumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLink {
    /// Link sequence number.
    pub sequence: u8,
    /// Address of the linked device.
    pub device_address: [u8; 3],
}

impl DeviceLink {
    fn decode(body: &[u8]) -> Result<Self> {
        let b = slice_at(body, 0, 4)?;
        Ok(Self {
            sequence: b[0] & 0x7f,
            device_address: [b[1], b[2], b[3]],
        })
    }
}

/// Acknowledgement a MySentry device sends for pump status broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySentryAck {
    /// Sequence number of the acknowledged broadcast.
    pub sequence: u8,
    /// Serial of the MySentry device.
    pub my_sentry_id: [u8; 3],
    /// Message types the device wants repeated.
    pub response_message_types: Vec<MessageType>,
}

impl MySentryAck {
    /// Encoded body length.
    pub const LENGTH: usize = 9;

    /// An ack naming up to four message types.
    pub fn new(sequence: u8, my_sentry_id: [u8; 3], types: &[MessageType]) -> Result<Self> {
        if types.len() > 4 {
            return Err(Error::InvalidData(format!(
                "at most 4 acknowledged types, got {}",
                types.len()
            )));
        }
        Ok(Self {
            sequence,
            my_sentry_id,
            response_message_types: types.to_vec(),
        })
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let b = slice_at(body, 0, Self::LENGTH)?;
        Ok(Self {
            sequence: b[0],
            my_sentry_id: [b[1], b[2], b[3]],
            response_message_types: b[5..9]
                .iter()
                .filter(|&&t| t != 0)
                .map(|&t| MessageType::from_u8(t))
                .collect(),
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::LENGTH];
        out[0] = self.sequence;
        out[1..4].copy_from_slice(&self.my_sentry_id);
        for (slot, t) in out[5..].iter_mut().zip(&self.response_message_types) {
            *slot = t.to_u8();
        }
        out
    }
}

/// Decoded body of a [`PumpMessage`](super::PumpMessage).
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// `[00]`: the first half of every Carelink command.
    CarelinkShort,
    /// 65-byte request carrying arguments.
    CarelinkLong(Vec<u8>),
    /// Bare acknowledgement.
    PumpAck,
    /// Refusal with its reason.
    PumpError(PumpErrorCode),
    /// One frame of a history or glucose page.
    DataFrame(DataFrame),
    /// Model number string.
    PumpModel(String),
    /// Battery status.
    Battery(BatteryStatus),
    /// Pump clock, local time.
    Time(NaiveDateTime),
    /// Reservoir level.
    RemainingInsulin(RemainingInsulin),
    /// Bolusing and suspended flags.
    PumpStatus(PumpStatusFlags),
    /// Settings.
    Settings(PumpSettings),
    /// Running temp basal.
    TempBasal(TempBasalStatus),
    /// Current glucose page.
    CurrentGlucosePage(CurrentGlucosePage),
    /// Stored basal profile.
    BasalSchedule(BasalSchedule),
    /// Device link.
    DeviceLink(DeviceLink),
    /// MySentry ack.
    MySentryAck(MySentryAck),
    /// Bytes of a message the crate has no decoder for.
    Raw(Vec<u8>),
}

fn long_body(args: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CARELINK_LONG_BODY_LENGTH);
    out.push(args.len() as u8);
    out.extend_from_slice(args);
    out.resize(CARELINK_LONG_BODY_LENGTH, 0);
    out
}

fn check_range(what: &str, value: f64, max: f64) -> Result<()> {
    if value.is_nan() || !(0.0..=max).contains(&value) {
        return Err(Error::InvalidData(format!(
            "{} {} outside 0..={}",
            what, value, max
        )));
    }
    Ok(())
}

// Rates and volumes are programmed in whole ticks; the small bias keeps
// values like 6.4 from landing a tick low after float multiplication.
fn ticks(value: f64, per_unit: f64) -> u32 {
    (value * per_unit + 1e-6).floor() as u32
}

impl MessageBody {
    /// Long body with `args` after the length byte, zero padded.
    pub fn carelink_long(args: &[u8]) -> Self {
        Self::CarelinkLong(long_body(args))
    }

    /// Keep the radio awake for `minutes`.
    pub fn power_on(minutes: u8) -> Self {
        Self::carelink_long(&[1, minutes])
    }

    /// Push `button`.
    pub fn button_press(button: ButtonType) -> Self {
        Self::carelink_long(&[button as u8])
    }

    /// Request history `page`.
    pub fn get_history_page(page: u8) -> Self {
        Self::carelink_long(&[page])
    }

    /// Request glucose `page`.
    pub fn get_glucose_page(page: u32) -> Self {
        Self::carelink_long(&page.to_be_bytes())
    }

    /// Absolute temp basal; duration is programmed in half hours.
    pub fn change_temp_basal(rate: f64, duration: Duration) -> Result<Self> {
        check_range("temp basal rate", rate, 35.0)?;
        let strokes = (rate * 40.0).round() as u16;
        let segments = (duration.as_secs_f64() / 1800.0).round();
        if segments > 48.0 {
            return Err(Error::InvalidData(format!(
                "temp basal duration {:?} longer than 24h",
                duration
            )));
        }
        let [hi, lo] = strokes.to_be_bytes();
        Ok(Self::carelink_long(&[hi, lo, segments as u8]))
    }

    /// Set the clock to local time `t`.
    pub fn change_time(t: &NaiveDateTime) -> Self {
        let [year_hi, year_lo] = (t.year() as u16).to_be_bytes();
        Self::carelink_long(&[
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            year_hi,
            year_lo,
            t.month() as u8,
            t.day() as u8,
        ])
    }

    /// Set the maximum bolus.
    pub fn change_max_bolus(units: f64) -> Result<Self> {
        check_range("max bolus", units, 25.0)?;
        Ok(Self::carelink_long(&[ticks(units, 10.0) as u8]))
    }

    /// Set the maximum basal rate.
    pub fn change_max_basal(rate: f64) -> Result<Self> {
        check_range("max basal", rate, 35.0)?;
        let [hi, lo] = (ticks(rate, 40.0) as u16).to_be_bytes();
        Ok(Self::carelink_long(&[hi, lo]))
    }

    /// Suspend when `suspend`, resume otherwise.
    pub fn suspend_resume(suspend: bool) -> Self {
        Self::carelink_long(&[u8::from(suspend)])
    }

    /// Normal bolus; x23 and later pumps take 40 strokes per unit in two bytes.
    pub fn bolus(units: f64, model: PumpModel) -> Result<Self> {
        check_range("bolus", units, model.maximum_bolus_volume())?;
        let strokes_per_unit = model.strokes_per_unit();
        let strokes = ticks(units, f64::from(strokes_per_unit));
        Ok(if strokes_per_unit > 10 {
            let [hi, lo] = (strokes as u16).to_be_bytes();
            Self::carelink_long(&[hi, lo])
        } else {
            Self::carelink_long(&[strokes as u8])
        })
    }

    /// Decode a received body for `message_type`.
    ///
    /// Bodies too short for the response layout of their type (the short
    /// request echo, for instance) and types without a decoder come back as
    /// [`MessageBody::Raw`]. MySentry devices answer with a 9-byte ack body
    /// under the same tag as the pump's one-byte ack.
    pub fn decode(packet_type: PacketType, message_type: MessageType, body: &[u8]) -> Result<Self> {
        use MessageType as T;

        if message_type.has_long_response() && body.len() < CARELINK_LONG_BODY_LENGTH {
            return Ok(Self::Raw(body.to_vec()));
        }
        let decoded = match message_type {
            T::PumpAck
                if packet_type == PacketType::MySentry && body.len() >= MySentryAck::LENGTH =>
            {
                Self::MySentryAck(MySentryAck::decode(body)?)
            }
            T::PumpAck => Self::PumpAck,
            T::ErrorResponse => Self::PumpError(PumpErrorCode::from_u8(byte_at(body, 0)?)),
            T::GetHistoryPage | T::GetGlucosePage => Self::DataFrame(DataFrame::decode(body)?),
            T::GetPumpModel => {
                let len = usize::from(byte_at(body, 1)?);
                let ascii = slice_at(body, 2, len)?;
                Self::PumpModel(String::from_utf8_lossy(ascii).into_owned())
            }
            T::GetBattery => Self::Battery(BatteryStatus {
                low: byte_at(body, 1)? > 0,
                volts: f64::from(be_u16_at(body, 2)?) / 100.0,
            }),
            T::ReadTime => {
                let b = slice_at(body, 1, 7)?;
                let year = i32::from(u16::from_be_bytes([b[3], b[4]]));
                let t = NaiveDate::from_ymd_opt(year, u32::from(b[5]), u32::from(b[6]))
                    .and_then(|d| d.and_hms_opt(u32::from(b[0]), u32::from(b[1]), u32::from(b[2])))
                    .ok_or_else(|| Error::InvalidData("pump clock holds an invalid date".into()))?;
                Self::Time(t)
            }
            T::ReadRemainingInsulin => {
                let b = slice_at(body, 1, 4)?;
                Self::RemainingInsulin(RemainingInsulin {
                    raw: [b[0], b[1], b[2], b[3]],
                })
            }
            T::ReadPumpStatus => Self::PumpStatus(PumpStatusFlags {
                bolusing: byte_at(body, 2)? > 0,
                suspended: byte_at(body, 3)? > 0,
            }),
            T::ReadSettings => Self::Settings(PumpSettings {
                max_bolus: f64::from(byte_at(body, 7)?) / 10.0,
                max_basal: f64::from(be_u16_at(body, 8)?) / 40.0,
                selected_basal_profile: BasalProfile::from_u8(byte_at(body, 12)?),
                insulin_action_curve_hours: byte_at(body, 18)?,
            }),
            T::ReadTempBasal => {
                let percent = byte_at(body, 1)? != 0;
                let (rate_type, rate) = if percent {
                    (TempBasalRateType::Percent, f64::from(byte_at(body, 2)?))
                } else {
                    (
                        TempBasalRateType::Absolute,
                        f64::from(be_u16_at(body, 3)?) / 40.0,
                    )
                };
                Self::TempBasal(TempBasalStatus {
                    rate_type,
                    rate,
                    time_remaining: Duration::from_secs(u64::from(be_u16_at(body, 5)?) * 60),
                })
            }
            T::ReadCurrentGlucosePage => Self::CurrentGlucosePage(CurrentGlucosePage {
                page_number: be_u32_at(body, 1)?,
                glucose: byte_at(body, 6)?,
                isig: byte_at(body, 8)?,
            }),
            T::ReadProfileStd512 => {
                ensure_len(body, 1)?;
                Self::BasalSchedule(parse_basal_schedule(&body[1..]))
            }
            T::DeviceLink | T::FindDevice => Self::DeviceLink(DeviceLink::decode(body)?),
            _ => Self::Raw(body.to_vec()),
        };
        Ok(decoded)
    }

    /// Bytes as they appear between the message type and the CRC.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::CarelinkShort | Self::PumpAck => vec![0x00],
            Self::CarelinkLong(bytes) | Self::Raw(bytes) => bytes.clone(),
            Self::PumpError(code) => vec![code.to_u8()],
            Self::DataFrame(frame) => frame.to_bytes(),
            Self::PumpModel(model) => {
                let mut args = vec![model.len() as u8];
                args.extend_from_slice(model.as_bytes());
                long_body(&args)
            }
            Self::Battery(b) => {
                let [hi, lo] = ((b.volts * 100.0).round() as u16).to_be_bytes();
                long_body(&[u8::from(b.low), hi, lo])
            }
            Self::Time(t) => match Self::change_time(t) {
                Self::CarelinkLong(bytes) => bytes,
                _ => long_body(&[]),
            },
            Self::RemainingInsulin(r) => long_body(&r.raw),
            Self::PumpStatus(s) => long_body(&[0x03, u8::from(s.bolusing), u8::from(s.suspended)]),
            Self::Settings(s) => {
                let mut args = [0u8; 18];
                args[6] = ticks(s.max_bolus, 10.0) as u8;
                let [hi, lo] = (ticks(s.max_basal, 40.0) as u16).to_be_bytes();
                args[7] = hi;
                args[8] = lo;
                args[11] = s.selected_basal_profile.to_u8();
                args[17] = s.insulin_action_curve_hours;
                long_body(&args)
            }
            Self::TempBasal(t) => {
                let minutes = (t.time_remaining.as_secs() / 60) as u16;
                let [m_hi, m_lo] = minutes.to_be_bytes();
                match t.rate_type {
                    TempBasalRateType::Percent => long_body(&[1, t.rate as u8, 0, 0, m_hi, m_lo]),
                    TempBasalRateType::Absolute => {
                        let [hi, lo] = ((t.rate * 40.0).round() as u16).to_be_bytes();
                        long_body(&[0, 0, hi, lo, m_hi, m_lo])
                    }
                }
            }
            Self::CurrentGlucosePage(p) => {
                let page = p.page_number.to_be_bytes();
                long_body(&[page[0], page[1], page[2], page[3], 0, p.glucose, 0, p.isig])
            }
            Self::BasalSchedule(s) => {
                let mut out = vec![0x01];
                out.extend(encode_basal_schedule(s, CARELINK_LONG_BODY_LENGTH - 1));
                out
            }
            Self::DeviceLink(d) => {
                let mut out = vec![d.sequence | 0x80];
                out.extend_from_slice(&d.device_address);
                out.push(0x00);
                out
            }
            Self::MySentryAck(a) => a.to_bytes(),
        }
    }
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PumpError(code) => write!(f, "PumpError({})", code),
            other => f.write_str(&crate::utils::bytes_to_hex(&other.to_bytes())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{bytes_to_hex, parse_hex};

    fn padded(hex: &str) -> Vec<u8> {
        let mut v = parse_hex(hex).unwrap();
        v.resize(CARELINK_LONG_BODY_LENGTH, 0);
        v
    }

    #[test]
    fn max_bolus_ticks() {
        let body = MessageBody::change_max_bolus(6.4).unwrap().to_bytes();
        assert_eq!(body, padded("0140"));
        let body = MessageBody::change_max_bolus(2.25).unwrap().to_bytes();
        assert_eq!(body, padded("0116"));
        assert!(MessageBody::change_max_bolus(-1.0).is_err());
        assert!(MessageBody::change_max_bolus(26.0).is_err());
    }

    #[test]
    fn max_basal_ticks() {
        let body = MessageBody::change_max_basal(2.0).unwrap().to_bytes();
        assert_eq!(&body[..3], &[2, 0x00, 0x50]);
        assert!(MessageBody::change_max_basal(35.1).is_err());
    }

    #[test]
    fn glucose_page_request() {
        let body = MessageBody::get_glucose_page(13).to_bytes();
        assert_eq!(bytes_to_hex(&body[..5]), "040000000d");
        assert_eq!(body.len(), 65);
    }

    #[test]
    fn simple_requests() {
        assert_eq!(&MessageBody::power_on(10).to_bytes()[..3], &[2, 1, 10]);
        assert_eq!(&MessageBody::button_press(ButtonType::Act).to_bytes()[..2], &[1, 2]);
        assert_eq!(&MessageBody::get_history_page(3).to_bytes()[..2], &[1, 3]);
        assert_eq!(&MessageBody::suspend_resume(true).to_bytes()[..2], &[1, 1]);
        assert_eq!(&MessageBody::suspend_resume(false).to_bytes()[..2], &[1, 0]);
        assert_eq!(MessageBody::CarelinkShort.to_bytes(), vec![0]);
    }

    #[test]
    fn temp_basal_request() {
        let body = MessageBody::change_temp_basal(1.1, Duration::from_secs(30 * 60))
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..4], &[3, 0x00, 0x2c, 1]);
        assert!(MessageBody::change_temp_basal(1.0, Duration::from_secs(25 * 3600)).is_err());
    }

    #[test]
    fn change_time_request() {
        let t = NaiveDate::from_ymd_opt(2017, 9, 4)
            .unwrap()
            .and_hms_opt(13, 5, 30)
            .unwrap();
        let body = MessageBody::change_time(&t).to_bytes();
        assert_eq!(bytes_to_hex(&body[..8]), "070d051e07e10904");
    }

    #[test]
    fn bolus_strokes_follow_model() {
        let large = MessageBody::bolus(2.5, PumpModel::MODEL_523).unwrap().to_bytes();
        assert_eq!(&large[..3], &[2, 0x00, 0x64]);
        let small = MessageBody::bolus(2.5, PumpModel::MODEL_515).unwrap().to_bytes();
        assert_eq!(&small[..2], &[1, 25]);
        assert!(MessageBody::bolus(30.0, PumpModel::MODEL_523).is_err());
    }

    #[test]
    fn remaining_insulin_scale() {
        let body = padded("0400000ca3");
        match MessageBody::decode(PacketType::Carelink, MessageType::ReadRemainingInsulin, &body).unwrap() {
            MessageBody::RemainingInsulin(r) => {
                assert_eq!(r.units(PumpModel::MODEL_723), 80.875);
                // small pumps read the first pair
                assert_eq!(r.units(PumpModel::MODEL_515), 0.0);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn current_glucose_page() {
        let body = padded("0000000D6100100020");
        match MessageBody::decode(PacketType::Carelink, MessageType::ReadCurrentGlucosePage, &body).unwrap() {
            MessageBody::CurrentGlucosePage(p) => {
                assert_eq!(p.page_number, 3425);
                assert_eq!(p.glucose, 16);
                assert_eq!(p.isig, 32);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn profile_body() {
        let body = padded(
            "011300001000030d000810000c0b00140a00180e002010002615002900000000000000000000000000000000000000000000000000000000000000000000000000",
        );
        let schedule = match MessageBody::decode(PacketType::Carelink, MessageType::ReadProfileStd512, &body).unwrap() {
            MessageBody::BasalSchedule(s) => s,
            other => panic!("unexpected body {:?}", other),
        };
        let expected = [
            (0, 0.475),
            (90, 0.4),
            (240, 0.325),
            (360, 0.4),
            (600, 0.275),
            (720, 0.25),
            (960, 0.35),
            (1140, 0.4),
            (1230, 0.525),
        ];
        assert_eq!(schedule.entries().len(), expected.len());
        for (entry, (minutes, rate)) in schedule.entries().iter().zip(expected) {
            assert_eq!(entry.time_offset_minutes, minutes);
            assert!((entry.rate - rate).abs() < 0.0001);
        }
    }

    #[test]
    fn overlong_profile_does_not_fail() {
        let body = parse_hex(
            "011300001000030d000810000c0b00140a00180e00201000261500296150030615003161500326150033615003461500356150036615003761500386150039615003a0bc",
        )
        .unwrap();
        match MessageBody::decode(PacketType::Carelink, MessageType::ReadProfileStd512, &body).unwrap() {
            MessageBody::BasalSchedule(s) => assert!(!s.is_empty()),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn settings_layout() {
        let body = padded("1900010001010096008c00000000000064010400140019010101");
        match MessageBody::decode(PacketType::Carelink, MessageType::ReadSettings, &body).unwrap() {
            MessageBody::Settings(s) => {
                assert_eq!(s.max_bolus, 15.0);
                assert_eq!(s.max_basal, 3.5);
                assert_eq!(s.selected_basal_profile, BasalProfile::Standard);
                assert_eq!(s.insulin_action_curve_hours, 4);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn temp_basal_status_both_kinds() {
        let abs = padded("06000000160015");
        match MessageBody::decode(PacketType::Carelink, MessageType::ReadTempBasal, &abs).unwrap() {
            MessageBody::TempBasal(t) => {
                assert_eq!(t.rate_type, TempBasalRateType::Absolute);
                assert_eq!(t.rate, 0.55);
                assert_eq!(t.time_remaining, Duration::from_secs(21 * 60));
            }
            other => panic!("unexpected body {:?}", other),
        }
        let pct = padded("06016400000010");
        match MessageBody::decode(PacketType::Carelink, MessageType::ReadTempBasal, &pct).unwrap() {
            MessageBody::TempBasal(t) => {
                assert_eq!(t.rate_type, TempBasalRateType::Percent);
                assert_eq!(t.rate, 100.0);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn short_echo_stays_raw() {
        let decoded = MessageBody::decode(PacketType::Carelink, MessageType::GetBattery, &[0x00]).unwrap();
        assert_eq!(decoded, MessageBody::Raw(vec![0x00]));
    }

    #[test]
    fn error_codes() {
        match MessageBody::decode(PacketType::Carelink, MessageType::ErrorResponse, &[0x0c]).unwrap() {
            MessageBody::PumpError(code) => assert_eq!(code, PumpErrorCode::BolusInProgress),
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(PumpErrorCode::from_u8(0x33), PumpErrorCode::Unknown(0x33));
        assert_eq!(PumpErrorCode::CommandRefused.to_string(), "command refused");
    }

    #[test]
    fn responses_rebuild_to_their_layout() {
        let status = MessageBody::PumpStatus(PumpStatusFlags {
            bolusing: true,
            suspended: false,
        });
        let back = MessageBody::decode(PacketType::Carelink, MessageType::ReadPumpStatus, &status.to_bytes()).unwrap();
        assert_eq!(back, status);

        let battery = MessageBody::Battery(BatteryStatus {
            low: false,
            volts: 1.4,
        });
        assert_eq!(
            bytes_to_hex(&battery.to_bytes()[..4]),
            "0300008c"
        );
    }

    #[test]
    fn my_sentry_ack_limits() {
        let types = [MessageType::PumpStatus; 5];
        assert!(MySentryAck::new(1, [0, 6, 0x95], &types).is_err());
        let ack = MySentryAck::new(0x59, [0x00, 0x06, 0x95], &[MessageType::PumpStatus]).unwrap();
        assert_eq!(bytes_to_hex(&ack.to_bytes()), "590006950004000000");
        match MessageBody::decode(PacketType::MySentry, MessageType::PumpAck, &ack.to_bytes()).unwrap() {
            MessageBody::MySentryAck(back) => assert_eq!(back, ack),
            other => panic!("unexpected body {:?}", other),
        }
    }
}
