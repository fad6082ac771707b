// libpump-rs/libpump/src/omnipod/blocks/mod.rs

//! Message blocks: the typed units a pod message body is made of.
//!
//! Every block starts with its tag. All but the status response carry a
//! length byte next; the status response is always ten bytes. Unknown tags
//! and out-of-range fields are errors, never skipped.

pub mod address;
pub mod alerts;
pub mod delivery;
pub mod error_response;
pub mod extras;
pub mod status;

use crate::omnipod::schedule::SetInsulinSchedule;
use crate::{Error, Result};

pub use address::{AssignAddress, FirmwareVersion, SetupPod, VersionDetails, VersionResponse};
pub use alerts::{AcknowledgeAlert, BeepConfig, ConfigureAlerts, ProgramBeeps};
pub use delivery::{CancelDelivery, CancelDeliveryType, DeactivatePod, FaultConfig};
pub use error_response::ErrorResponse;
pub use extras::{BasalScheduleExtra, BeepOptions, BolusExtra, TempBasalExtra};
pub use status::{
    DeliveryStatus, DetailedStatus, ErrorEventInfo, FaultEventCode, GetStatus, PodInfo, PodInfoResponse,
    PodInfoType, StatusResponse,
};

/// Block kinds, keyed by their tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageBlockType {
    /// `0x01`
    VersionResponse,
    /// `0x02`
    PodInfoResponse,
    /// `0x03`
    SetupPod,
    /// `0x06`
    ErrorResponse,
    /// `0x07`
    AssignAddress,
    /// `0x08`
    FaultConfig,
    /// `0x0e`
    GetStatus,
    /// `0x11`
    AcknowledgeAlert,
    /// `0x13`
    BasalScheduleExtra,
    /// `0x16`
    TempBasalExtra,
    /// `0x17`
    BolusExtra,
    /// `0x19`
    ConfigureAlerts,
    /// `0x1a`
    SetInsulinSchedule,
    /// `0x1c`
    DeactivatePod,
    /// `0x1d`
    StatusResponse,
    /// `0x1e`
    BeepConfig,
    /// `0x1f`
    CancelDelivery,
}

const TAGS: &[(u8, MessageBlockType)] = &[
    (0x01, MessageBlockType::VersionResponse),
    (0x02, MessageBlockType::PodInfoResponse),
    (0x03, MessageBlockType::SetupPod),
    (0x06, MessageBlockType::ErrorResponse),
    (0x07, MessageBlockType::AssignAddress),
    (0x08, MessageBlockType::FaultConfig),
    (0x0e, MessageBlockType::GetStatus),
    (0x11, MessageBlockType::AcknowledgeAlert),
    (0x13, MessageBlockType::BasalScheduleExtra),
    (0x16, MessageBlockType::TempBasalExtra),
    (0x17, MessageBlockType::BolusExtra),
    (0x19, MessageBlockType::ConfigureAlerts),
    (0x1a, MessageBlockType::SetInsulinSchedule),
    (0x1c, MessageBlockType::DeactivatePod),
    (0x1d, MessageBlockType::StatusResponse),
    (0x1e, MessageBlockType::BeepConfig),
    (0x1f, MessageBlockType::CancelDelivery),
];

impl MessageBlockType {
    /// Tag byte.
    pub fn tag(self) -> u8 {
        TAGS.iter()
            .find(|(_, t)| *t == self)
            .map(|(tag, _)| *tag)
            .unwrap_or_default()
    }

    /// Kind for a tag byte.
    pub fn from_tag(tag: u8) -> Result<Self> {
        TAGS.iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, ty)| *ty)
            .ok_or(Error::UnknownBlockType(tag))
    }
}

/// A decoded block of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBlock {
    /// See [`VersionResponse`].
    VersionResponse(VersionResponse),
    /// See [`PodInfoResponse`].
    PodInfoResponse(PodInfoResponse),
    /// See [`SetupPod`].
    SetupPod(SetupPod),
    /// See [`ErrorResponse`].
    ErrorResponse(ErrorResponse),
    /// See [`AssignAddress`].
    AssignAddress(AssignAddress),
    /// See [`FaultConfig`].
    FaultConfig(FaultConfig),
    /// See [`GetStatus`].
    GetStatus(GetStatus),
    /// See [`AcknowledgeAlert`].
    AcknowledgeAlert(AcknowledgeAlert),
    /// See [`BasalScheduleExtra`].
    BasalScheduleExtra(BasalScheduleExtra),
    /// See [`TempBasalExtra`].
    TempBasalExtra(TempBasalExtra),
    /// See [`BolusExtra`].
    BolusExtra(BolusExtra),
    /// See [`ConfigureAlerts`].
    ConfigureAlerts(ConfigureAlerts),
    /// See [`SetInsulinSchedule`].
    SetInsulinSchedule(SetInsulinSchedule),
    /// See [`DeactivatePod`].
    DeactivatePod(DeactivatePod),
    /// See [`StatusResponse`].
    StatusResponse(StatusResponse),
    /// See [`BeepConfig`].
    BeepConfig(BeepConfig),
    /// See [`CancelDelivery`].
    CancelDelivery(CancelDelivery),
}

impl MessageBlock {
    /// Kind of the block.
    pub fn block_type(&self) -> MessageBlockType {
        match self {
            Self::VersionResponse(_) => MessageBlockType::VersionResponse,
            Self::PodInfoResponse(_) => MessageBlockType::PodInfoResponse,
            Self::SetupPod(_) => MessageBlockType::SetupPod,
            Self::ErrorResponse(_) => MessageBlockType::ErrorResponse,
            Self::AssignAddress(_) => MessageBlockType::AssignAddress,
            Self::FaultConfig(_) => MessageBlockType::FaultConfig,
            Self::GetStatus(_) => MessageBlockType::GetStatus,
            Self::AcknowledgeAlert(_) => MessageBlockType::AcknowledgeAlert,
            Self::BasalScheduleExtra(_) => MessageBlockType::BasalScheduleExtra,
            Self::TempBasalExtra(_) => MessageBlockType::TempBasalExtra,
            Self::BolusExtra(_) => MessageBlockType::BolusExtra,
            Self::ConfigureAlerts(_) => MessageBlockType::ConfigureAlerts,
            Self::SetInsulinSchedule(_) => MessageBlockType::SetInsulinSchedule,
            Self::DeactivatePod(_) => MessageBlockType::DeactivatePod,
            Self::StatusResponse(_) => MessageBlockType::StatusResponse,
            Self::BeepConfig(_) => MessageBlockType::BeepConfig,
            Self::CancelDelivery(_) => MessageBlockType::CancelDelivery,
        }
    }

    /// Wire bytes, tag included.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::VersionResponse(b) => b.encode(),
            Self::PodInfoResponse(b) => b.encode(),
            Self::SetupPod(b) => b.encode(),
            Self::ErrorResponse(b) => b.encode(),
            Self::AssignAddress(b) => b.encode(),
            Self::FaultConfig(b) => b.encode(),
            Self::GetStatus(b) => b.encode(),
            Self::AcknowledgeAlert(b) => b.encode(),
            Self::BasalScheduleExtra(b) => b.encode(),
            Self::TempBasalExtra(b) => b.encode(),
            Self::BolusExtra(b) => b.encode(),
            Self::ConfigureAlerts(b) => b.encode(),
            Self::SetInsulinSchedule(b) => b.encode(),
            Self::DeactivatePod(b) => b.encode(),
            Self::StatusResponse(b) => b.encode(),
            Self::BeepConfig(b) => b.encode(),
            Self::CancelDelivery(b) => b.encode(),
        }
    }

    /// Decode one block from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let tag = *data.first().ok_or(Error::NotEnoughData {
            needed: 1,
            available: 0,
        })?;
        Ok(match MessageBlockType::from_tag(tag)? {
            MessageBlockType::VersionResponse => Self::VersionResponse(VersionResponse::decode(data)?),
            MessageBlockType::PodInfoResponse => Self::PodInfoResponse(PodInfoResponse::decode(data)?),
            MessageBlockType::SetupPod => Self::SetupPod(SetupPod::decode(data)?),
            MessageBlockType::ErrorResponse => Self::ErrorResponse(ErrorResponse::decode(data)?),
            MessageBlockType::AssignAddress => Self::AssignAddress(AssignAddress::decode(data)?),
            MessageBlockType::FaultConfig => Self::FaultConfig(FaultConfig::decode(data)?),
            MessageBlockType::GetStatus => Self::GetStatus(GetStatus::decode(data)?),
            MessageBlockType::AcknowledgeAlert => Self::AcknowledgeAlert(AcknowledgeAlert::decode(data)?),
            MessageBlockType::BasalScheduleExtra => {
                Self::BasalScheduleExtra(BasalScheduleExtra::decode(data)?)
            }
            MessageBlockType::TempBasalExtra => Self::TempBasalExtra(TempBasalExtra::decode(data)?),
            MessageBlockType::BolusExtra => Self::BolusExtra(BolusExtra::decode(data)?),
            MessageBlockType::ConfigureAlerts => Self::ConfigureAlerts(ConfigureAlerts::decode(data)?),
            MessageBlockType::SetInsulinSchedule => {
                Self::SetInsulinSchedule(SetInsulinSchedule::decode(data)?)
            }
            MessageBlockType::DeactivatePod => Self::DeactivatePod(DeactivatePod::decode(data)?),
            MessageBlockType::StatusResponse => Self::StatusResponse(StatusResponse::decode(data)?),
            MessageBlockType::BeepConfig => Self::BeepConfig(BeepConfig::decode(data)?),
            MessageBlockType::CancelDelivery => Self::CancelDelivery(CancelDelivery::decode(data)?),
        })
    }

    /// Nonce carried by the block, for blocks the pod authenticates.
    pub fn nonce(&self) -> Option<u32> {
        match self {
            Self::FaultConfig(b) => Some(b.nonce),
            Self::AcknowledgeAlert(b) => Some(b.nonce),
            Self::ConfigureAlerts(b) => Some(b.nonce),
            Self::SetInsulinSchedule(b) => Some(b.nonce),
            Self::DeactivatePod(b) => Some(b.nonce),
            Self::CancelDelivery(b) => Some(b.nonce),
            _ => None,
        }
    }
}

/// Bytes one block occupies at the front of `data`.
fn block_len(data: &[u8]) -> Result<usize> {
    match data {
        [] => Ok(0),
        [tag, ..] if *tag == MessageBlockType::StatusResponse.tag() => Ok(StatusResponse::LEN),
        [_] => Err(Error::NotEnoughData {
            needed: 2,
            available: 1,
        }),
        [_, len, ..] => Ok(2 + usize::from(*len)),
    }
}

/// Split a message body into blocks.
pub fn decode_blocks(body: &[u8]) -> Result<Vec<MessageBlock>> {
    let mut blocks = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let len = block_len(rest)?;
        if rest.len() < len {
            return Err(Error::NotEnoughData {
                needed: len,
                available: rest.len(),
            });
        }
        blocks.push(MessageBlock::decode(&rest[..len])?);
        rest = &rest[len..];
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_hex;

    #[test]
    fn tags_round_trip() {
        for (tag, ty) in TAGS {
            assert_eq!(ty.tag(), *tag);
            assert_eq!(MessageBlockType::from_tag(*tag).unwrap(), *ty);
        }
        assert!(matches!(
            MessageBlockType::from_tag(0x42),
            Err(Error::UnknownBlockType(0x42))
        ));
    }

    #[test]
    fn splits_a_command_pair() {
        let body = parse_hex("1a0ebed2e16b02010a0101a000340034170d000208000186a0000000000000").unwrap();
        let blocks = decode_blocks(&body).unwrap();
        let types: Vec<_> = blocks.iter().map(MessageBlock::block_type).collect();
        assert_eq!(types, vec![MessageBlockType::SetInsulinSchedule, MessageBlockType::BolusExtra]);
        assert_eq!(blocks[0].nonce(), Some(0xbed2e16b));
        assert_eq!(blocks[1].nonce(), None);
        let again: Vec<u8> = blocks.iter().flat_map(MessageBlock::encode).collect();
        assert_eq!(again, body);
    }

    #[test]
    fn truncated_body_wants_more() {
        let body = parse_hex("1a0ebed2e16b02010a").unwrap();
        assert!(matches!(decode_blocks(&body), Err(Error::NotEnoughData { .. })));
        assert!(matches!(decode_blocks(&[0x0e]), Err(Error::NotEnoughData { .. })));
    }

    #[test]
    fn unknown_tag_fails_the_body() {
        assert!(matches!(
            decode_blocks(&[0x0e, 0x01, 0x00, 0x42, 0x00]),
            Err(Error::UnknownBlockType(0x42))
        ));
    }
}
