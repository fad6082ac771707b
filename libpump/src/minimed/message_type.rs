// libpump-rs/libpump/src/minimed/message_type.rs

//! Packet and message tags of the Minimed radio protocol.

use derive_more::Display;

/// First byte of every Minimed packet.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketType {
    /// `0xa2`, MySentry broadcasts.
    #[display(fmt = "mysentry")]
    MySentry,
    /// `0xa5`, meter readings.
    #[display(fmt = "meter")]
    Meter,
    /// `0xa7`, Carelink commands.
    #[display(fmt = "carelink")]
    Carelink,
}

impl PacketType {
    /// Packet type for a first byte.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0xa2 => Some(Self::MySentry),
            0xa5 => Some(Self::Meter),
            0xa7 => Some(Self::Carelink),
            _ => None,
        }
    }

    /// First byte.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::MySentry => 0xa2,
            Self::Meter => 0xa5,
            Self::Carelink => 0xa7,
        }
    }
}

/// Message type byte (offset 4 of a packet).
///
/// Tags the crate has no body decoder for are kept as `Other` so a message
/// can still be routed and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `0x01`
    Alert,
    /// `0x02`
    AlertCleared,
    /// `0x03`
    DeviceTest,
    /// `0x04`
    PumpStatus,
    /// `0x06`
    PumpAck,
    /// `0x08`
    PumpBackfill,
    /// `0x09`
    FindDevice,
    /// `0x0a`
    DeviceLink,
    /// `0x15`
    ErrorResponse,
    /// `0x28`
    WriteGlucoseHistoryTimestamp,
    /// `0x24`
    ChangeMaxBolus,
    /// `0x40`
    ChangeTime,
    /// `0x42`
    Bolus,
    /// `0x4c`
    ChangeTempBasal,
    /// `0x4d`
    SuspendResume,
    /// `0x5b`
    ButtonPress,
    /// `0x5d`
    PowerOn,
    /// `0x6e`
    ChangeMaxBasal,
    /// `0x70`
    ReadTime,
    /// `0x72`
    GetBattery,
    /// `0x73`
    ReadRemainingInsulin,
    /// `0x80`
    GetHistoryPage,
    /// `0x8d`
    GetPumpModel,
    /// `0x92`
    ReadProfileStd512,
    /// `0x98`
    ReadTempBasal,
    /// `0x9a`
    GetGlucosePage,
    /// `0xc0`
    ReadSettings,
    /// `0xcd`
    ReadCurrentGlucosePage,
    /// `0xce`
    ReadPumpStatus,
    /// Tag with no body decoder.
    Other(u8),
}

const TAGS: &[(u8, MessageType)] = &[
    (0x01, MessageType::Alert),
    (0x02, MessageType::AlertCleared),
    (0x03, MessageType::DeviceTest),
    (0x04, MessageType::PumpStatus),
    (0x06, MessageType::PumpAck),
    (0x08, MessageType::PumpBackfill),
    (0x09, MessageType::FindDevice),
    (0x0a, MessageType::DeviceLink),
    (0x15, MessageType::ErrorResponse),
    (0x24, MessageType::ChangeMaxBolus),
    (0x28, MessageType::WriteGlucoseHistoryTimestamp),
    (0x40, MessageType::ChangeTime),
    (0x42, MessageType::Bolus),
    (0x4c, MessageType::ChangeTempBasal),
    (0x4d, MessageType::SuspendResume),
    (0x5b, MessageType::ButtonPress),
    (0x5d, MessageType::PowerOn),
    (0x6e, MessageType::ChangeMaxBasal),
    (0x70, MessageType::ReadTime),
    (0x72, MessageType::GetBattery),
    (0x73, MessageType::ReadRemainingInsulin),
    (0x80, MessageType::GetHistoryPage),
    (0x8d, MessageType::GetPumpModel),
    (0x92, MessageType::ReadProfileStd512),
    (0x98, MessageType::ReadTempBasal),
    (0x9a, MessageType::GetGlucosePage),
    (0xc0, MessageType::ReadSettings),
    (0xcd, MessageType::ReadCurrentGlucosePage),
    (0xce, MessageType::ReadPumpStatus),
];

impl MessageType {
    /// Decode a tag; unknown tags become `Other`.
    pub fn from_u8(v: u8) -> Self {
        TAGS.iter()
            .find(|(tag, _)| *tag == v)
            .map(|(_, t)| *t)
            .unwrap_or(Self::Other(v))
    }

    /// Tag byte.
    pub fn to_u8(self) -> u8 {
        if let Self::Other(v) = self {
            return v;
        }
        TAGS.iter()
            .find(|(_, t)| *t == self)
            .map(|(tag, _)| *tag)
            .unwrap_or(0)
    }

    /// Requests answered with a 65-byte Carelink body.
    pub fn has_long_response(self) -> bool {
        matches!(
            self,
            Self::ReadTime
                | Self::GetBattery
                | Self::ReadRemainingInsulin
                | Self::GetHistoryPage
                | Self::GetPumpModel
                | Self::ReadProfileStd512
                | Self::ReadTempBasal
                | Self::GetGlucosePage
                | Self::ReadSettings
                | Self::ReadCurrentGlucosePage
                | Self::ReadPumpStatus
        )
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(v) => write!(f, "Other({:#04x})", v),
            known => write!(f, "{:?}({:#04x})", known, known.to_u8()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_table() {
        for (tag, t) in TAGS {
            assert_eq!(MessageType::from_u8(*tag), *t);
            assert_eq!(t.to_u8(), *tag);
        }
    }

    #[test]
    fn unknown_tag_is_kept() {
        let t = MessageType::from_u8(0x99);
        assert_eq!(t, MessageType::Other(0x99));
        assert_eq!(t.to_u8(), 0x99);
        assert_eq!(t.to_string(), "Other(0x99)");
    }

    #[test]
    fn packet_types() {
        assert_eq!(PacketType::from_u8(0xa7), Some(PacketType::Carelink));
        assert_eq!(PacketType::from_u8(0xa5), Some(PacketType::Meter));
        assert_eq!(PacketType::from_u8(0x00), None);
        assert_eq!(PacketType::MySentry.to_u8(), 0xa2);
        assert_eq!(PacketType::Carelink.to_string(), "carelink");
    }
}
