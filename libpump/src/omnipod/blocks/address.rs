// libpump-rs/libpump/src/omnipod/blocks/address.rs

//! Pairing blocks: address assignment, pod setup and the version replies
//! the pod sends to both.

use std::fmt;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::constants::POD_PULSE_SIZE;
use crate::omnipod::progress::PodProgressStatus;
use crate::protocol::parser::{be_u16_at, be_u32_at, byte_at, expect_response_code, length_prefixed_block, slice_at};
use crate::types::PodAddress;
use crate::{Error, Result};

const ASSIGN_ADDRESS_TAG: u8 = 0x07;
const SETUP_POD_TAG: u8 = 0x03;
const VERSION_RESPONSE_TAG: u8 = 0x01;

const ASSIGN_ADDRESS_VERSION_LEN: u8 = 0x15;
const SETUP_POD_VERSION_LEN: u8 = 0x1b;

/// Pulse size field of a healthy pod, in hundred-thousandths of a unit.
const EXPECTED_PULSE_SIZE: u16 = 0x1388;

/// `07 04 [address:4]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignAddress {
    /// Address to assign.
    pub address: PodAddress,
}

impl AssignAddress {
    /// Assign `address`.
    pub fn new(address: PodAddress) -> Self {
        Self { address }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![ASSIGN_ADDRESS_TAG, 4];
        out.extend_from_slice(&self.address.to_be_bytes());
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self::new(PodAddress::new(be_u32_at(block, 2)?)))
    }
}

/// `03 13 [address:4] 14 [packet timeout] [month day year hour minute] [lot:4] [tid:4]`
///
/// The date is the pod's local wall-clock time, year counted from 2000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPod {
    /// Address assigned earlier.
    pub address: PodAddress,
    /// Local wall-clock time for the pod.
    pub date: NaiveDateTime,
    /// Lot number from the version reply.
    pub lot: u32,
    /// TID from the version reply.
    pub tid: u32,
    /// Packet timeout; zero in practice.
    pub packet_timeout: u8,
}

impl SetupPod {
    const LEN: u8 = 0x13;

    /// Setup for `address`.
    pub fn new(address: PodAddress, date: NaiveDateTime, lot: u32, tid: u32, packet_timeout: u8) -> Self {
        Self {
            address,
            date,
            lot,
            tid,
            packet_timeout,
        }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![SETUP_POD_TAG, Self::LEN];
        out.extend_from_slice(&self.address.to_be_bytes());
        out.extend_from_slice(&[
            0x14,
            self.packet_timeout,
            self.date.month() as u8,
            self.date.day() as u8,
            (self.date.year() - 2000).clamp(0, 255) as u8,
            self.date.hour() as u8,
            self.date.minute() as u8,
        ]);
        out.extend_from_slice(&self.lot.to_be_bytes());
        out.extend_from_slice(&self.tid.to_be_bytes());
        out
    }

    /// Parse from the tag byte on; the year must be 2000 or later.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        let fields = slice_at(block, 8, 5)?;
        let date = NaiveDate::from_ymd_opt(2000 + i32::from(fields[2]), u32::from(fields[0]), u32::from(fields[1]))
            .and_then(|d| d.and_hms_opt(u32::from(fields[3]), u32::from(fields[4]), 0))
            .ok_or_else(|| Error::InvalidData(format!("setup pod date {:02x?}", fields)))?;
        Ok(Self {
            address: PodAddress::new(be_u32_at(block, 2)?),
            date,
            lot: be_u32_at(block, 13)?,
            tid: be_u32_at(block, 17)?,
            packet_timeout: byte_at(block, 7)?,
        })
    }
}

/// `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FirmwareVersion {
    /// Major.
    pub major: u8,
    /// Minor.
    pub minor: u8,
    /// Patch.
    pub patch: u8,
}

impl FirmwareVersion {
    fn decode(data: &[u8]) -> Self {
        Self {
            major: data[0],
            minor: data[1],
            patch: data[2],
        }
    }

    fn encode(&self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Fields only one of the two version reply layouts carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VersionDetails {
    /// Reply to assign address.
    AssignAddress {
        /// Receiver gain, two bits.
        receiver_gain: u8,
        /// Signal strength, six bits.
        rssi: u8,
    },
    /// Reply to setup pod: the pod's delivery parameters.
    SetupPod {
        /// Seconds between bolus pulses.
        seconds_per_bolus_pulse: f64,
        /// Seconds between prime pulses.
        seconds_per_prime_pulse: f64,
        /// Units the prime delivers.
        prime_units: f64,
        /// Units the cannula insertion delivers.
        cannula_insertion_units: f64,
        /// How long the pod runs.
        service_duration: Duration,
    },
}

/// `01 15 ...` after assign address, `01 1b ...` after setup pod.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionResponse {
    /// PM firmware.
    pub pm_version: FirmwareVersion,
    /// PI firmware.
    pub pi_version: FirmwareVersion,
    /// Product ID; 2 for Eros.
    pub product_id: u8,
    /// Pod lifecycle stage.
    pub progress_status: PodProgressStatus,
    /// Lot number.
    pub lot: u32,
    /// TID.
    pub tid: u32,
    /// The pod's address.
    pub address: PodAddress,
    /// Layout specific fields.
    pub details: VersionDetails,
}

impl VersionResponse {
    /// The short layout sent after assign address.
    pub fn is_assign_address_response(&self) -> bool {
        matches!(self.details, VersionDetails::AssignAddress { .. })
    }

    /// The long layout sent after setup pod.
    pub fn is_setup_pod_response(&self) -> bool {
        matches!(self.details, VersionDetails::SetupPod { .. })
    }

    /// Parse either layout; the pulse size must be 0.05 U.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        expect_response_code(block, VERSION_RESPONSE_TAG)?;
        match block[1] {
            ASSIGN_ADDRESS_VERSION_LEN => Ok(Self {
                pm_version: FirmwareVersion::decode(&block[2..5]),
                pi_version: FirmwareVersion::decode(&block[5..8]),
                product_id: block[8],
                progress_status: PodProgressStatus::from_code(block[9])?,
                lot: be_u32_at(block, 10)?,
                tid: be_u32_at(block, 14)?,
                address: PodAddress::new(be_u32_at(block, 19)?),
                details: VersionDetails::AssignAddress {
                    receiver_gain: block[18] >> 6,
                    rssi: block[18] & 0x3f,
                },
            }),
            SETUP_POD_VERSION_LEN => {
                let pulse_size = be_u16_at(block, 2)?;
                if pulse_size != EXPECTED_PULSE_SIZE {
                    return Err(Error::InvalidData(format!(
                        "pod reports pulse size {:#06x}",
                        pulse_size
                    )));
                }
                Ok(Self {
                    pm_version: FirmwareVersion::decode(&block[9..12]),
                    pi_version: FirmwareVersion::decode(&block[12..15]),
                    product_id: block[15],
                    progress_status: PodProgressStatus::from_code(block[16])?,
                    lot: be_u32_at(block, 17)?,
                    tid: be_u32_at(block, 21)?,
                    address: PodAddress::new(be_u32_at(block, 25)?),
                    details: VersionDetails::SetupPod {
                        seconds_per_bolus_pulse: f64::from(block[4]) / 8.0,
                        seconds_per_prime_pulse: f64::from(block[5]) / 8.0,
                        prime_units: f64::from(block[6]) * POD_PULSE_SIZE,
                        cannula_insertion_units: f64::from(block[7]) * POD_PULSE_SIZE,
                        service_duration: Duration::from_secs(u64::from(block[8]) * 3600),
                    },
                })
            }
            other => Err(Error::InvalidData(format!(
                "version response of length {:#04x}",
                other
            ))),
        }
    }

    /// Wire bytes in the layout `details` selects.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![VERSION_RESPONSE_TAG];
        match self.details {
            VersionDetails::AssignAddress { receiver_gain, rssi } => {
                out.push(ASSIGN_ADDRESS_VERSION_LEN);
                out.extend_from_slice(&self.pm_version.encode());
                out.extend_from_slice(&self.pi_version.encode());
                out.push(self.product_id);
                out.push(self.progress_status.code());
                out.extend_from_slice(&self.lot.to_be_bytes());
                out.extend_from_slice(&self.tid.to_be_bytes());
                out.push((receiver_gain & 0x03) << 6 | (rssi & 0x3f));
                out.extend_from_slice(&self.address.to_be_bytes());
            }
            VersionDetails::SetupPod {
                seconds_per_bolus_pulse,
                seconds_per_prime_pulse,
                prime_units,
                cannula_insertion_units,
                service_duration,
            } => {
                out.push(SETUP_POD_VERSION_LEN);
                out.extend_from_slice(&EXPECTED_PULSE_SIZE.to_be_bytes());
                out.push((seconds_per_bolus_pulse * 8.0).round() as u8);
                out.push((seconds_per_prime_pulse * 8.0).round() as u8);
                out.push((prime_units / POD_PULSE_SIZE).round() as u8);
                out.push((cannula_insertion_units / POD_PULSE_SIZE).round() as u8);
                out.push((service_duration.as_secs() / 3600) as u8);
                out.extend_from_slice(&self.pm_version.encode());
                out.extend_from_slice(&self.pi_version.encode());
                out.push(self.product_id);
                out.push(self.progress_status.code());
                out.extend_from_slice(&self.lot.to_be_bytes());
                out.extend_from_slice(&self.tid.to_be_bytes());
                out.extend_from_slice(&self.address.to_be_bytes());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{bytes_to_hex, parse_hex};

    const ASSIGN_REPLY: &str = "011502070002070002020000a377000603091f1f00ee87";
    const SETUP_REPLY: &str = "011b13881008340a5002070002070002030000a377000603091f00ee87";

    #[test]
    fn assign_address_block() {
        let block = AssignAddress::new(PodAddress::new(0x1f01482a));
        assert_eq!(bytes_to_hex(&block.encode()), "07041f01482a");
        assert_eq!(AssignAddress::decode(&block.encode()).unwrap(), block);
    }

    #[test]
    fn setup_pod_block() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 11)
            .unwrap()
            .and_hms_opt(21, 7, 0)
            .unwrap();
        let block = SetupPod::new(PodAddress::new(0x1f00ee87), date, 0xa377, 0x060309, 4);
        let raw = block.encode();
        assert_eq!(bytes_to_hex(&raw), "03131f00ee871404060b1815070000a37700060309");
        assert_eq!(SetupPod::decode(&raw).unwrap(), block);
    }

    #[test]
    fn assign_address_version_reply() {
        let reply = VersionResponse::decode(&parse_hex(ASSIGN_REPLY).unwrap()).unwrap();
        assert!(reply.is_assign_address_response());
        assert_eq!(reply.pm_version.to_string(), "2.7.0");
        assert_eq!(reply.pi_version.to_string(), "2.7.0");
        assert_eq!(reply.progress_status, PodProgressStatus::TankFillCompleted);
        assert_eq!(reply.lot, 0xa377);
        assert_eq!(reply.tid, 0x060309);
        assert_eq!(reply.address, PodAddress::new(0x1f00ee87));
        assert_eq!(
            reply.details,
            VersionDetails::AssignAddress {
                receiver_gain: 0,
                rssi: 0x1f
            }
        );
        assert_eq!(bytes_to_hex(&reply.encode()), ASSIGN_REPLY);
    }

    #[test]
    fn setup_pod_version_reply() {
        let reply = VersionResponse::decode(&parse_hex(SETUP_REPLY).unwrap()).unwrap();
        assert!(reply.is_setup_pod_response());
        assert_eq!(reply.progress_status, PodProgressStatus::PairingSuccess);
        match reply.details {
            VersionDetails::SetupPod {
                seconds_per_bolus_pulse,
                seconds_per_prime_pulse,
                prime_units,
                cannula_insertion_units,
                service_duration,
            } => {
                assert_eq!(seconds_per_bolus_pulse, 2.0);
                assert_eq!(seconds_per_prime_pulse, 1.0);
                assert!((prime_units - 2.6).abs() < 1e-9);
                assert!((cannula_insertion_units - 0.5).abs() < 1e-9);
                assert_eq!(service_duration, Duration::from_secs(80 * 3600));
            }
            other => panic!("expected setup details, got {:?}", other),
        }
        assert_eq!(bytes_to_hex(&reply.encode()), SETUP_REPLY);
    }

    #[test]
    fn wrong_pulse_size_is_rejected() {
        let mut raw = parse_hex(SETUP_REPLY).unwrap();
        raw[3] = 0x89;
        assert!(matches!(VersionResponse::decode(&raw), Err(Error::InvalidData(_))));
        let mut raw = parse_hex(ASSIGN_REPLY).unwrap();
        raw[1] = 0x14;
        raw.pop();
        assert!(matches!(VersionResponse::decode(&raw), Err(Error::InvalidData(_))));
    }
}
