// libpump-rs/libpump/src/omnipod/blocks/alerts.rs

//! Alert configuration, acknowledgement and beep setup.

use crate::omnipod::alert::{AlertConfiguration, AlertSet, BeepType};
use crate::protocol::parser::{be_u32_at, byte_at, length_prefixed_block};
use crate::{Error, Result};

const CONFIGURE_ALERTS_TAG: u8 = 0x19;
const ACKNOWLEDGE_ALERT_TAG: u8 = 0x11;
const BEEP_CONFIG_TAG: u8 = 0x1e;

/// `19 len [nonce:4] [config:6]...`
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigureAlerts {
    /// Command nonce.
    pub nonce: u32,
    /// Slots to configure.
    pub configurations: Vec<AlertConfiguration>,
}

impl ConfigureAlerts {
    /// Configure `configurations`.
    pub fn new(nonce: u32, configurations: Vec<AlertConfiguration>) -> Self {
        Self {
            nonce,
            configurations,
        }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let len = 4 + self.configurations.len() * AlertConfiguration::LEN;
        let mut out = Vec::with_capacity(len + 2);
        out.push(CONFIGURE_ALERTS_TAG);
        out.push(len as u8);
        out.extend_from_slice(&self.nonce.to_be_bytes());
        for config in &self.configurations {
            out.extend_from_slice(&config.encode());
        }
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        let nonce = be_u32_at(block, 2)?;
        let configs = &block[6..];
        if configs.len() % AlertConfiguration::LEN != 0 {
            return Err(Error::InvalidData(format!(
                "{} bytes of alert configurations",
                configs.len()
            )));
        }
        let configurations = configs
            .chunks(AlertConfiguration::LEN)
            .map(AlertConfiguration::decode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(nonce, configurations))
    }
}

/// `11 05 [nonce:4] [alert mask]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgeAlert {
    /// Command nonce.
    pub nonce: u32,
    /// Alerts to silence.
    pub alerts: AlertSet,
}

impl AcknowledgeAlert {
    /// Acknowledge `alerts`.
    pub fn new(nonce: u32, alerts: AlertSet) -> Self {
        Self { nonce, alerts }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![ACKNOWLEDGE_ALERT_TAG, 5];
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.push(self.alerts.bits());
        out
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self::new(
            be_u32_at(block, 2)?,
            AlertSet::from_bits(byte_at(block, 6)?),
        ))
    }
}

/// Completion beep and reminder interval for one kind of delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramBeeps {
    /// Beep when the delivery ends.
    pub completion_beep: bool,
    /// Minutes between reminders, 0 for none.
    pub reminder_minutes: u8,
}

impl ProgramBeeps {
    fn encode(self) -> u8 {
        u8::from(self.completion_beep) << 6 | (self.reminder_minutes & 0x3f)
    }

    fn decode(raw: u8) -> Self {
        Self {
            completion_beep: raw & 0x40 != 0,
            reminder_minutes: raw & 0x3f,
        }
    }
}

/// `1e 04 [beep type] [basal] [temp basal] [bolus]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepConfig {
    /// Beep played now.
    pub beep_type: BeepType,
    /// Basal program beeps.
    pub basal: ProgramBeeps,
    /// Temp basal program beeps.
    pub temp_basal: ProgramBeeps,
    /// Bolus program beeps.
    pub bolus: ProgramBeeps,
}

impl BeepConfig {
    /// Play `beep_type` once without touching the delivery beeps.
    pub fn play(beep_type: BeepType) -> Self {
        Self {
            beep_type,
            basal: ProgramBeeps::default(),
            temp_basal: ProgramBeeps::default(),
            bolus: ProgramBeeps::default(),
        }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        vec![
            BEEP_CONFIG_TAG,
            4,
            self.beep_type.code(),
            self.basal.encode(),
            self.temp_basal.encode(),
            self.bolus.encode(),
        ]
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        Ok(Self {
            beep_type: BeepType::from_code(byte_at(block, 2)?)?,
            basal: ProgramBeeps::decode(byte_at(block, 3)?),
            temp_basal: ProgramBeeps::decode(byte_at(block, 4)?),
            bolus: ProgramBeeps::decode(byte_at(block, 5)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omnipod::alert::{Alert, AlertTrigger, BeepRepeat};
    use crate::utils::{bytes_to_hex, parse_hex};
    use std::time::Duration;

    #[test]
    fn configure_low_reservoir_alert() {
        let config = AlertConfiguration::new(
            Alert::LowReservoir,
            true,
            Duration::ZERO,
            AlertTrigger::UnitsRemaining(20.0),
            BeepRepeat::Every1MinuteFor3MinutesAndRepeatEvery60Minutes,
            BeepType::BipBeepBipBeepBipBeepBipBeep,
        );
        let block = ConfigureAlerts::new(0x01020304, vec![config]);
        assert_eq!(bytes_to_hex(&block.encode()), "190a010203044c0000c80102");
        let back = ConfigureAlerts::decode(&block.encode()).unwrap();
        assert_eq!(back.configurations.len(), 1);
        assert_eq!(back.configurations[0].alert, Alert::LowReservoir);
    }

    #[test]
    fn configurations_must_be_whole() {
        let raw = parse_hex("1909010203044c0000c801").unwrap();
        assert!(matches!(ConfigureAlerts::decode(&raw), Err(Error::InvalidData(_))));
    }

    #[test]
    fn acknowledge_alerts() {
        let alerts: AlertSet = [Alert::ExpirationAdvisory, Alert::LowReservoir].into_iter().collect();
        let block = AcknowledgeAlert::new(0xf9dfdcb3, alerts);
        assert_eq!(bytes_to_hex(&block.encode()), "1105f9dfdcb314");
        assert_eq!(AcknowledgeAlert::decode(&block.encode()).unwrap(), block);
    }

    #[test]
    fn beep_config() {
        let block = BeepConfig {
            beep_type: BeepType::BeepConfigNoBeep,
            basal: ProgramBeeps::default(),
            temp_basal: ProgramBeeps {
                completion_beep: true,
                reminder_minutes: 0,
            },
            bolus: ProgramBeeps {
                completion_beep: true,
                reminder_minutes: 60,
            },
        };
        let raw = block.encode();
        assert_eq!(bytes_to_hex(&raw), "1e040f00407c");
        assert_eq!(BeepConfig::decode(&raw).unwrap(), block);
        assert_eq!(bytes_to_hex(&BeepConfig::play(BeepType::BipBip).encode()), "1e0403000000");
    }
}
