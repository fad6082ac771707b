// libpump-rs/libpump/src/omnipod/progress.rs

//! Pod lifecycle as the pod reports it and as the host drives pairing.

use derive_more::Display;

use crate::{Error, Result};

/// Four-bit progress code carried in status and version replies.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PodProgressStatus {
    /// Fresh from the factory.
    #[display(fmt = "initialized")]
    Initialized = 0,
    /// Reservoir powered.
    #[display(fmt = "tank power activated")]
    TankPowerActivated = 1,
    /// Reservoir filled.
    #[display(fmt = "tank fill completed")]
    TankFillCompleted = 2,
    /// Address assigned.
    #[display(fmt = "paired")]
    PairingSuccess = 3,
    /// Prime running.
    #[display(fmt = "priming")]
    Priming = 4,
    /// Primed; waiting for the basal schedule.
    #[display(fmt = "ready for basal schedule")]
    ReadyForBasalSchedule = 5,
    /// Basal set; waiting for cannula insertion.
    #[display(fmt = "ready for cannula insertion")]
    ReadyForCannulaInsertion = 6,
    /// Cannula insertion running.
    #[display(fmt = "cannula inserting")]
    CannulaInserting = 7,
    /// Running with more than 50 U left.
    #[display(fmt = "normal")]
    AboveFiftyUnits = 8,
    /// Running with 50 U or less left.
    #[display(fmt = "below 50 units")]
    BelowFiftyUnits = 9,
    /// Unused.
    #[display(fmt = "reserved 10")]
    Reserved10 = 10,
    /// Unused.
    #[display(fmt = "reserved 11")]
    Reserved11 = 11,
    /// Unused.
    #[display(fmt = "reserved 12")]
    Reserved12 = 12,
    /// Logging a fault before shutting down.
    #[display(fmt = "error event logged, shutting down")]
    ErrorEventLoggedShuttingDown = 13,
    /// Prime or insertion did not finish in the allotted window.
    #[display(fmt = "setup window expired")]
    DelayedPrime = 14,
    /// Deactivated, or the pod saw a packet header mismatch.
    #[display(fmt = "inactive")]
    Inactive = 15,
}

impl PodProgressStatus {
    const ALL: [PodProgressStatus; 16] = [
        Self::Initialized,
        Self::TankPowerActivated,
        Self::TankFillCompleted,
        Self::PairingSuccess,
        Self::Priming,
        Self::ReadyForBasalSchedule,
        Self::ReadyForCannulaInsertion,
        Self::CannulaInserting,
        Self::AboveFiftyUnits,
        Self::BelowFiftyUnits,
        Self::Reserved10,
        Self::Reserved11,
        Self::Reserved12,
        Self::ErrorEventLoggedShuttingDown,
        Self::DelayedPrime,
        Self::Inactive,
    ];

    /// Decode a four-bit code.
    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(Error::UnknownValue {
                value: code,
                what: "pod progress",
            })
    }

    /// Four-bit code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Normal running state.
    pub fn ready_for_delivery(self) -> bool {
        matches!(self, Self::AboveFiftyUnits | Self::BelowFiftyUnits)
    }

    /// Setup has not reached the running states.
    pub fn unfinished_pairing(self) -> bool {
        self < Self::AboveFiftyUnits
    }

    /// Where the pod stands in pairing, as far as the pod itself can tell.
    pub fn pairing_state(self) -> PairingState {
        match self {
            Self::Initialized => PairingState::Sleeping,
            Self::TankPowerActivated | Self::TankFillCompleted => PairingState::ReadyToPair,
            _ => PairingState::Paired,
        }
    }
}

/// Coarse pairing state: `sleeping -> readyToPair -> addressAssigned -> paired`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PairingState {
    /// Not powered.
    #[display(fmt = "sleeping")]
    Sleeping,
    /// Powered and filled; no address yet.
    #[display(fmt = "ready to pair")]
    ReadyToPair,
    /// Address taken.
    #[display(fmt = "address assigned")]
    AddressAssigned,
    /// Setup sent.
    #[display(fmt = "paired")]
    Paired,
}

/// Host-side pairing and setup steps, persisted so an interrupted setup can resume.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SetupProgress {
    /// Address assigned.
    #[display(fmt = "address assigned")]
    AddressAssigned,
    /// Setup sent.
    #[display(fmt = "pod configured")]
    PodConfigured,
    /// Prime about to be sent.
    #[display(fmt = "starting prime")]
    StartingPrime,
    /// Prime sent.
    #[display(fmt = "priming")]
    Priming,
    /// Basal schedule about to be sent.
    #[display(fmt = "setting initial basal schedule")]
    SettingInitialBasalSchedule,
    /// Basal schedule accepted.
    #[display(fmt = "initial basal schedule set")]
    InitialBasalScheduleSet,
    /// Insertion about to be sent.
    #[display(fmt = "starting cannula insertion")]
    StartingInsertCannula,
    /// Insertion sent.
    #[display(fmt = "cannula inserting")]
    CannulaInserting,
    /// Setup finished.
    #[display(fmt = "completed")]
    Completed,
}

impl SetupProgress {
    /// Prime still has to be sent.
    pub fn priming_needed(self) -> bool {
        self < Self::Priming
    }

    /// Basal schedule still has to be sent.
    pub fn needs_initial_basal_schedule(self) -> bool {
        self < Self::InitialBasalScheduleSet
    }

    /// Cannula insertion still has to be sent.
    pub fn needs_cannula_insertion(self) -> bool {
        self < Self::CannulaInserting
    }

    /// Pairing state these steps imply.
    pub fn pairing_state(self) -> PairingState {
        match self {
            Self::AddressAssigned => PairingState::AddressAssigned,
            _ => PairingState::Paired,
        }
    }
}
