#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use chrono::{FixedOffset, TimeDelta};
use common::fixtures::{ASSIGN_ADDRESS_REPLY, POD, SETUP_POD_REPLY};
use common::helpers::{hex_bytes, init_logging, utc};
use libpump::omnipod::{
    DeliveryStatus, MessageBlock, MessageBlockType, PodPairing, PodProgressStatus, PodSession, SetupProgress,
    StatusResponse,
};
use libpump::omnipod::alert::AlertSet;
use libpump::test_support::{FakePod, ManualClock};
use libpump::BasalSchedule;

fn block(hex: &str) -> Vec<MessageBlock> {
    vec![MessageBlock::decode(&hex_bytes(hex)).unwrap()]
}

fn status(delivery_status: DeliveryStatus, progress_status: PodProgressStatus) -> Vec<MessageBlock> {
    vec![MessageBlock::StatusResponse(StatusResponse {
        delivery_status,
        progress_status,
        time_active: Duration::from_secs(120),
        delivered_units: 0.0,
        message_sequence: 0,
        not_delivered_units: 0.0,
        alerts: AlertSet::default(),
        reservoir_level: None,
    })]
}

#[test]
fn new_pod_goes_from_pairing_to_delivery() -> anyhow::Result<()> {
    init_logging();
    let mut radio = FakePod::new();
    radio.push_reply(block(ASSIGN_ADDRESS_REPLY));
    radio.push_reply(block(SETUP_POD_REPLY));
    // fault config, setup alerts, prime
    for _ in 0..3 {
        radio.push_reply(status(DeliveryStatus::Priming, PodProgressStatus::Priming));
    }
    // status after priming, expiration advisory
    for _ in 0..2 {
        radio.push_reply(status(DeliveryStatus::Suspended, PodProgressStatus::ReadyForBasalSchedule));
    }
    // basal schedule, expiration alerts, insertion
    for _ in 0..3 {
        radio.push_reply(status(DeliveryStatus::ScheduledBasal, PodProgressStatus::ReadyForCannulaInsertion));
    }
    radio.push_reply(status(DeliveryStatus::ScheduledBasal, PodProgressStatus::AboveFiftyUnits));

    let clock = ManualClock::new(utc(2024, 3, 1, 8, 0, 0));
    let zone = FixedOffset::west_opt(5 * 3600).unwrap();

    let mut pairing = PodPairing::new(&mut radio, &clock);
    let mut pod = pairing.assign_address_to(POD)?;
    pairing.setup_pod(&mut pod, zone)?;
    assert_eq!(pod.setup_progress, SetupProgress::PodConfigured);

    let schedule = BasalSchedule::new(&[(0, 0.8), (420, 1.1), (1260, 0.9)])?;
    let mut session = PodSession::new(&mut radio, &mut pod, &clock);
    let wait = session.prime()?;
    clock.advance(TimeDelta::from_std(wait)?);
    session.finish_prime()?;
    let wait = session.insert_cannula(&schedule, zone)?;
    clock.advance(TimeDelta::from_std(wait)?);
    assert!(session.check_insertion_completed()?);

    assert_eq!(pod.setup_progress, SetupProgress::Completed);
    assert!(pod.is_active());
    assert_eq!(pod.expires_at, pod.soft_expiration());
    assert_eq!(radio.received.len(), 11);
    assert_eq!(radio.received[2].first_block_type(), Some(MessageBlockType::FaultConfig));
    assert_eq!(radio.received[10].first_block_type(), Some(MessageBlockType::GetStatus));
    Ok(())
}

#[test]
fn silent_pod_leaves_setup_pending() {
    let mut radio = FakePod::new();
    radio.push_reply(block(ASSIGN_ADDRESS_REPLY));
    let clock = ManualClock::new(utc(2024, 3, 1, 8, 0, 0));
    let mut pairing = PodPairing::new(&mut radio, &clock);
    let mut pod = pairing.assign_address_to(POD).unwrap();

    // a silent pod leaves setup to be retried
    assert!(pairing.setup_pod(&mut pod, FixedOffset::east_opt(0).unwrap()).is_err());
    assert_eq!(pod.setup_progress, SetupProgress::AddressAssigned);
}
