#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use chrono::TimeDelta;
use common::fixtures::{running_pod, POD_LOT, POD_TID, PRIMING_FAULT};
use common::helpers::{hex_bytes, init_logging, utc};
use libpump::omnipod::{
    AlertSet, BeepType, CancelDeliveryType, DeliveryStatus, MessageBlock, NonceState, PodProgressStatus, PodSession,
    StatusResponse,
};
use libpump::test_support::{FakePod, ManualClock};
use libpump::{DeliveryCertainty, Error};

fn status(delivery_status: DeliveryStatus) -> Vec<MessageBlock> {
    vec![MessageBlock::StatusResponse(StatusResponse {
        delivery_status,
        progress_status: PodProgressStatus::AboveFiftyUnits,
        time_active: Duration::from_secs(6 * 3600),
        delivered_units: 25.0,
        message_sequence: 0,
        not_delivered_units: 0.0,
        alerts: AlertSet::default(),
        reservoir_level: None,
    })]
}

fn nonces(radio: &FakePod) -> Vec<u32> {
    radio
        .received
        .iter()
        .filter_map(|m| m.blocks.iter().find_map(MessageBlock::nonce))
        .collect()
}

#[test]
fn nonces_follow_the_pod_sequence() {
    init_logging();
    let mut radio = FakePod::new();
    radio.push_reply(status(DeliveryStatus::BolusInProgress));
    radio.push_reply(status(DeliveryStatus::BolusAndTempBasal));
    radio.push_reply(status(DeliveryStatus::Suspended));
    let mut pod = running_pod();
    let clock = ManualClock::new(utc(2024, 3, 1, 14, 0, 0));

    let mut session = PodSession::new(&mut radio, &mut pod, &clock);
    session.bolus(0.5).unwrap();
    session.set_temp_basal(0.0, Duration::from_secs(1800)).unwrap();
    clock.advance(TimeDelta::minutes(10));
    session.suspend_delivery().unwrap();

    let mut expected = NonceState::new(POD_LOT, POD_TID);
    let mut want = Vec::new();
    for _ in 0..3 {
        want.push(expected.current());
        expected.advance();
    }
    assert_eq!(nonces(&radio), want);
    assert_eq!(want[0], 0x8c61ee59);

    // both doses stopped by the suspend, the bolus had already finished
    assert!(pod.unfinalized_bolus.is_none());
    assert!(pod.unfinalized_temp_basal.is_none());
    assert_eq!(pod.finalized_doses.len(), 2);
    assert!(pod.suspended);
}

#[test]
fn lost_reply_is_settled_by_next_status() {
    let mut radio = FakePod::new();
    let mut pod = running_pod();
    let clock = ManualClock::new(utc(2024, 3, 1, 14, 0, 0));

    let err = PodSession::new(&mut radio, &mut pod, &clock).bolus(1.0).unwrap_err();
    assert!(matches!(
        err,
        Error::Delivery {
            certainty: DeliveryCertainty::Uncertain,
            ..
        }
    ));
    assert!(pod.delivery_schedule_uncertain());

    radio.push_reply(status(DeliveryStatus::BolusInProgress));
    PodSession::new(&mut radio, &mut pod, &clock).get_status().unwrap();
    assert!(!pod.delivery_schedule_uncertain());
    assert!(pod.unfinalized_bolus.is_some());
}

#[test]
fn bad_nonce_then_retry_succeeds() {
    let mut radio = FakePod::new();
    radio.push_reply(vec![MessageBlock::decode(&hex_bytes("060314217a")).unwrap()]);
    radio.push_reply(status(DeliveryStatus::ScheduledBasal));
    let mut pod = running_pod();
    let clock = ManualClock::new(utc(2024, 3, 1, 14, 0, 0));

    let mut session = PodSession::new(&mut radio, &mut pod, &clock);
    let err = session
        .cancel_delivery(CancelDeliveryType::TEMP_BASAL, BeepType::NoBeep)
        .unwrap_err();
    assert!(err.is_certain_failure());
    session
        .cancel_delivery(CancelDeliveryType::TEMP_BASAL, BeepType::NoBeep)
        .unwrap();

    let sent = nonces(&radio);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], NonceState::resync(POD_LOT, POD_TID, 0x217a, sent[0], 0).current());
}

#[test]
fn faulted_pod_refuses_delivery() {
    let mut radio = FakePod::new();
    radio.push_reply(vec![MessageBlock::decode(&hex_bytes(PRIMING_FAULT)).unwrap()]);
    let mut pod = running_pod();
    let clock = ManualClock::new(utc(2024, 3, 1, 14, 0, 0));

    let detailed = PodSession::new(&mut radio, &mut pod, &clock)
        .get_detailed_status()
        .unwrap();
    assert!(detailed.is_faulted());

    let err = PodSession::new(&mut radio, &mut pod, &clock)
        .set_temp_basal(1.0, Duration::from_secs(1800))
        .unwrap_err();
    assert!(matches!(err, Error::PodFault { code: 0x5c }));
    assert_eq!(radio.received.len(), 1);
}

#[cfg(feature = "serde")]
#[test]
fn pod_state_survives_a_restart() {
    let mut radio = FakePod::new();
    radio.push_reply(status(DeliveryStatus::BolusInProgress));
    let mut pod = running_pod();
    let clock = ManualClock::new(utc(2024, 3, 1, 14, 0, 0));
    PodSession::new(&mut radio, &mut pod, &clock).bolus(2.0).unwrap();

    let blob = pod.to_blob().unwrap();
    let restored = libpump::omnipod::PodState::from_blob(&blob).unwrap();
    assert_eq!(restored.current_nonce(), pod.current_nonce());
    assert_eq!(restored.unfinalized_bolus, pod.unfinalized_bolus);
    assert_eq!(restored.message_transport_state, pod.message_transport_state);
}
