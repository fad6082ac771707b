#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::fixtures::{awake_pump, PUMP};
use common::helpers::{init_logging, utc};
use libpump::minimed::{
    DeviceState, MessageBody, MessageType, PumpModel, PumpSession, PumpStatusFlags, TempBasalRateType,
    TempBasalStatus,
};
use libpump::test_support::{push_pump_ack, push_pump_reply, sent_pump_messages, ManualClock};
use libpump::transport::MockRadio;
use libpump::Error;

#[test]
fn temp_basal_is_read_back() {
    init_logging();
    let mut radio = MockRadio::new();
    push_pump_ack(&mut radio, PUMP);
    push_pump_ack(&mut radio, PUMP);
    push_pump_reply(
        &mut radio,
        PUMP,
        MessageType::ReadTempBasal,
        MessageBody::TempBasal(TempBasalStatus {
            rate_type: TempBasalRateType::Absolute,
            rate: 0.8,
            time_remaining: Duration::from_secs(3600),
        }),
    );
    let mut pump = awake_pump();
    let mut device = DeviceState::default();
    let clock = ManualClock::new(utc(2022, 9, 11, 3, 0, 0));

    let status = PumpSession::new(&mut radio, &mut pump, &mut device, &clock)
        .set_temp_basal(0.8, Duration::from_secs(3600))
        .unwrap();
    assert_eq!(status.rate, 0.8);

    let types: Vec<_> = sent_pump_messages(&radio).iter().map(|m| m.message_type).collect();
    assert_eq!(
        types,
        vec![
            MessageType::ChangeTempBasal,
            MessageType::ReadTempBasal,
        ]
    );
}

#[test]
fn bolus_is_refused_while_pump_boluses() {
    init_logging();
    let mut radio = MockRadio::new();
    push_pump_reply(
        &mut radio,
        PUMP,
        MessageType::ReadPumpStatus,
        MessageBody::PumpStatus(PumpStatusFlags {
            bolusing: true,
            suspended: false,
        }),
    );
    let mut pump = awake_pump();
    let mut device = DeviceState::default();
    let clock = ManualClock::new(utc(2022, 9, 11, 3, 0, 0));

    let err = PumpSession::new(&mut radio, &mut pump, &mut device, &clock)
        .set_normal_bolus(3.0)
        .unwrap_err();
    assert!(err.is_certain_failure());
    assert!(matches!(err, Error::Delivery { ref source, .. } if matches!(**source, Error::BolusInProgress)));
    // only the status read went out
    assert_eq!(radio.sent.len(), 1);
}

#[test]
fn foreign_pump_reply_is_crosstalk() {
    let mut radio = MockRadio::new();
    let other = libpump::PumpId::from_bytes([0x11, 0x22, 0x33]);
    push_pump_reply(&mut radio, other, MessageType::GetPumpModel, MessageBody::PumpModel("523".into()));
    let mut pump = awake_pump();
    pump.pump_model = None;
    let mut device = DeviceState::default();
    let clock = ManualClock::new(utc(2022, 9, 11, 3, 0, 0));

    let err = PumpSession::new(&mut radio, &mut pump, &mut device, &clock)
        .get_pump_model()
        .unwrap_err();
    assert!(matches!(err, Error::Crosstalk { .. }));
    assert_eq!(pump.pump_model, None::<PumpModel>);
}
