#[path = "../common/mod.rs"]
mod common;

use libpump::transport::{ListenParams, MockRadio, MockReply, RadioTransport};
use libpump::Error;

#[test]
fn mock_radio_records_and_replays() {
    let mut radio = MockRadio::new();
    radio.push_frame(vec![0x01, 0x02], -55);
    let params = ListenParams::new(200, 1, 0, 2);
    let frame = radio.send_and_listen(&[0xaa], &params).unwrap();
    assert_eq!(frame.data, vec![0x01, 0x02]);
    assert_eq!(frame.rssi, -55);
    assert_eq!(radio.sent, vec![vec![0xaa]]);
    assert_eq!(radio.sent_params, vec![Some(params)]);
}

#[test]
fn empty_queue_times_out() {
    let mut radio = MockRadio::new();
    let err = radio.send_and_listen(&[0xaa], &ListenParams::default()).unwrap_err();
    assert!(matches!(err, Error::Timeout));
}

#[test]
fn bridge_failures_surface() {
    let mut radio = MockRadio::new();
    radio.push_reply(MockReply::Peripheral("bridge reset".into()));
    radio.send_only(&[0x01], 3, 10).unwrap();
    let err = radio.listen(100).unwrap_err();
    assert!(matches!(err, Error::PeripheralError(ref m) if m == "bridge reset"));
    assert_eq!(radio.sent_params, vec![None]);
}

#[test]
fn total_timeout_grows_with_retries() {
    let once = ListenParams::new(165, 0, 0, 0).total_timeout_ms(20);
    let thrice = ListenParams::new(165, 0, 0, 2).total_timeout_ms(20);
    assert!(thrice > once);
    assert!(once >= 165);
}
