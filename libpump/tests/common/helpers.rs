// helpers.rs: logging setup and small conversions for integration tests

use chrono::{DateTime, TimeZone, Utc};

/// Route `log` output through env_logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn hex_bytes(s: &str) -> Vec<u8> {
    hex::decode(s).expect("valid hex in test vector")
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}
