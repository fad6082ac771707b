// libpump-rs/libpump/src/minimed/time_format.rs

//! Packed date layouts found in pump history and glucose records.
//!
//! | layout  | bytes | fields                                                    |
//! |---------|-------|-----------------------------------------------------------|
//! | 5-byte  | 5     | sec/min/hour/day in the low bits, month split over b0/b1  |
//! | 2-byte  | 2     | day, month split over b0/b1, year (date-only records)     |
//! | glucose | 4     | hour/min/day, month split over b0/b1, year                |
//!
//! Pumps happily store impossible dates (after a reset, for example), so
//! every decoder returns `None` instead of failing the record.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Datelike, Utc};

use crate::protocol::parser::slice_at;
use crate::Result;

/// Decode a 5-byte pump timestamp at `offset`.
pub fn parse_5byte_date(data: &[u8], offset: usize) -> Result<Option<NaiveDateTime>> {
    let b = slice_at(data, offset, 5)?;
    let second = u32::from(b[0] & 0x3f);
    let minute = u32::from(b[1] & 0x3f);
    let hour = u32::from(b[2] & 0x1f);
    let day = u32::from(b[3] & 0x1f);
    let month = u32::from(((b[0] & 0xc0) >> 4) | ((b[1] & 0xc0) >> 6));
    let year = i32::from(b[4] & 0x7f) + 2000;
    Ok(NaiveDate::from_ymd_opt(year, month, day).and_then(|d| d.and_hms_opt(hour, minute, second)))
}

/// Decode a 2-byte date-only stamp at `offset` (daily totals).
pub fn parse_2byte_date(data: &[u8], offset: usize) -> Result<Option<NaiveDate>> {
    let b = slice_at(data, offset, 2)?;
    let day = u32::from(b[0] & 0x1f);
    let month = u32::from(((b[0] & 0xe0) >> 4) | ((b[1] & 0x80) >> 7));
    let year = i32::from(b[1] & 0x7f) + 2000;
    Ok(NaiveDate::from_ymd_opt(year, month, day))
}

/// Decode a 4-byte glucose record stamp at `offset`. Glucose stamps carry no seconds.
pub fn parse_glucose_date(data: &[u8], offset: usize) -> Result<Option<NaiveDateTime>> {
    let b = slice_at(data, offset, 4)?;
    let hour = u32::from(b[0] & 0x1f);
    let minute = u32::from(b[1] & 0x3f);
    let day = u32::from(b[2] & 0x1f);
    let month = u32::from(((b[0] & 0xc0) >> 4) | ((b[1] & 0xc0) >> 6));
    let year = i32::from(b[3] & 0x7f) + 2000;
    Ok(NaiveDate::from_ymd_opt(year, month, day).and_then(|d| d.and_hms_opt(hour, minute, 0)))
}

/// Pack a timestamp into the 5-byte history layout.
pub fn encode_5byte_date(t: &NaiveDateTime) -> [u8; 5] {
    let month = t.month() as u8;
    [
        ((month >> 2) << 6) | (t.second() as u8 & 0x3f),
        ((month & 0x03) << 6) | (t.minute() as u8 & 0x3f),
        t.hour() as u8 & 0x1f,
        t.day() as u8 & 0x1f,
        (t.year() - 2000).clamp(0, 0x7f) as u8,
    ]
}

/// Pack a timestamp into the 4-byte glucose layout.
pub fn encode_glucose_date(t: &NaiveDateTime) -> [u8; 4] {
    let month = t.month() as u8;
    [
        ((month >> 2) << 6) | (t.hour() as u8 & 0x1f),
        ((month & 0x03) << 6) | (t.minute() as u8 & 0x3f),
        t.day() as u8 & 0x1f,
        (t.year() - 2000).clamp(0, 0x7f) as u8,
    ]
}

/// Interpret a pump-local time in the pump's fixed zone.
pub fn local_to_utc(local: &NaiveDateTime, zone: &FixedOffset) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(local)
        .single()
        .map(|t| t.with_timezone(&Utc))
}
