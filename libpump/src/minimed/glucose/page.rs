// libpump-rs/libpump/src/minimed/glucose/page.rs

//! Glucose history pages and the walk that stamps their records.

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::events::GlucoseEvent;
use super::timestamper::add_timestamps;
use crate::minimed::history_page::verify_page_crc;
use crate::Result;

/// A decoded glucose page, oldest record first.
///
/// When some sensor reading on the page has no anchor to take its time from,
/// the page is flagged with `needs_timestamp` and returns no records; the
/// caller asks the pump to write a fresh sensor timestamp and reads it again.
#[derive(Debug, Clone, PartialEq)]
pub struct GlucosePage {
    events: Vec<GlucoseEvent>,
    needs_timestamp: bool,
}

impl GlucosePage {
    /// Check the CRC, decode back to front and timestamp the records.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let body = verify_page_crc(data)?;
        let reversed: Vec<u8> = body.iter().rev().copied().collect();

        let mut events = Vec::new();
        let mut offset = 0;
        while offset < reversed.len() {
            if reversed[offset] == 0 {
                offset += 1;
                continue;
            }
            let event = GlucoseEvent::decode(&reversed[offset..])?;
            offset += event.length();
            events.push(event);
        }
        // read back to front; restore write order
        events.reverse();

        let run = add_timestamps(events);
        if run.has_unanchored_relative() {
            warn!(
                "glucose page: {} records before the first sensor timestamp",
                run.unprocessed.len()
            );
            return Ok(Self {
                events: Vec::new(),
                needs_timestamp: true,
            });
        }
        let mut events = run.unprocessed;
        events.extend(run.processed);
        debug!("glucose page: {} records", events.len());
        Ok(Self {
            events,
            needs_timestamp: false,
        })
    }

    /// Records in write order.
    pub fn events(&self) -> &[GlucoseEvent] {
        &self.events
    }

    /// A reading came before any sensor timestamp; write one and read again.
    pub fn needs_timestamp(&self) -> bool {
        self.needs_timestamp
    }
}

/// A glucose record on the absolute time line.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimestampedGlucoseEvent {
    /// The record.
    pub event: GlucoseEvent,
    /// When it was written, UTC.
    pub date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HISTORY_PAGE_LENGTH;
    use crate::minimed::glucose::events::{GlucoseDetails, GlucoseEventType};
    use crate::protocol::checksum::crc16;
    use crate::utils::parse_hex;
    use crate::Error;

    /// Build a page from records given opcode first; the page stores them reversed.
    fn build_page(records: &[&str]) -> Vec<u8> {
        let mut body: Vec<u8> = Vec::new();
        for r in records {
            let mut bytes = parse_hex(r).unwrap();
            bytes.reverse();
            body.extend(bytes);
        }
        body.resize(HISTORY_PAGE_LENGTH - 2, 0);
        let crc = crc16(&body);
        body.extend_from_slice(&crc.to_be_bytes());
        body
    }

    #[test]
    fn anchored_page() {
        let page = build_page(&["0814b62810", "30", "13", "34"]);
        let page = GlucosePage::parse(&page).unwrap();
        assert!(!page.needs_timestamp());
        let types: Vec<_> = page.events().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                GlucoseEventType::SensorTimestamp,
                GlucoseEventType::SensorData,
                GlucoseEventType::NineteenSomething,
                GlucoseEventType::SensorData,
            ]
        );
        assert_eq!(
            page.events()[3].details,
            GlucoseDetails::SensorData { sgv: 0x34 * 2 }
        );
        assert_eq!(
            page.events()[3].timestamp.unwrap().to_string(),
            "2016-02-08 21:04:00"
        );
    }

    #[test]
    fn reading_without_anchor_needs_timestamp() {
        let page = build_page(&["30", "0814b62810", "34"]);
        let page = GlucosePage::parse(&page).unwrap();
        assert!(page.needs_timestamp());
        assert!(page.events().is_empty());
    }

    #[test]
    fn own_time_records_before_anchor_are_fine() {
        let page = build_page(&["0a0bae0a0e", "0814b62810", "34"]);
        let page = GlucosePage::parse(&page).unwrap();
        assert!(!page.needs_timestamp());
        assert_eq!(page.events().len(), 3);
        assert_eq!(page.events()[0].event_type, GlucoseEventType::BatteryChange);
    }

    #[test]
    fn unknown_opcode_fails_page() {
        let page = build_page(&["0814b62810", "04"]);
        assert!(matches!(
            GlucosePage::parse(&page),
            Err(Error::UnknownEventType(0x04))
        ));
    }

    #[test]
    fn crc_failure() {
        let mut page = build_page(&["0814b62810"]);
        page[0] ^= 0xff;
        assert!(matches!(
            GlucosePage::parse(&page),
            Err(Error::ChecksumMismatch { .. })
        ));
    }
}
