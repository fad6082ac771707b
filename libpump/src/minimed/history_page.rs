// libpump-rs/libpump/src/minimed/history_page.rs

//! History pages and the newest-first walk over them.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use log::debug;

use super::events::{EventDetails, PumpEvent, PumpEventType};
use super::pump_model::PumpModel;
use super::time_format::local_to_utc;
use crate::constants::HISTORY_PAGE_LENGTH;
use crate::protocol::checksum::crc16;
use crate::protocol::parser::be_u16_at;
use crate::{Error, Result};

/// Check the big-endian CRC-16 trailer of a 1024-byte page and return the body.
pub fn verify_page_crc(data: &[u8]) -> Result<&[u8]> {
    if data.len() != HISTORY_PAGE_LENGTH {
        return Err(Error::InvalidLength {
            expected: HISTORY_PAGE_LENGTH,
            actual: data.len(),
        });
    }
    let body = &data[..HISTORY_PAGE_LENGTH - 2];
    let stored = be_u16_at(data, HISTORY_PAGE_LENGTH - 2)?;
    let computed = crc16(body);
    if stored != computed {
        return Err(Error::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }
    Ok(body)
}

/// One decoded history page, oldest record first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    events: Vec<PumpEvent>,
}

impl HistoryPage {
    /// Decode a page. Unknown opcodes and CRC failures reject the page.
    pub fn parse(data: &[u8], model: PumpModel) -> Result<Self> {
        let body = verify_page_crc(data)?;
        let mut events = Vec::new();
        let mut unabsorbed = None;
        let mut offset = 0;

        while offset < body.len() {
            let rest = &body[offset..];
            if rest[0] == 0 {
                offset += 1;
                continue;
            }
            let event = PumpEvent::decode(rest, model, &mut unabsorbed)?;
            offset += event.length();
            match event.details {
                EventDetails::UnabsorbedInsulin(records) => unabsorbed = Some(records),
                _ => events.push(event),
            }
        }

        debug!("history: decoded {} events", events.len());
        Ok(Self { events })
    }

    /// Records in page order.
    pub fn events(&self) -> &[PumpEvent] {
        &self.events
    }

    /// Take the records.
    pub fn into_events(self) -> Vec<PumpEvent> {
        self.events
    }
}

/// A history record placed on the absolute time line.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimestampedHistoryEvent {
    /// The record.
    pub event: PumpEvent,
    /// When it was written, UTC, clock changes applied.
    pub date: DateTime<Utc>,
}

impl TimestampedHistoryEvent {
    /// A square wave bolus still delivering can be rewritten by the pump.
    pub fn is_mutable(&self, now: DateTime<Utc>) -> bool {
        match &self.event.details {
            EventDetails::BolusNormal(bolus) => {
                let duration = TimeDelta::from_std(bolus.duration).unwrap_or(TimeDelta::zero());
                self.date + duration > now
            }
            _ => false,
        }
    }
}

/// Whether a walk wants older pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkProgress {
    /// Keep reading.
    NeedsOlderPages,
    /// Stop; call [`HistoryWalk::finish`].
    Complete,
}

/// Newest-first collection of timestamped records across pages 0, 1, 2...
///
/// Time runs backwards while walking, except for boluses which the pump may
/// write out of order (by up to the model's allowance). A record older than
/// the start date, or one far newer than what was already seen, ends the walk.
#[derive(Debug)]
pub struct HistoryWalk {
    start: DateTime<Utc>,
    zone: FixedOffset,
    allowance: TimeDelta,
    time_cursor: DateTime<Utc>,
    time_adjustment: TimeDelta,
    seen: HashSet<Vec<u8>>,
    newer: Option<PumpEvent>,
    collected: Vec<TimestampedHistoryEvent>,
    complete: bool,
}

impl HistoryWalk {
    /// Walk back to `start`; `now` bounds records from the future.
    pub fn new(start: DateTime<Utc>, now: DateTime<Utc>, zone: FixedOffset, model: PumpModel) -> Self {
        let allowance = if model.appends_square_wave_to_history_on_start_of_delivery() {
            TimeDelta::minutes(10)
        } else {
            TimeDelta::hours(9)
        };
        Self {
            start,
            zone,
            allowance,
            // the pump clock may run a little ahead of ours
            time_cursor: now + TimeDelta::minutes(60),
            time_adjustment: TimeDelta::zero(),
            seen: HashSet::new(),
            newer: None,
            collected: Vec::new(),
            complete: false,
        }
    }

    /// The walk has ended.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feed the next older page.
    pub fn push_page(&mut self, page: &HistoryPage) -> WalkProgress {
        if self.complete {
            return WalkProgress::Complete;
        }
        for event in page.events().iter().rev() {
            if let Some(local) = event.timestamp {
                if self.seen.insert(event.raw_data.clone()) {
                    if let Some(date) = local_to_utc(&local, &self.zone) {
                        let date = date + self.time_adjustment;
                        if date - self.start < -self.allowance {
                            debug!("history: {} is before {}, walk complete", date, self.start);
                            self.complete = true;
                            return WalkProgress::Complete;
                        }
                        if date - self.time_cursor > self.allowance {
                            debug!("history: {} out of order, walk complete", date);
                            self.complete = true;
                            return WalkProgress::Complete;
                        }
                        if date >= self.start {
                            self.time_cursor = date;
                        }
                        self.collected.push(TimestampedHistoryEvent {
                            event: event.clone(),
                            date,
                        });
                    }
                }
            }

            if event.event_type == PumpEventType::ChangeTime {
                if let Some(delta) = self.time_change_delta(event) {
                    self.time_adjustment += delta;
                }
            }
            self.newer = Some(event.clone());
        }
        WalkProgress::NeedsOlderPages
    }

    /// A clock change is recorded as ChangeTime (old clock) then NewTime (new clock).
    fn time_change_delta(&self, change: &PumpEvent) -> Option<TimeDelta> {
        let newer = self.newer.as_ref()?;
        if newer.event_type != PumpEventType::NewTime {
            return None;
        }
        let new_time: NaiveDateTime = newer.timestamp?;
        let old_time: NaiveDateTime = change.timestamp?;
        Some(new_time - old_time)
    }

    /// End the walk, returning records oldest first.
    pub fn finish(self) -> Vec<TimestampedHistoryEvent> {
        let mut events = self.collected;
        events.reverse();
        events
    }
}

/// Time a square wave may still be rewritten.
pub fn square_wave_duration(event: &PumpEvent) -> Option<Duration> {
    match &event.details {
        EventDetails::BolusNormal(b) if !b.duration.is_zero() => Some(b.duration),
        _ => None,
    }
}
