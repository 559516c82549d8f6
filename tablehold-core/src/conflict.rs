//! Slot conflict rule.
//!
//! `detect` is a pure function over the occupants of one table-day. Stores call
//! it inside their confirmation transaction and the detector service calls it
//! outside one, so both paths evaluate exactly the same rule.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::booking::Booking;
use crate::hold::{Lock, LockId};
use crate::time::{TimeOfDay, TimeWindow};

const EXACT_PENALTY: u8 = 60;
const OVERLAP_PENALTY: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSource {
    Booking,
    Lock,
}

impl fmt::Display for ConflictSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictSource::Booking => f.write_str("booking"),
            ConflictSource::Lock => f.write_str("lock"),
        }
    }
}

/// The entity occupying a contested window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub source: ConflictSource,
    pub id: String,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub status: String,
}

impl Conflict {
    fn from_booking(booking: &Booking) -> Self {
        Self {
            source: ConflictSource::Booking,
            id: booking.id.to_string(),
            start_time: booking.slot.start_time,
            end_time: booking.slot.end_time,
            status: booking.status.to_string(),
        }
    }

    fn from_lock(lock: &Lock) -> Self {
        Self {
            source: ConflictSource::Lock,
            id: lock.id.to_string(),
            start_time: lock.slot.start_time,
            end_time: lock.slot.end_time,
            status: lock.status.to_string(),
        }
    }

    pub fn booking_id(&self) -> Option<Uuid> {
        match self.source {
            ConflictSource::Booking => Uuid::parse_str(&self.id).ok(),
            ConflictSource::Lock => None,
        }
    }
}

/// Everything a store knows about one restaurant/table/date. Stores may return
/// terminal rows too; `detect` filters them.
#[derive(Debug, Clone, Default)]
pub struct SlotOccupants {
    pub bookings: Vec<Booking>,
    pub locks: Vec<Lock>,
}

#[derive(Debug, Clone)]
pub struct ConflictQuery<'a> {
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub exclude_lock: Option<&'a LockId>,
    pub exclude_booking: Option<Uuid>,
    /// The confirmation re-check looks at bookings only.
    pub include_locks: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub exact: Vec<Conflict>,
    pub overlapping: Vec<Conflict>,
    /// 0-100 ranking hint for UIs. Never used to gate a write.
    pub availability_score: u8,
}

impl ConflictReport {
    pub fn has_exact(&self) -> bool {
        !self.exact.is_empty()
    }

    pub fn has_overlap(&self) -> bool {
        !self.overlapping.is_empty()
    }

    pub fn is_clear(&self) -> bool {
        !self.has_exact() && !self.has_overlap()
    }

    pub fn first_exact(&self) -> Option<&Conflict> {
        self.exact.first()
    }
}

pub fn detect(occupants: &SlotOccupants, query: &ConflictQuery<'_>, now: DateTime<Utc>) -> ConflictReport {
    let mut report = ConflictReport::default();

    let bookings = occupants
        .bookings
        .iter()
        .filter(|b| b.status.is_live())
        .filter(|b| b.slot.date == query.date)
        .filter(|b| Some(b.id) != query.exclude_booking)
        .map(|b| (b.slot.window(), Conflict::from_booking(b)));

    let locks = occupants
        .locks
        .iter()
        .filter(|_| query.include_locks)
        .filter(|l| l.is_live_at(now))
        .filter(|l| l.slot.date == query.date)
        .filter(|l| Some(&l.id) != query.exclude_lock)
        .map(|l| (l.slot.window(), Conflict::from_lock(l)));

    for (window, conflict) in bookings.chain(locks) {
        if window.same_as(&query.window) {
            report.exact.push(conflict);
        } else if window.overlaps(&query.window) {
            report.overlapping.push(conflict);
        }
    }

    report.availability_score = availability_score(&report, query.date, now.date_naive());
    report
}

/// Exact hits weigh more than overlaps; a date in the past is never available.
pub fn availability_score(report: &ConflictReport, date: NaiveDate, today: NaiveDate) -> u8 {
    if date < today {
        return 0;
    }
    let penalty = report.exact.len() as u32 * EXACT_PENALTY as u32
        + report.overlapping.len() as u32 * OVERLAP_PENALTY as u32;
    100u32.saturating_sub(penalty) as u8
}
