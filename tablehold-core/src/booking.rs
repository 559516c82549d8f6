use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ReservationError;
use crate::hold::{ContactDetails, Lock, LockId, PricingSnapshot};
use crate::time::{Slot, TimeOfDay};

/// Booking status. `Pending` and `Confirmed` occupy the slot; the other two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// One append-only audit record on a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl HistoryEntry {
    pub fn new(action: impl Into<String>, actor: impl Into<String>, at: DateTime<Utc>, details: serde_json::Value) -> Self {
        Self {
            action: action.into(),
            actor: actor.into(),
            at,
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    #[serde(flatten)]
    pub slot: Slot,
    pub user_id: String,
    pub guest_count: u16,
    pub status: BookingStatus,
    pub version: i64,
    pub history: Vec<HistoryEntry>,
    pub lock_id: Option<LockId>,
    pub contact: ContactDetails,
    pub pricing: Option<PricingSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied values that take precedence over the hold-time snapshot on confirmation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingOverrides {
    #[serde(default)]
    pub guest_count: Option<u16>,
    #[serde(default)]
    pub contact: ContactDetails,
    #[serde(default)]
    pub pricing: Option<PricingSnapshot>,
}

/// A single post-creation mutation. Each one maps to exactly one history action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingChange {
    Confirm,
    Reject { reason: String },
    Cancel { reason: String },
    Complete,
    Reschedule {
        date: NaiveDate,
        start_time: TimeOfDay,
        end_time: TimeOfDay,
    },
    UpdateDetails {
        #[serde(default)]
        guest_count: Option<u16>,
        #[serde(default)]
        contact: Option<ContactDetails>,
    },
    /// Keep a conflicting booking and record it as an accepted exception.
    Acknowledge { reason: String },
}

impl BookingChange {
    pub fn action(&self) -> &'static str {
        match self {
            BookingChange::Confirm => "confirmed",
            BookingChange::Reject { .. } => "rejected",
            BookingChange::Cancel { .. } => "cancelled",
            BookingChange::Complete => "completed",
            BookingChange::Reschedule { .. } => "rescheduled",
            BookingChange::UpdateDetails { .. } => "details_updated",
            BookingChange::Acknowledge { .. } => "conflict_override",
        }
    }

    /// Whether only restaurant staff may request this change.
    pub fn is_staff_only(&self) -> bool {
        matches!(
            self,
            BookingChange::Confirm | BookingChange::Reject { .. } | BookingChange::Complete | BookingChange::Acknowledge { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct BookingUpdate {
    pub change: BookingChange,
    pub actor: String,
    pub note: Option<String>,
}

impl Booking {
    /// A booking created directly, without going through a hold.
    pub fn new_pending(
        slot: Slot,
        user_id: String,
        guest_count: u16,
        contact: ContactDetails,
        pricing: Option<PricingSnapshot>,
        now: DateTime<Utc>,
    ) -> Self {
        let history = vec![HistoryEntry::new("created", user_id.clone(), now, json!({ "source": "direct" }))];
        Self {
            id: Uuid::new_v4(),
            slot,
            user_id,
            guest_count,
            status: BookingStatus::Pending,
            version: 1,
            history,
            lock_id: None,
            contact,
            pricing,
            created_at: now,
            updated_at: now,
        }
    }

    /// The booking a hold turns into. Overrides win over the hold-time metadata.
    pub fn from_confirmed_lock(lock: &Lock, overrides: &BookingOverrides, id: Uuid, now: DateTime<Utc>) -> Self {
        let pricing = overrides
            .pricing
            .clone()
            .or_else(|| lock.metadata.pricing.clone());
        let history = vec![HistoryEntry::new(
            "created_from_hold",
            lock.user_id.clone(),
            now,
            json!({ "lock_id": lock.id.as_str() }),
        )];
        Self {
            id,
            slot: lock.slot.clone(),
            user_id: lock.user_id.clone(),
            guest_count: overrides.guest_count.unwrap_or(lock.guest_count),
            status: BookingStatus::Confirmed,
            version: 1,
            history,
            lock_id: Some(lock.id.clone()),
            contact: lock.metadata.contact.merged_with(&overrides.contact),
            pricing,
            created_at: now,
            updated_at: now,
        }
    }

    /// Produce the next version of this booking. Nothing is persisted here; the caller
    /// still has to win the compare-and-swap.
    pub fn apply(&self, update: &BookingUpdate, now: DateTime<Utc>) -> Result<Booking, ReservationError> {
        let mut next = self.clone();
        let mut details = match &update.change {
            BookingChange::Confirm => {
                next.status = self.transition(BookingStatus::Confirmed)?;
                json!({})
            }
            BookingChange::Complete => {
                next.status = self.transition(BookingStatus::Completed)?;
                json!({})
            }
            BookingChange::Reject { reason } | BookingChange::Cancel { reason } => {
                next.status = self.transition(BookingStatus::Cancelled)?;
                json!({ "reason": reason })
            }
            BookingChange::Reschedule { date, start_time, end_time } => {
                self.ensure_live()?;
                next.slot = self.slot.with_time(*date, *start_time, *end_time)?;
                json!({
                    "before": { "date": self.slot.date, "start_time": self.slot.start_time, "end_time": self.slot.end_time },
                    "after": { "date": next.slot.date, "start_time": next.slot.start_time, "end_time": next.slot.end_time },
                })
            }
            BookingChange::UpdateDetails { guest_count, contact } => {
                self.ensure_live()?;
                if let Some(count) = guest_count {
                    if *count == 0 {
                        return Err(ReservationError::validation("guest_count must be positive"));
                    }
                    next.guest_count = *count;
                }
                if let Some(contact) = contact {
                    next.contact = self.contact.merged_with(contact);
                }
                json!({ "guest_count": next.guest_count })
            }
            BookingChange::Acknowledge { reason } => json!({ "reason": reason }),
        };

        if let Some(note) = &update.note {
            details["note"] = json!(note);
        }

        next.version = self.version + 1;
        next.updated_at = now;
        next.history
            .push(HistoryEntry::new(update.change.action(), update.actor.clone(), now, details));
        Ok(next)
    }

    fn transition(&self, target: BookingStatus) -> Result<BookingStatus, ReservationError> {
        if self.status.can_transition_to(target) {
            return Ok(target);
        }
        if self.status.is_terminal() {
            return Err(self.already_terminal());
        }
        Err(ReservationError::validation(format!(
            "booking {} cannot move from {} to {}",
            self.id, self.status, target
        )))
    }

    fn ensure_live(&self) -> Result<(), ReservationError> {
        if self.status.is_terminal() {
            return Err(self.already_terminal());
        }
        Ok(())
    }

    fn already_terminal(&self) -> ReservationError {
        ReservationError::AlreadyTerminal {
            entity: format!("booking {}", self.id),
            status: self.status.to_string(),
        }
    }
}
