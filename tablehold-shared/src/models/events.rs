use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a booking, as far as downstream notification consumers care.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Confirmed,
    Rejected,
    Cancelled,
}

impl NotificationKind {
    /// Kafka topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            NotificationKind::Confirmed => "booking.confirmed",
            NotificationKind::Rejected => "booking.rejected",
            NotificationKind::Cancelled => "booking.cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingNotification {
    pub kind: NotificationKind,
    pub booking_id: Uuid,
    pub restaurant_id: String,
    pub table_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub guest_count: u16,
    pub lock_id: Option<String>,
    pub reason: Option<String>,
    pub timestamp: i64,
}
