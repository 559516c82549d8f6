use chrono::{DateTime, Utc};
use tablehold_core::notify::Notifier;
use tablehold_core::usage::UsageCounter;
use tablehold_core::Booking;
use tablehold_shared::models::events::{BookingNotification, NotificationKind};
use tracing::warn;

pub(crate) fn notification(
    kind: NotificationKind,
    booking: &Booking,
    reason: Option<String>,
    at: DateTime<Utc>,
) -> BookingNotification {
    BookingNotification {
        kind,
        booking_id: booking.id,
        restaurant_id: booking.slot.restaurant_id.clone(),
        table_id: booking.slot.table_id.clone(),
        user_id: booking.user_id.clone(),
        date: booking.slot.date,
        start_time: booking.slot.start_time.to_string(),
        end_time: booking.slot.end_time.to_string(),
        guest_count: booking.guest_count,
        lock_id: booking.lock_id.as_ref().map(|id| id.to_string()),
        reason,
        timestamp: at.timestamp(),
    }
}

/// Fire-and-forget. The booking is already committed; a failed send is logged and dropped.
pub(crate) async fn notify_best_effort(notifier: &dyn Notifier, event: BookingNotification) {
    if let Err(e) = notifier.notify(&event).await {
        warn!(
            booking_id = %event.booking_id,
            topic = event.kind.topic(),
            "Notification dropped: {}",
            e
        );
    }
}

pub(crate) async fn record_usage_best_effort(usage: &dyn UsageCounter, booking: &Booking, at: DateTime<Utc>) {
    if let Err(e) = usage.record_booking(&booking.slot.restaurant_id, at).await {
        warn!(
            booking_id = %booking.id,
            restaurant_id = %booking.slot.restaurant_id,
            "Usage increment dropped: {}",
            e
        );
    }
}
