use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tablehold_shared::models::events::BookingNotification;

/// Outbound notification dispatch. Delivery failures are never surfaced to the
/// request that triggered them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        event: &BookingNotification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Keeps every event it was handed. Used in tests and local runs without Kafka.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<BookingNotification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<BookingNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        event: &BookingNotification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("notification channel down".into());
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
