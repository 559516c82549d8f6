use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Per-restaurant booking quota counter. Incremented after a confirmation commits;
/// callers log failures and move on.
#[async_trait]
pub trait UsageCounter: Send + Sync {
    async fn record_booking(
        &self,
        restaurant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Billing period key used by every counter implementation.
pub fn usage_period(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

#[derive(Debug, Default)]
pub struct InMemoryUsageCounter {
    counts: Mutex<HashMap<(String, String), u64>>,
    failing: AtomicBool,
}

impl InMemoryUsageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, to exercise the best-effort path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self, restaurant_id: &str, period: &str) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(restaurant_id.to_string(), period.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl UsageCounter for InMemoryUsageCounter {
    async fn record_booking(
        &self,
        restaurant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("usage store unreachable".into());
        }
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        *counts
            .entry((restaurant_id.to_string(), usage_period(at)))
            .or_insert(0) += 1;
        Ok(())
    }
}
