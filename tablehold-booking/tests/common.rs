#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tablehold_booking::{Collaborators, HoldRequest, ReservationServices, ServiceSettings};
use tablehold_core::identity::StaticUserDirectory;
use tablehold_core::notify::RecordingNotifier;
use tablehold_core::usage::InMemoryUsageCounter;
use tablehold_core::{HoldMetadata, ManualClock, Slot};
use tablehold_store::InMemoryReservationStore;

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryReservationStore>,
    pub users: Arc<StaticUserDirectory>,
    pub usage: Arc<InMemoryUsageCounter>,
    pub notifier: Arc<RecordingNotifier>,
    pub services: ReservationServices,
}

pub fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap()));
    let store = Arc::new(InMemoryReservationStore::new());
    let users = Arc::new(StaticUserDirectory::new((0..32).map(|i| format!("user-{}", i))));
    let usage = Arc::new(InMemoryUsageCounter::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let services = ReservationServices::new(
        Collaborators {
            store: store.clone(),
            clock: clock.clone(),
            users: users.clone(),
            usage: usage.clone(),
            notifier: notifier.clone(),
        },
        ServiceSettings::default(),
    );

    Harness {
        clock,
        store,
        users,
        usage,
        notifier,
        services,
    }
}

pub fn t4_slot() -> Slot {
    slot("19:00", "20:30")
}

pub fn slot(start: &str, end: &str) -> Slot {
    Slot::new(
        "r1",
        "t4",
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        start.parse().unwrap(),
        end.parse().unwrap(),
    )
    .unwrap()
}

pub fn hold_request(user: &str, slot: Slot) -> HoldRequest {
    HoldRequest {
        slot,
        guest_count: 2,
        user_id: user.to_string(),
        hold_minutes: Some(5),
        metadata: HoldMetadata::default(),
    }
}
