pub mod confirmation;
pub mod detector;
mod dispatch;
pub mod locks;
pub mod occ;
pub mod resolution;
pub mod sweeper;

use chrono::Duration;
use std::sync::Arc;
use tablehold_core::identity::UserDirectory;
use tablehold_core::notify::Notifier;
use tablehold_core::usage::UsageCounter;
use tablehold_core::{Clock, ReservationStore};

pub use confirmation::ConfirmationCoordinator;
pub use detector::{ConflictCheck, ConflictDetector};
pub use locks::{HoldPolicy, HoldRequest, HoldStatus, LockManager};
pub use occ::{BookingOccEngine, NewBooking};
pub use resolution::{ResolutionAction, ResolutionOutcome, ResolutionService, ResolutionTarget, ResolveRequest};
pub use sweeper::{SweepReport, Sweeper};

/// Everything outside this crate that the services talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ReservationStore>,
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserDirectory>,
    pub usage: Arc<dyn UsageCounter>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub hold: HoldPolicy,
    pub stale_pending_after: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            hold: HoldPolicy::default(),
            stale_pending_after: Duration::hours(24),
        }
    }
}

/// The full set of reservation services wired against one store.
#[derive(Clone)]
pub struct ReservationServices {
    pub detector: ConflictDetector,
    pub locks: LockManager,
    pub confirmations: ConfirmationCoordinator,
    pub bookings: BookingOccEngine,
    pub sweeper: Sweeper,
    pub resolution: ResolutionService,
}

impl ReservationServices {
    pub fn new(deps: Collaborators, settings: ServiceSettings) -> Self {
        let detector = ConflictDetector::new(deps.store.clone(), deps.clock.clone());
        let locks = LockManager::new(deps.store.clone(), deps.clock.clone(), detector.clone(), settings.hold);
        let confirmations = ConfirmationCoordinator::new(
            deps.store.clone(),
            deps.clock.clone(),
            deps.usage.clone(),
            deps.notifier.clone(),
        );
        let bookings = BookingOccEngine::new(
            deps.store.clone(),
            deps.clock.clone(),
            detector.clone(),
            deps.notifier.clone(),
        );
        let sweeper = Sweeper::new(
            deps.store.clone(),
            deps.clock.clone(),
            deps.users.clone(),
            settings.stale_pending_after,
        );
        let resolution = ResolutionService::new(deps.store.clone(), deps.clock.clone(), bookings.clone());

        Self {
            detector,
            locks,
            confirmations,
            bookings,
            sweeper,
            resolution,
        }
    }
}
