pub mod booking;
pub mod clock;
pub mod conflict;
pub mod error;
pub mod hold;
pub mod identity;
pub mod notify;
pub mod repository;
pub mod time;
pub mod usage;

pub use booking::{Booking, BookingChange, BookingOverrides, BookingStatus, BookingUpdate, HistoryEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conflict::{Conflict, ConflictQuery, ConflictReport, ConflictSource, SlotOccupants};
pub use error::{ReservationError, ReservationResult, StoreError, StoreResult};
pub use hold::{ContactDetails, HoldMetadata, Lock, LockId, LockStatus, PricingSnapshot};
pub use repository::{ConfirmOutcome, ConfirmationPlan, ReservationStore};
pub use time::{Slot, TimeOfDay, TimeWindow};
