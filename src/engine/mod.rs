mod availability;
mod error;
mod mutations;
mod queries;
mod store;
mod validation;

pub use availability::{conflicting, free_slots, report, unavailable_classrooms};
pub use error::{EngineError, ErrorKind};
pub use store::InMemoryStore;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::*;

/// Source of "now" for past-time checks.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    /// Local wall-clock time.
    System,
    /// Pinned instant, for tests.
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::System => Local::now().naive_local(),
            Clock::Fixed(at) => *at,
        }
    }
}

/// Booking engine: the repository plus the lock that makes
/// check-then-commit sequences atomic.
///
/// Single-record reads go straight to the store. Create, update and delete
/// hold `commit_lock` from their first repository read to their write, so two
/// writers can never both pass the conflict check for the same slot.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) commit_lock: Mutex<()>,
    pub(super) max_bookings: usize,
    clock: Clock,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_clock(Clock::System)
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            store: InMemoryStore::new(),
            commit_lock: Mutex::new(()),
            max_bookings: crate::limits::MAX_BOOKINGS,
            clock,
        }
    }

    /// Lower the repository cap (defaults to `MAX_BOOKINGS`).
    pub fn with_max_bookings(mut self, max_bookings: usize) -> Self {
        self.max_bookings = max_bookings;
        self
    }

    /// Engine preloaded with the reference bookings.
    pub fn seeded() -> Self {
        let engine = Self::new();
        engine.seed();
        engine
    }

    /// Insert the reference bookings as-is, without validation.
    pub fn seed(&self) {
        for booking in seed_bookings() {
            debug!("seeding booking {} in {}", booking.id, booking.classroom);
            self.store.insert(booking);
        }
        self.record_booking_count();
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn booking_count(&self) -> usize {
        self.store.len()
    }

    pub(super) fn record_booking_count(&self) {
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).set(self.store.len() as f64);
    }

    /// Fail with `Conflict` if `classroom` is occupied during `window`.
    /// Caller must hold `commit_lock`.
    pub(super) fn check_no_conflict(
        &self,
        date: NaiveDate,
        classroom: &str,
        window: &TimeWindow,
        exclude: Option<BookingId>,
    ) -> Result<(), EngineError> {
        let day = self.store.on_date(date);
        let unavailable = unavailable_classrooms(&day, window, exclude);
        if !unavailable.contains(classroom) {
            return Ok(());
        }
        let holder = conflicting(&day, window, exclude)
            .find(|b| b.classroom == classroom)
            .map(|b| b.id)
            .unwrap_or_default();
        metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        debug!("conflict: {classroom} on {date} already held by booking {holder}");
        Err(EngineError::Conflict(holder))
    }
}

fn seed_bookings() -> Vec<Booking> {
    let date = NaiveDate::from_ymd_opt(2024, 10, 23).unwrap_or_default();
    let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
    let row = |id, name: &str, classroom: &str, start, end| Booking {
        id,
        name: name.into(),
        classroom: classroom.into(),
        booking_date: date,
        start_time: start,
        end_time: end,
    };
    vec![
        row(1, "Joel", "A401", at(8, 30), at(10, 0)),
        row(2, "Sami", "C301", at(8, 30), at(10, 0)),
        row(3, "Sami", "B204", at(8, 30), at(10, 0)),
        row(4, "Karin", "A401", at(10, 0), at(15, 0)),
    ]
}
