use std::collections::HashSet;

use chrono::NaiveTime;

use crate::catalog;
use crate::limits::*;
use crate::model::*;

// ── Conflict scan ─────────────────────────────────────────────────

/// Bookings in `day` whose window overlaps `query`, skipping `exclude`.
/// `day` must already be restricted to the queried date.
pub fn conflicting<'a>(
    day: &'a [Booking],
    query: &'a TimeWindow,
    exclude: Option<BookingId>,
) -> impl Iterator<Item = &'a Booking> {
    day.iter()
        .filter(move |b| Some(b.id) != exclude)
        .filter(move |b| b.window().overlaps(query))
}

/// Classroom codes occupied during `query`.
pub fn unavailable_classrooms(
    day: &[Booking],
    query: &TimeWindow,
    exclude: Option<BookingId>,
) -> HashSet<&'static str> {
    conflicting(day, query, exclude)
        .filter_map(|b| catalog::canonicalize(&b.classroom))
        .collect()
}

/// Split the catalog into free and occupied rooms, both in catalog order.
pub fn report(unavailable: &HashSet<&'static str>) -> AvailabilityReport {
    let (unavailable_classrooms, available_classrooms) = catalog::classrooms()
        .iter()
        .copied()
        .partition(|c| unavailable.contains(c));
    AvailabilityReport {
        available_classrooms,
        unavailable_classrooms,
    }
}

// ── Free slots ───────────────────────────────────────────────────

/// Bookable gaps in one classroom's day. `bookings` must all belong to the
/// same classroom and date; order does not matter.
pub fn free_slots(bookings: &[Booking]) -> Vec<TimeWindow> {
    let mut taken: Vec<TimeWindow> = bookings.iter().map(Booking::window).collect();
    taken.sort_by_key(|w| w.start);

    let mut free = Vec::new();
    let mut cursor = OPENING_TIME;
    for window in taken {
        push_gap(&mut free, cursor, window.start.min(CLOSING_TIME));
        cursor = cursor.max(window.end);
    }
    push_gap(&mut free, cursor, CLOSING_TIME);
    free
}

/// Keep `[start, end)` only if it could hold a minimum-length booking.
fn push_gap(free: &mut Vec<TimeWindow>, start: NaiveTime, end: NaiveTime) {
    if (end - start).num_minutes() >= MIN_BOOKING_MINUTES {
        free.push(TimeWindow::new(start, end));
    }
}
