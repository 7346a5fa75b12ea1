use chrono::NaiveDate;

use crate::catalog;
use crate::model::*;

use super::availability::{free_slots, report, unavailable_classrooms};
use super::validation::{resolve_classroom, validate_window};
use super::{Engine, EngineError};

impl Engine {
    pub fn list_classrooms(&self) -> &'static [&'static str] {
        catalog::classrooms()
    }

    /// Owner-checked lookup.
    pub fn get_booking(&self, id: BookingId, name: &str) -> Result<Booking, EngineError> {
        let booking = self.store.get(id)?;
        if !booking.is_owned_by(name) {
            return Err(EngineError::Forbidden(id));
        }
        Ok(booking)
    }

    /// Which classrooms are free for the whole of `[start, end)` on `date`.
    pub fn search_availability(
        &self,
        date: NaiveDate,
        start: &str,
        end: &str,
    ) -> Result<AvailabilityReport, EngineError> {
        let now = self.now();
        if date < now.date() {
            return Err(EngineError::PastDate(date));
        }
        let window = validate_window(date, start, end, now, false)?;
        let day = self.store.on_date(date);
        Ok(report(&unavailable_classrooms(&day, &window, None)))
    }

    /// Bookable gaps of at least the minimum length in one classroom's day.
    pub fn free_slots(&self, classroom: &str, date: NaiveDate) -> Result<FreeSlots, EngineError> {
        let classroom = resolve_classroom(classroom)?;
        let bookings: Vec<Booking> = self
            .store
            .on_date(date)
            .into_iter()
            .filter(|b| b.classroom == classroom)
            .collect();
        Ok(FreeSlots {
            classroom,
            slots: free_slots(&bookings),
        })
    }

    /// Every booking owned by `name`, earliest first.
    pub fn bookings_for(&self, name: &str) -> Vec<Booking> {
        let mut bookings = self.store.owned_by(name);
        bookings.sort_by(|a, b| {
            (a.booking_date, a.start_time, catalog::position(&a.classroom))
                .cmp(&(b.booking_date, b.start_time, catalog::position(&b.classroom)))
        });
        bookings
    }
}
