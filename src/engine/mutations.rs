use tracing::info;

use crate::model::*;

use super::validation::{resolve_classroom, validate_name, validate_window};
use super::{Engine, EngineError};

impl Engine {
    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking, EngineError> {
        validate_name(&request.name)?;
        let window = validate_window(
            request.booking_date,
            &request.start_time,
            &request.end_time,
            self.now(),
            true,
        )?;
        let classroom = resolve_classroom(&request.classroom)?;

        let _commit = self.commit_lock.lock().await;
        if self.store.len() >= self.max_bookings {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }
        self.check_no_conflict(request.booking_date, classroom, &window, None)?;

        let id = self.store.generate_id(&mut rand::rng())?;
        let booking = Booking {
            id,
            name: request.name,
            classroom: classroom.to_string(),
            booking_date: request.booking_date,
            start_time: window.start,
            end_time: window.end,
        };
        self.store.insert(booking.clone());
        self.record_booking_count();
        info!(
            "booking {id} created: {classroom} on {} {}-{}",
            booking.booking_date, booking.start_time, booking.end_time
        );
        Ok(booking)
    }

    /// Apply `patch` to an owned booking.
    ///
    /// The patch is overlaid on the stored record and the whole result is
    /// re-validated, so an untouched field that has gone stale (a past date,
    /// a now-taken classroom) still rejects the update.
    pub async fn update_booking(
        &self,
        id: BookingId,
        name: &str,
        patch: BookingPatch,
    ) -> Result<Booking, EngineError> {
        let _commit = self.commit_lock.lock().await;
        let current = self.store.get(id)?;
        if !current.is_owned_by(name) {
            return Err(EngineError::Forbidden(id));
        }

        let candidate = NewBooking::from_booking(&current).merged(&patch);
        validate_name(&candidate.name)?;
        let window = validate_window(
            candidate.booking_date,
            &candidate.start_time,
            &candidate.end_time,
            self.now(),
            true,
        )?;
        let classroom = resolve_classroom(&candidate.classroom)?;
        self.check_no_conflict(candidate.booking_date, classroom, &window, Some(id))?;

        let changes = BookingChanges {
            name: patch.name,
            classroom: patch.classroom.map(|_| classroom.to_string()),
            booking_date: patch.booking_date,
            start_time: patch.start_time.map(|_| window.start),
            end_time: patch.end_time.map(|_| window.end),
        };
        let updated = self.store.update(id, changes)?;
        info!(
            "booking {id} updated: {} on {} {}-{}",
            updated.classroom, updated.booking_date, updated.start_time, updated.end_time
        );
        Ok(updated)
    }

    /// Remove an owned booking, returning the removed record.
    pub async fn delete_booking(&self, id: BookingId, name: &str) -> Result<Booking, EngineError> {
        let _commit = self.commit_lock.lock().await;
        let current = self.store.get(id)?;
        if !current.is_owned_by(name) {
            return Err(EngineError::Forbidden(id));
        }
        let removed = self.store.delete(id)?;
        self.record_booking_count();
        info!("booking {id} deleted ({})", removed.classroom);
        Ok(removed)
    }
}
