use chrono::NaiveDate;
use dashmap::DashMap;
use rand::Rng;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Authoritative set of bookings. Each call is atomic for the record it
/// touches; multi-step sequences are serialized by the engine's commit lock.
pub struct InMemoryStore {
    bookings: DashMap<BookingId, Booking>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn contains(&self, id: BookingId) -> bool {
        self.bookings.contains_key(&id)
    }

    pub fn get(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.bookings
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(id))
    }

    /// Draw uniform ids from the eight-digit range until one is unused.
    pub fn generate_id(&self, rng: &mut impl Rng) -> Result<BookingId, EngineError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = rng.random_range(MIN_BOOKING_ID..=MAX_BOOKING_ID);
            if !self.contains(id) {
                return Ok(id);
            }
        }
        Err(EngineError::IdSpaceExhausted)
    }

    /// Caller guarantees `booking.id` is unused.
    pub fn insert(&self, booking: Booking) {
        self.bookings.insert(booking.id, booking);
    }

    /// Merge `changes` into the stored record and return the result.
    pub fn update(&self, id: BookingId, changes: BookingChanges) -> Result<Booking, EngineError> {
        let mut entry = self.bookings.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        changes.apply_to(entry.value_mut());
        Ok(entry.value().clone())
    }

    pub fn delete(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.bookings
            .remove(&id)
            .map(|(_, booking)| booking)
            .ok_or(EngineError::NotFound(id))
    }

    // ── Scans ────────────────────────────────────────────────

    pub fn on_date(&self, date: NaiveDate) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|e| e.value().booking_date == date)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn owned_by(&self, name: &str) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|e| e.value().is_owned_by(name))
            .map(|e| e.value().clone())
            .collect()
    }
}
