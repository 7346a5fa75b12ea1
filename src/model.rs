use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Eight-digit booking identifier (seed rows use small ids).
pub type BookingId = u32;

/// Wire format for wall-clock times.
pub const TIME_FORMAT: &str = "%H:%M";

/// Wire format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Half-open interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "TimeWindow start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Adjacent windows do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A stored reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub name: String,
    /// Always a canonical catalog code.
    pub classroom: String,
    pub booking_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

impl Booking {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    /// Case-insensitive owner match.
    pub fn is_owned_by(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Full booking request, as submitted. Times are unparsed "HH:MM" strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub name: String,
    pub classroom: String,
    pub booking_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
}

impl NewBooking {
    /// Render a stored booking back into request form.
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            name: booking.name.clone(),
            classroom: booking.classroom.clone(),
            booking_date: booking.booking_date,
            start_time: booking.start_time.format(TIME_FORMAT).to_string(),
            end_time: booking.end_time.format(TIME_FORMAT).to_string(),
        }
    }

    /// Overlay only the fields present in `patch`.
    pub fn merged(mut self, patch: &BookingPatch) -> Self {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(classroom) = &patch.classroom {
            self.classroom = classroom.clone();
        }
        if let Some(date) = patch.booking_date {
            self.booking_date = date;
        }
        if let Some(start) = &patch.start_time {
            self.start_time = start.clone();
        }
        if let Some(end) = &patch.end_time {
            self.end_time = end.clone();
        }
        self
    }
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classroom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.classroom.is_none()
            && self.booking_date.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }
}

/// Validated, typed counterpart of [`BookingPatch`] that the repository merges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingChanges {
    pub name: Option<String>,
    pub classroom: Option<String>,
    pub booking_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl BookingChanges {
    pub fn apply_to(self, booking: &mut Booking) {
        if let Some(name) = self.name {
            booking.name = name;
        }
        if let Some(classroom) = self.classroom {
            booking.classroom = classroom;
        }
        if let Some(date) = self.booking_date {
            booking.booking_date = date;
        }
        if let Some(start) = self.start_time {
            booking.start_time = start;
        }
        if let Some(end) = self.end_time {
            booking.end_time = end;
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    pub available_classrooms: Vec<&'static str>,
    pub unavailable_classrooms: Vec<&'static str>,
}

impl AvailabilityReport {
    pub fn is_available(&self, classroom: &str) -> bool {
        self.available_classrooms.contains(&classroom)
    }
}

/// Free windows in one classroom's day, keyed by its catalog code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeSlots {
    pub classroom: &'static str,
    pub slots: Vec<TimeWindow>,
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}
