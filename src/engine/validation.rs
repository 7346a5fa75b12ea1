use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::catalog;
use crate::limits::*;
use crate::model::{TimeWindow, TIME_FORMAT};

use super::EngineError;

pub(crate) fn parse_time(raw: &str) -> Result<NaiveTime, EngineError> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .map_err(|_| EngineError::MalformedTime(raw.to_string()))
}

fn is_aligned(time: NaiveTime) -> bool {
    time.minute() % SLOT_ALIGNMENT_MINUTES == 0 && time.second() == 0
}

/// Parse and check a `(date, start, end)` triple against the booking rules.
///
/// Checks run in order: format, operating hours, half-hour alignment,
/// past time, minimum length. `full_check` additionally rejects dates before
/// today; availability search leaves that to its own date check.
pub(crate) fn validate_window(
    date: NaiveDate,
    start_raw: &str,
    end_raw: &str,
    now: NaiveDateTime,
    full_check: bool,
) -> Result<TimeWindow, EngineError> {
    let start = parse_time(start_raw)?;
    let end = parse_time(end_raw)?;

    if start < OPENING_TIME || end > CLOSING_TIME {
        return Err(EngineError::OutOfHours);
    }
    if !is_aligned(start) || !is_aligned(end) {
        return Err(EngineError::NotHalfHourAligned);
    }

    let today = now.date();
    if full_check && date < today {
        return Err(EngineError::PastTime);
    }
    if date == today && (start < now.time() || end < now.time()) {
        return Err(EngineError::PastTime);
    }

    // Same-day subtraction: an inverted window comes out negative.
    let minutes = (end - start).num_minutes();
    if minutes < MIN_BOOKING_MINUTES {
        return Err(EngineError::TooShort { minutes });
    }

    Ok(TimeWindow::new(start, end))
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidName("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::InvalidName("name too long"));
    }
    Ok(())
}

pub(crate) fn resolve_classroom(raw: &str) -> Result<&'static str, EngineError> {
    catalog::canonicalize(raw).ok_or_else(|| EngineError::InvalidClassroom(raw.to_string()))
}
