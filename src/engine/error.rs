use chrono::NaiveDate;

use crate::model::BookingId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A time string was not "HH:MM" with hour 0-23 and minute 0-59.
    MalformedTime(String),
    /// Start before opening or end after closing.
    OutOfHours,
    /// A minute component other than :00 or :30.
    NotHalfHourAligned,
    /// The window (or its date) already lies in the past.
    PastTime,
    /// An availability search for a date before today.
    PastDate(NaiveDate),
    /// Shorter than the minimum booking length, or inverted.
    TooShort { minutes: i64 },
    InvalidClassroom(String),
    InvalidName(&'static str),
    /// Classroom already booked; carries the colliding booking id.
    Conflict(BookingId),
    NotFound(BookingId),
    Forbidden(BookingId),
    LimitExceeded(&'static str),
    IdSpaceExhausted,
}

/// Coarse grouping used by transports to pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Limit,
    Fatal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::MalformedTime(_)
            | EngineError::OutOfHours
            | EngineError::NotHalfHourAligned
            | EngineError::PastTime
            | EngineError::PastDate(_)
            | EngineError::TooShort { .. }
            | EngineError::InvalidClassroom(_)
            | EngineError::InvalidName(_) => ErrorKind::Validation,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::LimitExceeded(_) => ErrorKind::Limit,
            EngineError::IdSpaceExhausted => ErrorKind::Fatal,
        }
    }

    /// HTTP status for an HTTP front-end.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 422,
            ErrorKind::Conflict => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Limit | ErrorKind::Fatal => 500,
        }
    }

    /// SQLSTATE for the wire front-end.
    pub fn sqlstate(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "22023",
            ErrorKind::Conflict => "23P01",
            ErrorKind::NotFound => "P0002",
            ErrorKind::Forbidden => "42501",
            ErrorKind::Limit => "54000",
            ErrorKind::Fatal => "XX000",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::MalformedTime(raw) => {
                write!(f, "malformed time {raw:?}: expected HH:MM (24-hour)")
            }
            EngineError::OutOfHours => {
                write!(f, "bookings must start at or after 07:00 and end by 18:00")
            }
            EngineError::NotHalfHourAligned => {
                write!(f, "start and end times must be on the hour or half hour")
            }
            EngineError::PastTime => write!(f, "cannot book a time that has already passed"),
            EngineError::PastDate(date) => write!(f, "search date {date} is in the past"),
            EngineError::TooShort { minutes } => {
                write!(f, "booking must be at least one hour long (got {minutes} minutes)")
            }
            EngineError::InvalidClassroom(raw) => write!(f, "unknown classroom: {raw}"),
            EngineError::InvalidName(msg) => write!(f, "invalid name: {msg}"),
            EngineError::Conflict(id) => {
                write!(f, "classroom already booked during the specified time (booking {id})")
            }
            EngineError::NotFound(id) => write!(f, "booking {id} does not exist"),
            EngineError::Forbidden(id) => {
                write!(f, "you do not have permission to access booking {id}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::IdSpaceExhausted => write!(f, "could not allocate a free booking id"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_kind() {
        assert_eq!(EngineError::OutOfHours.status_code(), 422);
        assert_eq!(EngineError::TooShort { minutes: 30 }.status_code(), 422);
        assert_eq!(EngineError::InvalidClassroom("Z9".into()).status_code(), 422);
        assert_eq!(EngineError::Conflict(1).status_code(), 409);
        assert_eq!(EngineError::NotFound(1).status_code(), 404);
        assert_eq!(EngineError::Forbidden(1).status_code(), 403);
        assert_eq!(EngineError::IdSpaceExhausted.status_code(), 500);
    }

    #[test]
    fn sqlstates_are_distinct_per_kind() {
        let codes = [
            EngineError::PastTime.sqlstate(),
            EngineError::Conflict(1).sqlstate(),
            EngineError::NotFound(1).sqlstate(),
            EngineError::Forbidden(1).sqlstate(),
            EngineError::LimitExceeded("x").sqlstate(),
            EngineError::IdSpaceExhausted.sqlstate(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
