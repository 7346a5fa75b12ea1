use chrono::NaiveTime;

// ── Business rules ───────────────────────────────────────────────

/// Earliest allowed booking start (inclusive).
pub const OPENING_TIME: NaiveTime = NaiveTime::from_hms_opt(7, 0, 0).unwrap();

/// Latest allowed booking end (inclusive).
pub const CLOSING_TIME: NaiveTime = NaiveTime::from_hms_opt(18, 0, 0).unwrap();

/// Shortest bookable window, in minutes.
pub const MIN_BOOKING_MINUTES: i64 = 60;

/// Start and end must fall on a multiple of this many minutes past the hour.
pub const SLOT_ALIGNMENT_MINUTES: u32 = 30;

// ── Identifiers ──────────────────────────────────────────────────

pub const MIN_BOOKING_ID: u32 = 10_000_000;
pub const MAX_BOOKING_ID: u32 = 99_999_999;

/// Random draws before `generate_id` gives up.
pub const MAX_ID_ATTEMPTS: usize = 1024;

// ── Hard limits ──────────────────────────────────────────────────

pub const MAX_BOOKINGS: usize = 100_000;
pub const MAX_NAME_LEN: usize = 128;
