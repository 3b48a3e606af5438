//! Receiver GPS timestamps.
//!
//! The 6-byte header timestamp packs 48 bits: the top 18 are seconds into the
//! UTC day, the bottom 30 are nanoseconds into the second. The split does not
//! fall on a byte boundary, so both fields are reassembled bit by bit.
//!
//! Only time of day is transmitted. The calendar date comes from the caller
//! (normally today's UTC date).
//!
//! When the receiver substitutes multilateration data for its own clock the
//! timestamp field carries the fixed marker `FF 00 4D 4C 41 54` ("MLAT")
//! instead, which is reported as [`ReceiverTime::Mlat`] rather than decoded.

use chrono::{DateTime, Days, NaiveDate, TimeDelta, Utc};

/// Timestamp field contents when MLAT data replaces the GPS time.
pub const MLAT_MARKER: [u8; 6] = [0xFF, 0x00, 0x4D, 0x4C, 0x41, 0x54];

const SECONDS_PER_DAY: u32 = 86_400;
const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Decoded receiver timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverTime {
    /// GPS time of day combined with a calendar date.
    Gps(DateTime<Utc>),
    /// Timestamp replaced by multilateration data.
    Mlat,
}

impl ReceiverTime {
    pub fn gps(&self) -> Option<DateTime<Utc>> {
        match self {
            ReceiverTime::Gps(t) => Some(*t),
            ReceiverTime::Mlat => None,
        }
    }
}

/// Split the packed field into (seconds of day, nanoseconds).
pub fn time_of_day(raw: &[u8; 6]) -> (u32, u32) {
    let seconds = (raw[0] as u32) << 10 | (raw[1] as u32) << 2 | (raw[2] as u32) >> 6;
    let nanos = ((raw[2] & 0x3F) as u32) << 24
        | (raw[3] as u32) << 16
        | (raw[4] as u32) << 8
        | raw[5] as u32;
    (seconds, nanos)
}

/// Decode a packed timestamp on the given UTC date.
///
/// Returns `None` when the fields are out of range (seconds past the end of
/// the day, or a nanosecond count of one second or more).
pub fn decode_timestamp(raw: &[u8; 6], date: NaiveDate) -> Option<ReceiverTime> {
    if *raw == MLAT_MARKER {
        return Some(ReceiverTime::Mlat);
    }

    let (seconds, nanos) = time_of_day(raw);
    if seconds >= SECONDS_PER_DAY || nanos >= NANOS_PER_SECOND {
        return None;
    }

    let hour = seconds / 3600;
    let minute = seconds / 60 % 60;
    let second = seconds % 60;

    let t = date.and_hms_nano_opt(hour, minute, second, nanos)?;
    Some(ReceiverTime::Gps(t.and_utc()))
}

/// Decode a packed timestamp on whichever UTC day puts it closest to
/// `reference`.
///
/// Receiver and host clocks straddle midnight at different instants: a
/// message stamped 23:59:59 may be read at 00:00:01. A time more than 12
/// hours ahead of `reference` is moved to the previous day, one more than 12
/// hours behind to the next.
pub fn decode_timestamp_near(raw: &[u8; 6], reference: DateTime<Utc>) -> Option<ReceiverTime> {
    let half_day = TimeDelta::hours(12);
    let t = match decode_timestamp(raw, reference.date_naive())? {
        ReceiverTime::Gps(t) => t,
        ReceiverTime::Mlat => return Some(ReceiverTime::Mlat),
    };

    let t = if t - reference > half_day {
        t.checked_sub_days(Days::new(1))?
    } else if reference - t > half_day {
        t.checked_add_days(Days::new(1))?
    } else {
        t
    };
    Some(ReceiverTime::Gps(t))
}

/// Decode a packed timestamp on today's UTC date.
pub fn decode_timestamp_today(raw: &[u8; 6]) -> Option<ReceiverTime> {
    decode_timestamp(raw, Utc::now().date_naive())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
