//! Online check-in window

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::bookings::BookingStatus;

/// Check-in opens this long before departure
pub const OPENS_BEFORE_DEPARTURE_HOURS: i64 = 24;
/// ...and closes this long before departure
pub const CLOSES_BEFORE_DEPARTURE_HOURS: i64 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckInError {
    #[error("A cancelled booking cannot be checked in")]
    Cancelled,

    #[error("Booking is already checked in")]
    AlreadyCheckedIn,

    #[error("Booking must be paid before check-in")]
    NotConfirmed,

    #[error("Check-in opens at {opens_at}")]
    NotOpenYet { opens_at: DateTime<Utc> },

    #[error("Check-in closed at {closed_at}")]
    Closed { closed_at: DateTime<Utc> },
}

/// `(opens_at, closes_at)` for a departure
pub fn check_in_window(departure_at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        departure_at - Duration::hours(OPENS_BEFORE_DEPARTURE_HOURS),
        departure_at - Duration::hours(CLOSES_BEFORE_DEPARTURE_HOURS),
    )
}

/// Whether a booking in `status` may check in at `now`
pub fn validate_check_in(
    status: BookingStatus,
    departure_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), CheckInError> {
    match status {
        BookingStatus::Cancelled => return Err(CheckInError::Cancelled),
        BookingStatus::CheckedIn => return Err(CheckInError::AlreadyCheckedIn),
        BookingStatus::Pending => return Err(CheckInError::NotConfirmed),
        BookingStatus::Confirmed => {}
    }

    let (opens_at, closes_at) = check_in_window(departure_at);
    if now < opens_at {
        return Err(CheckInError::NotOpenYet { opens_at });
    }
    if now > closes_at {
        return Err(CheckInError::Closed { closed_at: closes_at });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn departure() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn cancelled_booking_cannot_check_in() {
        let now = departure() - Duration::hours(5);
        assert_eq!(
            validate_check_in(BookingStatus::Cancelled, departure(), now),
            Err(CheckInError::Cancelled)
        );
    }

    #[test]
    fn window_is_24h_to_1h_before_departure() {
        let dep = departure();
        let ok = |now| validate_check_in(BookingStatus::Confirmed, dep, now);

        assert!(ok(dep - Duration::hours(24)).is_ok());
        assert!(ok(dep - Duration::hours(12)).is_ok());
        assert!(ok(dep - Duration::hours(1)).is_ok());

        assert_eq!(
            ok(dep - Duration::hours(24) - Duration::seconds(1)),
            Err(CheckInError::NotOpenYet { opens_at: dep - Duration::hours(24) })
        );
        assert_eq!(
            ok(dep - Duration::minutes(59)),
            Err(CheckInError::Closed { closed_at: dep - Duration::hours(1) })
        );
        assert!(ok(dep + Duration::hours(1)).is_err());
    }

    #[test]
    fn only_confirmed_bookings_check_in() {
        let now = departure() - Duration::hours(3);
        assert_eq!(
            validate_check_in(BookingStatus::Pending, departure(), now),
            Err(CheckInError::NotConfirmed)
        );
        assert_eq!(
            validate_check_in(BookingStatus::CheckedIn, departure(), now),
            Err(CheckInError::AlreadyCheckedIn)
        );
    }
}
