//! Booking domain types and rules

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use super::flights::MAX_PASSENGERS;
use super::payments::PaymentResponse;
use super::seatmap::SeatMap;

/// Booking lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    CheckedIn,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::CheckedIn => "checked_in",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "checked_in" => Some(Self::CheckedIn),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CheckedIn | Self::Cancelled)
    }

    /// Whether an e-ticket may be issued in this state
    pub fn is_ticketed(&self) -> bool {
        matches!(self, Self::Confirmed | Self::CheckedIn)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, CheckedIn) | (Confirmed, Cancelled)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PassengerType {
    #[default]
    Adult,
    Child,
    Infant,
}

impl PassengerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adult => "adult",
            Self::Child => "child",
            Self::Infant => "infant",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "child" => Self::Child,
            "infant" => Self::Infant,
            _ => Self::Adult,
        }
    }

    /// Infants sit on an adult's lap
    pub fn needs_seat(&self) -> bool {
        !matches!(self, Self::Infant)
    }
}

/// Rule violations when changing a booking
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookingError {
    #[error("Booking cannot move from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Booking is already {0}")]
    AlreadyInState(BookingStatus),

    #[error("Flight has already departed")]
    AlreadyDeparted,
}

/// Check a status change against the lifecycle rules
pub fn validate_transition(from: BookingStatus, to: BookingStatus) -> Result<(), BookingError> {
    if from == to {
        return Err(BookingError::AlreadyInState(from));
    }
    if !from.can_transition_to(to) {
        return Err(BookingError::InvalidTransition { from, to });
    }
    Ok(())
}

/// Cancellation is allowed until departure for non-terminal bookings
pub fn validate_cancellation(
    status: BookingStatus,
    departure_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), BookingError> {
    validate_transition(status, BookingStatus::Cancelled)?;
    if now >= departure_at {
        return Err(BookingError::AlreadyDeparted);
    }
    Ok(())
}

const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const REFERENCE_LEN: usize = 6;

/// Six-character booking reference without the easily confused 0/O and 1/I
pub fn generate_reference<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..REFERENCE_LEN)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect()
}

pub fn normalize_reference(reference: &str) -> Option<String> {
    let reference = reference.trim().to_ascii_uppercase();
    (reference.len() == REFERENCE_LEN && reference.bytes().all(|b| REFERENCE_ALPHABET.contains(&b)))
        .then_some(reference)
}

/// Passenger details supplied when booking
#[derive(Debug, Clone, Deserialize)]
pub struct PassengerInput {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub passenger_type: PassengerType,
    #[serde(default)]
    pub passport_number: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub seat: Option<String>,
}

/// Request DTO for creating a booking
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub offer_id: Uuid,
    pub passengers: Vec<PassengerInput>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

/// Validate passengers and their seat choices against the seat map.
///
/// Returns the normalised seat codes in passenger order (infants get `None`) and the
/// total seat fee.
pub fn assign_seats(
    passengers: &[PassengerInput],
    seat_map: &SeatMap,
) -> Result<(Vec<Option<String>>, Decimal), String> {
    if passengers.is_empty() {
        return Err("At least one passenger is required".to_string());
    }
    if passengers.len() > MAX_PASSENGERS as usize {
        return Err(format!("At most {} passengers per booking", MAX_PASSENGERS));
    }

    let adults = passengers
        .iter()
        .filter(|p| p.passenger_type == PassengerType::Adult)
        .count();
    let infants = passengers
        .iter()
        .filter(|p| p.passenger_type == PassengerType::Infant)
        .count();
    if adults == 0 {
        return Err("At least one adult must travel".to_string());
    }
    if infants > adults {
        return Err("Each infant must travel with an adult".to_string());
    }

    let mut taken = HashSet::new();
    let mut seats = Vec::with_capacity(passengers.len());
    let mut fees = Decimal::ZERO;

    for passenger in passengers {
        if passenger.first_name.trim().is_empty() || passenger.last_name.trim().is_empty() {
            return Err("Passenger first and last names are required".to_string());
        }

        if !passenger.passenger_type.needs_seat() {
            if passenger.seat.is_some() {
                return Err("Infants cannot be assigned a seat".to_string());
            }
            seats.push(None);
            continue;
        }

        let requested = passenger
            .seat
            .as_deref()
            .ok_or_else(|| format!("A seat is required for {}", passenger.first_name.trim()))?;
        let seat = seat_map
            .seat(requested)
            .ok_or_else(|| format!("Seat {} does not exist on this flight", requested))?;
        if !seat.available {
            return Err(format!("Seat {} is already taken", seat.code));
        }
        if !taken.insert(seat.code.clone()) {
            return Err(format!("Seat {} was selected twice", seat.code));
        }

        fees += seat.fee;
        seats.push(Some(seat.code.clone()));
    }

    Ok((seats, fees))
}

/// Request to cancel a booking
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query params for listing bookings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BookingQuery {
    #[serde(default)]
    pub status: Option<BookingStatus>,
    /// Matches reference, contact email or flight number (admin only)
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassengerResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub passenger_type: PassengerType,
    pub passport_number: Option<String>,
    pub nationality: Option<String>,
    pub seat: Option<String>,
}

/// Response DTO for a booking
#[derive(Debug, Clone, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub status: BookingStatus,
    pub provider: String,
    pub provider_offer_id: String,
    pub flight_number: String,
    pub airline_code: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub cabin_class: String,
    pub seats: Vec<String>,
    pub itinerary: serde_json::Value,
    pub contact_email: String,
    pub currency: String,
    pub base_fare: Decimal,
    pub taxes: Decimal,
    pub seat_fees: Decimal,
    pub total_price: Decimal,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking with its passengers and payments
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: BookingResponse,
    pub passengers: Vec<PassengerResponse>,
    pub payments: Vec<PaymentResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flights::CabinClass;
    use chrono::Duration;
    use rand::{rngs::StdRng, SeedableRng};

    fn passenger(first: &str, kind: PassengerType, seat: Option<&str>) -> PassengerInput {
        PassengerInput {
            first_name: first.to_string(),
            last_name: "Traveller".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            passenger_type: kind,
            passport_number: None,
            nationality: None,
            seat: seat.map(str::to_string),
        }
    }

    #[test]
    fn lifecycle_transitions() {
        use BookingStatus::*;
        assert!(validate_transition(Pending, Confirmed).is_ok());
        assert!(validate_transition(Confirmed, CheckedIn).is_ok());
        assert!(validate_transition(Confirmed, Cancelled).is_ok());
        assert_eq!(
            validate_transition(Cancelled, Confirmed),
            Err(BookingError::InvalidTransition { from: Cancelled, to: Confirmed })
        );
        assert_eq!(
            validate_transition(Pending, CheckedIn),
            Err(BookingError::InvalidTransition { from: Pending, to: CheckedIn })
        );
        assert_eq!(
            validate_transition(Confirmed, Confirmed),
            Err(BookingError::AlreadyInState(Confirmed))
        );
    }

    #[test]
    fn cancellation_rules() {
        let now = Utc::now();
        let departure = now + Duration::days(3);

        assert!(validate_cancellation(BookingStatus::Confirmed, departure, now).is_ok());
        assert_eq!(
            validate_cancellation(BookingStatus::Confirmed, now - Duration::hours(1), now),
            Err(BookingError::AlreadyDeparted)
        );
        assert_eq!(
            validate_cancellation(BookingStatus::Cancelled, departure, now),
            Err(BookingError::AlreadyInState(BookingStatus::Cancelled))
        );
        assert!(validate_cancellation(BookingStatus::CheckedIn, departure, now).is_err());
    }

    #[test]
    fn references_use_unambiguous_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let reference = generate_reference(&mut rng);
            assert_eq!(reference.len(), REFERENCE_LEN);
            assert!(!reference.contains(['0', 'O', '1', 'I']));
            assert_eq!(normalize_reference(&reference.to_lowercase()), Some(reference));
        }
        assert_eq!(normalize_reference("ABC10O"), None);
        assert_eq!(normalize_reference("ABCDE"), None);
    }

    #[test]
    fn seats_are_validated_against_the_map() {
        let occupied: HashSet<String> = ["14A".to_string()].into();
        let map = SeatMap::generate(CabinClass::Economy, &occupied);

        let (seats, fees) = assign_seats(
            &[
                passenger("Ada", PassengerType::Adult, Some("20a")),
                passenger("Tim", PassengerType::Child, Some("30B")),
                passenger("Bo", PassengerType::Infant, None),
            ],
            &map,
        )
        .unwrap();
        assert_eq!(seats, vec![Some("20A".to_string()), Some("30B".to_string()), None]);
        assert_eq!(fees, Decimal::from(35));

        let taken = assign_seats(&[passenger("Ada", PassengerType::Adult, Some("14A"))], &map);
        assert_eq!(taken.unwrap_err(), "Seat 14A is already taken");

        let twice = assign_seats(
            &[
                passenger("Ada", PassengerType::Adult, Some("30A")),
                passenger("Max", PassengerType::Adult, Some("30a")),
            ],
            &map,
        );
        assert!(twice.unwrap_err().contains("selected twice"));

        let missing = assign_seats(&[passenger("Ada", PassengerType::Adult, None)], &map);
        assert!(missing.is_err());

        let no_adult = assign_seats(&[passenger("Tim", PassengerType::Child, Some("30A"))], &map);
        assert_eq!(no_adult.unwrap_err(), "At least one adult must travel");

        let lap = assign_seats(
            &[
                passenger("Ada", PassengerType::Adult, Some("30A")),
                passenger("Bo", PassengerType::Infant, Some("30B")),
            ],
            &map,
        );
        assert_eq!(lap.unwrap_err(), "Infants cannot be assigned a seat");

        assert!(assign_seats(&[], &map).is_err());
    }
}
