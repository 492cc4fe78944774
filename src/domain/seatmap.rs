//! Seat map generation
//!
//! Providers don't return seat maps with their offers, so every flight gets the same
//! generated narrow-body layout and occupancy comes from our own bookings.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

use super::flights::CabinClass;

const FORWARD_ROWS: std::ops::RangeInclusive<u32> = 1..=5;
const FORWARD_LAYOUT: &str = "AC DF";
const MAIN_ROWS: std::ops::RangeInclusive<u32> = 10..=39;
const MAIN_LAYOUT: &str = "ABC DEF";
const EXIT_ROWS: [u32; 2] = [20, 21];
const PREFERRED_ROWS: std::ops::RangeInclusive<u32> = 10..=14;

const EXTRA_LEGROOM_FEE: i64 = 35;
const PREFERRED_FEE: i64 = 15;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatKind {
    Standard,
    Preferred,
    ExtraLegroom,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatPosition {
    Window,
    Middle,
    Aisle,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Seat {
    /// e.g. `12A`
    pub code: String,
    pub row: u32,
    pub letter: char,
    pub kind: SeatKind,
    pub position: SeatPosition,
    pub fee: Decimal,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatRow {
    pub number: u32,
    pub seats: Vec<Seat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatMap {
    pub cabin: CabinClass,
    /// Seat letters with a space marking the aisle, e.g. `ABC DEF`
    pub layout: String,
    pub rows: Vec<SeatRow>,
}

impl SeatMap {
    /// Build the seat map for a cabin, marking `occupied` seat codes unavailable
    pub fn generate(cabin: CabinClass, occupied: &HashSet<String>) -> Self {
        let (rows, layout) = if cabin.is_forward_cabin() {
            (FORWARD_ROWS, FORWARD_LAYOUT)
        } else {
            (MAIN_ROWS, MAIN_LAYOUT)
        };

        let rows = rows
            .map(|number| SeatRow {
                number,
                seats: seats_in_row(number, layout, cabin, occupied),
            })
            .collect();

        Self {
            cabin,
            layout: layout.to_string(),
            rows,
        }
    }

    pub fn seat(&self, code: &str) -> Option<&Seat> {
        let code = code.trim().to_ascii_uppercase();
        self.rows
            .iter()
            .flat_map(|r| r.seats.iter())
            .find(|s| s.code == code)
    }

    pub fn available_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.seats.iter())
            .filter(|s| s.available)
            .count()
    }
}

fn seats_in_row(
    row: u32,
    layout: &str,
    cabin: CabinClass,
    occupied: &HashSet<String>,
) -> Vec<Seat> {
    let blocks: Vec<&str> = layout.split(' ').collect();
    let kind = seat_kind(row, cabin);
    let fee = match kind {
        SeatKind::Standard => Decimal::ZERO,
        SeatKind::Preferred => Decimal::from(PREFERRED_FEE),
        SeatKind::ExtraLegroom => Decimal::from(EXTRA_LEGROOM_FEE),
    };

    let mut seats = Vec::new();
    for (block_index, block) in blocks.iter().enumerate() {
        let letters: Vec<char> = block.chars().collect();
        for (i, letter) in letters.iter().enumerate() {
            let at_outer_edge = (block_index == 0 && i == 0)
                || (block_index == blocks.len() - 1 && i == letters.len() - 1);
            let at_aisle = (block_index < blocks.len() - 1 && i == letters.len() - 1)
                || (block_index > 0 && i == 0);

            let position = if at_outer_edge {
                SeatPosition::Window
            } else if at_aisle {
                SeatPosition::Aisle
            } else {
                SeatPosition::Middle
            };

            let code = format!("{}{}", row, letter);
            seats.push(Seat {
                available: !occupied.contains(&code),
                code,
                row,
                letter: *letter,
                kind,
                position,
                fee,
            });
        }
    }
    seats
}

fn seat_kind(row: u32, cabin: CabinClass) -> SeatKind {
    if cabin.is_forward_cabin() {
        // Forward cabin fares include seat selection
        SeatKind::Standard
    } else if EXIT_ROWS.contains(&row) {
        SeatKind::ExtraLegroom
    } else if PREFERRED_ROWS.contains(&row) {
        SeatKind::Preferred
    } else {
        SeatKind::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn economy_layout_and_fees() {
        let map = SeatMap::generate(CabinClass::Economy, &HashSet::new());
        assert_eq!(map.rows.len(), 30);
        assert_eq!(map.rows[0].number, 10);
        assert_eq!(map.rows[0].seats.len(), 6);
        assert_eq!(map.available_count(), 180);

        let a = map.seat("10A").unwrap();
        assert_eq!(a.position, SeatPosition::Window);
        assert_eq!(a.kind, SeatKind::Preferred);
        assert_eq!(a.fee, Decimal::from(15));

        assert_eq!(map.seat("20b").unwrap().position, SeatPosition::Middle);
        assert_eq!(map.seat("20C").unwrap().position, SeatPosition::Aisle);
        assert_eq!(map.seat("20D").unwrap().position, SeatPosition::Aisle);
        assert_eq!(map.seat("20F").unwrap().position, SeatPosition::Window);
        assert_eq!(map.seat("21D").unwrap().kind, SeatKind::ExtraLegroom);
        assert_eq!(map.seat("30E").unwrap().fee, Decimal::ZERO);

        assert!(map.seat("2A").is_none());
        assert!(map.seat("40A").is_none());
    }

    #[test]
    fn forward_cabin_has_four_abreast() {
        let map = SeatMap::generate(CabinClass::Business, &HashSet::new());
        assert_eq!(map.rows.len(), 5);
        assert_eq!(map.layout, "AC DF");

        let row: Vec<&str> = map.rows[0].seats.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(row, vec!["1A", "1C", "1D", "1F"]);
        assert_eq!(map.seat("1C").unwrap().position, SeatPosition::Aisle);
        assert!(map.seat("1B").is_none());
        assert!(map.rows.iter().flat_map(|r| &r.seats).all(|s| s.fee.is_zero()));
    }

    #[test]
    fn occupied_seats_are_unavailable() {
        let occupied: HashSet<String> = ["12A".to_string(), "12B".to_string()].into();
        let map = SeatMap::generate(CabinClass::Economy, &occupied);

        assert!(!map.seat("12A").unwrap().available);
        assert!(!map.seat("12B").unwrap().available);
        assert!(map.seat("12C").unwrap().available);
        assert_eq!(map.available_count(), 178);
    }
}
