//! Domain types, DTOs and business rules
//!
//! Everything here is free of I/O so the rules can be tested in isolation.

pub mod admin;
pub mod bookings;
pub mod checkin;
pub mod flights;
pub mod payments;
pub mod pricing;
pub mod reference;
pub mod seatmap;
pub mod users;
