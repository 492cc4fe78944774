pub mod admin;
pub mod auth;
pub mod bookings;
pub mod flights;
pub mod health;
pub mod me;
pub mod payments;
pub mod reference;
pub mod tickets;
pub mod webhooks;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Session
        .route("/auth/session", get(auth::session))
        .route("/me", get(auth::session).put(me::update_me))
        .route("/me/password", post(me::change_password))
        // Flights
        .route("/flights/search", get(flights::search_flights))
        .route("/flights/offers/:offer_id", get(flights::get_offer))
        .route("/flights/offers/:offer_id/seats", get(flights::get_seat_map))
        .route("/flights/status/:flight_iata", get(flights::get_flight_status))
        // Reference data
        .route("/airlines", get(reference::list_airlines))
        .route("/airlines/:iata", get(reference::get_airline))
        .route("/airports", get(reference::list_airports))
        .route("/airports/:iata", get(reference::get_airport))
        // Bookings
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/bookings/:id", get(bookings::get_booking))
        .route(
            "/bookings/reference/:reference",
            get(bookings::get_booking_by_reference),
        )
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/bookings/:id/check-in", post(bookings::check_in))
        // Payments (nested under bookings)
        .route(
            "/bookings/:id/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/payments/:id/sync", post(payments::sync_payment))
        // Tickets
        .route("/bookings/:id/ticket", get(tickets::get_ticket_pdf))
        .route("/bookings/:id/ticket/qr", get(tickets::get_ticket_qr))
        .route("/tickets/verify", post(tickets::verify_ticket))
        // Admin
        .route("/admin/check", get(admin::check_admin))
        .route("/admin/stats", get(admin::get_admin_stats))
        .route("/admin/users", get(admin::list_users))
        .route(
            "/admin/users/:id",
            get(admin::get_user)
                .patch(admin::update_user)
                .delete(admin::delete_user),
        )
        .route("/admin/bookings", get(admin::list_bookings))
        .route("/admin/bookings/:id", get(admin::get_booking))
        .route(
            "/admin/bookings/:id/status",
            patch(admin::update_booking_status),
        )
        .route("/admin/airlines", get(admin::list_airlines))
        .route("/admin/airports", get(admin::list_airports))
        .route("/admin/flights", get(admin::list_flights))
        .route("/admin/audit-log", get(admin::list_audit_log))
}
