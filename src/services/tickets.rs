//! E-ticket artifacts: the signed QR payload, its SVG rendering and the PDF ticket.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference, Rect};
use qrcode::{render::svg, Color, QrCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tickets stay scannable until a day after arrival
const VALID_AFTER_ARRIVAL_HOURS: i64 = 24;

/// Claims carried in the QR code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketClaims {
    /// Booking id
    pub sub: String,
    pub reference: String,
    pub flight_number: String,
    pub departure_at: DateTime<Utc>,
    pub passengers: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TicketClaims {
    pub fn new(
        booking_id: Uuid,
        reference: &str,
        flight_number: &str,
        departure_at: DateTime<Utc>,
        arrival_at: DateTime<Utc>,
        passengers: Vec<String>,
    ) -> Self {
        Self {
            sub: booking_id.to_string(),
            reference: reference.to_string(),
            flight_number: flight_number.to_string(),
            departure_at,
            passengers,
            iat: Utc::now().timestamp(),
            exp: (arrival_at + Duration::hours(VALID_AFTER_ARRIVAL_HOURS)).timestamp(),
        }
    }

    pub fn booking_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

pub fn encode_ticket_payload(claims: &TicketClaims, secret: &str) -> Result<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to sign ticket payload")
}

/// Verify a scanned payload's signature and expiry
pub fn decode_ticket_payload(payload: &str, secret: &str) -> Result<TicketClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let data = decode::<TicketClaims>(
        payload.trim(),
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .context("Ticket payload is invalid or expired")?;

    Ok(data.claims)
}

pub fn render_qr_svg(payload: &str) -> Result<String> {
    let code = QrCode::new(payload.as_bytes()).context("Failed to encode QR code")?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .quiet_zone(true)
        .build())
}

// =============================================================================
// PDF
// =============================================================================

#[derive(Debug, Clone)]
pub struct TicketPassenger {
    pub name: String,
    pub passenger_type: String,
    pub seat: Option<String>,
}

/// Everything printed on a ticket
#[derive(Debug, Clone)]
pub struct TicketData {
    pub reference: String,
    pub status: String,
    pub airline_code: String,
    pub airline_name: Option<String>,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub cabin_class: String,
    pub passengers: Vec<TicketPassenger>,
    pub qr_payload: String,
}

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const QR_SIZE: f32 = 60.0;

/// One A4 page per passenger
pub fn render_ticket_pdf(ticket: &TicketData) -> Result<Vec<u8>> {
    if ticket.passengers.is_empty() {
        return Err(anyhow!("Ticket has no passengers"));
    }

    let qr = QrCode::new(ticket.qr_payload.as_bytes()).context("Failed to encode QR code")?;

    let (doc, first_page, first_layer) = PdfDocument::new(
        format!("E-ticket {}", ticket.reference),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Ticket".to_string(),
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("Failed to load font: {:?}", e))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("Failed to load font: {:?}", e))?;

    for (index, passenger) in ticket.passengers.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Ticket");
            doc.get_page(page).get_layer(layer)
        };

        draw_page(&layer, ticket, passenger, &regular, &bold);
        draw_qr(&layer, &qr, PAGE_WIDTH - MARGIN - QR_SIZE, PAGE_HEIGHT - 70.0 - QR_SIZE);
    }

    doc.save_to_bytes()
        .map_err(|e| anyhow!("Failed to write ticket PDF: {:?}", e))
}

fn draw_page(
    layer: &PdfLayerReference,
    ticket: &TicketData,
    passenger: &TicketPassenger,
    regular: &IndirectFontRef,
    bold: &IndirectFontRef,
) {
    let airline = ticket
        .airline_name
        .clone()
        .unwrap_or_else(|| ticket.airline_code.clone());

    layer.use_text("ELECTRONIC TICKET", 22.0, Mm(MARGIN), Mm(PAGE_HEIGHT - 30.0), bold);
    layer.use_text(
        format!("Booking reference {}", ticket.reference),
        13.0,
        Mm(MARGIN),
        Mm(PAGE_HEIGHT - 42.0),
        regular,
    );
    layer.use_text(
        format!("Status: {}", ticket.status.replace('_', " ")),
        11.0,
        Mm(MARGIN),
        Mm(PAGE_HEIGHT - 50.0),
        regular,
    );

    let lines = [
        ("Passenger", format!("{} ({})", passenger.name, passenger.passenger_type)),
        ("Airline", airline),
        ("Flight", ticket.flight_number.clone()),
        ("From", ticket.origin.clone()),
        ("To", ticket.destination.clone()),
        ("Departure", ticket.departure_at.format("%a %d %b %Y %H:%M UTC").to_string()),
        ("Arrival", ticket.arrival_at.format("%a %d %b %Y %H:%M UTC").to_string()),
        ("Cabin", ticket.cabin_class.replace('_', " ")),
        ("Seat", passenger.seat.clone().unwrap_or_else(|| "Lap infant".to_string())),
    ];

    let mut y = PAGE_HEIGHT - 75.0;
    for (label, value) in lines {
        layer.use_text(label, 10.0, Mm(MARGIN), Mm(y), bold);
        layer.use_text(value, 12.0, Mm(MARGIN + 32.0), Mm(y), regular);
        y -= 10.0;
    }

    layer.use_text(
        "Present this ticket and a valid photo ID at the gate.",
        9.0,
        Mm(MARGIN),
        Mm(MARGIN),
        regular,
    );
}

/// Draw the QR modules as filled squares with `(x, y)` the lower-left corner
fn draw_qr(layer: &PdfLayerReference, qr: &QrCode, x: f32, y: f32) {
    let width = qr.width();
    let module = QR_SIZE / width as f32;
    let top = y + QR_SIZE;

    for (i, color) in qr.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let col = (i % width) as f32;
        let row = (i / width) as f32;
        layer.add_rect(Rect::new(
            Mm(x + col * module),
            Mm(top - (row + 1.0) * module),
            Mm(x + (col + 1.0) * module),
            Mm(top - row * module),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "ticket-secret-ticket-secret-1234";

    fn claims(arrival_offset_hours: i64) -> TicketClaims {
        let arrival = Utc::now() + Duration::hours(arrival_offset_hours);
        TicketClaims::new(
            Uuid::new_v4(),
            "K7QX2M",
            "BA117",
            arrival - Duration::hours(8),
            arrival,
            vec!["Ada Lovelace".to_string()],
        )
    }

    #[test]
    fn payloads_verify_with_the_signing_secret() {
        let claims = claims(48);
        let payload = encode_ticket_payload(&claims, SECRET).unwrap();

        let decoded = decode_ticket_payload(&payload, SECRET).unwrap();
        assert_eq!(decoded, claims);
        assert!(decoded.booking_id().is_some());

        assert!(decode_ticket_payload(&payload, "another-secret-another-secret-12").is_err());
        assert!(decode_ticket_payload("garbage", SECRET).is_err());
    }

    #[test]
    fn payloads_expire_a_day_after_arrival() {
        let still_valid = encode_ticket_payload(&claims(-12), SECRET).unwrap();
        assert!(decode_ticket_payload(&still_valid, SECRET).is_ok());

        let expired = encode_ticket_payload(&claims(-25), SECRET).unwrap();
        assert!(decode_ticket_payload(&expired, SECRET).is_err());
    }

    #[test]
    fn qr_svg_renders() {
        let svg = render_qr_svg("K7QX2M").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn pdf_has_a_page_per_passenger() {
        let departure = Utc::now() + Duration::days(3);
        let ticket = TicketData {
            reference: "K7QX2M".to_string(),
            status: "confirmed".to_string(),
            airline_code: "BA".to_string(),
            airline_name: Some("British Airways".to_string()),
            flight_number: "BA117".to_string(),
            origin: "LHR".to_string(),
            destination: "JFK".to_string(),
            departure_at: departure,
            arrival_at: departure + Duration::hours(8),
            cabin_class: "economy".to_string(),
            passengers: vec![
                TicketPassenger {
                    name: "Ada Lovelace".to_string(),
                    passenger_type: "adult".to_string(),
                    seat: Some("12A".to_string()),
                },
                TicketPassenger {
                    name: "Byron Lovelace".to_string(),
                    passenger_type: "infant".to_string(),
                    seat: None,
                },
            ],
            qr_payload: encode_ticket_payload(&claims(48), SECRET).unwrap(),
        };

        let pdf = render_ticket_pdf(&ticket).unwrap();
        assert!(pdf.starts_with(b"%PDF"));

        let mut empty = ticket;
        empty.passengers.clear();
        assert!(render_ticket_pdf(&empty).is_err());
    }
}
