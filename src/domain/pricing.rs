//! Price comparison across providers and booking price breakdowns

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::bookings::PassengerType;
use super::flights::FlightOffer;

fn seller_key(offer: &FlightOffer) -> (&str, &str) {
    (offer.provider.as_str(), offer.provider_offer_id.as_str())
}

/// Equal prices fall back to the seller so the winner does not depend on input order
fn cheaper(candidate: &FlightOffer, current: &FlightOffer) -> bool {
    candidate
        .price
        .total
        .cmp(&current.price.total)
        .then_with(|| seller_key(candidate).cmp(&seller_key(current)))
        .is_lt()
}

/// Collapse offers for the same flights into the cheapest one and sort the result.
///
/// The surviving offer lists every provider that sold the same flights in
/// `compared_providers`. Ordering is total price, then total duration, then
/// departure time of the first segment, then provider and provider offer id.
pub fn compare_offers(offers: Vec<FlightOffer>) -> Vec<FlightOffer> {
    let mut best: HashMap<String, FlightOffer> = HashMap::new();
    let mut providers: HashMap<String, Vec<String>> = HashMap::new();

    for offer in offers {
        if offer.itineraries.is_empty() {
            continue;
        }

        let identity = offer.identity();
        let seen = providers.entry(identity.clone()).or_default();
        if !seen.contains(&offer.provider) {
            seen.push(offer.provider.clone());
        }

        match best.get(&identity) {
            Some(current) if !cheaper(&offer, current) => {}
            _ => {
                best.insert(identity, offer);
            }
        }
    }

    let mut result: Vec<FlightOffer> = best
        .into_iter()
        .map(|(identity, mut offer)| {
            let mut sellers = providers.remove(&identity).unwrap_or_default();
            sellers.sort();
            offer.compared_providers = sellers;
            offer
        })
        .collect();

    result.sort_by(|a, b| {
        a.price
            .total
            .cmp(&b.price.total)
            .then_with(|| a.total_duration_minutes().cmp(&b.total_duration_minutes()))
            .then_with(|| {
                let dep_a = a.first_segment().map(|s| s.departure_at);
                let dep_b = b.first_segment().map(|s| s.departure_at);
                dep_a.cmp(&dep_b)
            })
            .then_with(|| seller_key(a).cmp(&seller_key(b)))
    });

    result
}

/// Infants travel on a lap at a fraction of the adult base fare
const INFANT_FARE_PERCENT: i64 = 10;

/// Money owed for a booking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBreakdown {
    pub currency: String,
    pub base_fare: Decimal,
    pub taxes: Decimal,
    pub seat_fees: Decimal,
    pub total: Decimal,
}

impl PriceBreakdown {
    /// Price a booking from the offer's per-passenger fare.
    ///
    /// The offer price covers `offer.passengers` ticketed travellers; adults and
    /// children each pay one share, infants pay a tenth of the base share and no taxes.
    pub fn compute(offer: &FlightOffer, passengers: &[PassengerType], seat_fees: Decimal) -> Self {
        let share = Decimal::from(offer.passengers.max(1));
        let base_share = offer.price.base / share;
        let tax_share = offer.price.taxes / share;

        let mut base_fare = Decimal::ZERO;
        let mut taxes = Decimal::ZERO;
        for passenger in passengers {
            match passenger {
                PassengerType::Adult | PassengerType::Child => {
                    base_fare += base_share;
                    taxes += tax_share;
                }
                PassengerType::Infant => {
                    base_fare += base_share * Decimal::from(INFANT_FARE_PERCENT) / Decimal::from(100);
                }
            }
        }

        let base_fare = base_fare.round_dp(2);
        let taxes = taxes.round_dp(2);
        let seat_fees = seat_fees.round_dp(2);

        Self {
            currency: offer.price.currency.clone(),
            base_fare,
            taxes,
            seat_fees,
            total: base_fare + taxes + seat_fees,
        }
    }
}

/// Amount in the currency's minor unit, as payment gateways expect
pub fn to_minor_units(amount: Decimal) -> i64 {
    use rust_decimal::prelude::ToPrimitive;
    (amount * Decimal::from(100)).round().to_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flights::tests::{offer, segment};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn ties_order_by_seller_regardless_of_input() {
        let at = "2026-11-02T08:30";
        let forward = vec![
            offer("duffel", "399.00", vec![segment("VS", "3", "LHR", "JFK", at)]),
            offer("amadeus", "399.00", vec![segment("BA", "117", "LHR", "JFK", at)]),
            offer("duffel", "420.00", vec![segment("AA", "100", "LHR", "JFK", at)]),
            offer("amadeus", "420.00", vec![segment("AA", "100", "LHR", "JFK", at)]),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        for offers in [forward, backward] {
            let result = compare_offers(offers);
            let sellers: Vec<(&str, &str)> = result
                .iter()
                .map(|o| (o.provider.as_str(), o.validating_carrier.as_str()))
                .collect();
            assert_eq!(sellers, vec![("amadeus", "BA"), ("duffel", "VS"), ("amadeus", "AA")]);
            assert_eq!(result[2].compared_providers, vec!["amadeus", "duffel"]);
        }
    }

    #[test]
    fn duplicate_flights_collapse_into_cheapest() {
        let offers = vec![
            offer("amadeus", "420.00", vec![segment("BA", "117", "LHR", "JFK", "2026-11-02T08:30")]),
            offer("duffel", "399.00", vec![segment("BA", "117", "LHR", "JFK", "2026-11-02T08:30")]),
            offer("duffel", "350.00", vec![segment("VS", "3", "LHR", "JFK", "2026-11-02T11:00")]),
        ];

        let compared = compare_offers(offers);
        assert_eq!(compared.len(), 2);

        assert_eq!(compared[0].validating_carrier, "VS");
        assert_eq!(compared[0].compared_providers, vec!["duffel".to_string()]);

        assert_eq!(compared[1].price.total, dec("399.00"));
        assert_eq!(compared[1].provider, "duffel");
        assert_eq!(
            compared[1].compared_providers,
            vec!["amadeus".to_string(), "duffel".to_string()]
        );
    }

    #[test]
    fn equal_prices_prefer_shorter_then_earlier() {
        let mut long = offer("amadeus", "300.00", vec![segment("AA", "100", "LHR", "JFK", "2026-11-02T07:00")]);
        long.itineraries[0].duration_minutes = 600;
        let short = offer("amadeus", "300.00", vec![segment("AA", "200", "LHR", "JFK", "2026-11-02T09:00")]);
        let later = offer("amadeus", "300.00", vec![segment("AA", "300", "LHR", "JFK", "2026-11-02T12:00")]);

        let compared = compare_offers(vec![later, long, short]);
        let numbers: Vec<&str> = compared
            .iter()
            .map(|o| o.first_segment().unwrap().flight_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["200", "300", "100"]);
    }

    #[test]
    fn breakdown_splits_fare_per_passenger() {
        let mut o = offer("amadeus", "500.00", vec![segment("BA", "117", "LHR", "JFK", "2026-11-02T08:30")]);
        o.passengers = 2;
        o.price.base = dec("400.00");
        o.price.taxes = dec("100.00");

        let breakdown = PriceBreakdown::compute(
            &o,
            &[PassengerType::Adult, PassengerType::Child, PassengerType::Infant],
            dec("30"),
        );

        assert_eq!(breakdown.base_fare, dec("420.00"));
        assert_eq!(breakdown.taxes, dec("100.00"));
        assert_eq!(breakdown.seat_fees, dec("30.00"));
        assert_eq!(breakdown.total, dec("550.00"));
        assert_eq!(to_minor_units(breakdown.total), 55000);
    }

    #[test]
    fn minor_units_round_half_cents() {
        assert_eq!(to_minor_units(dec("10.005")), 1000);
        assert_eq!(to_minor_units(dec("10.015")), 1002);
        assert_eq!(to_minor_units(dec("0.99")), 99);
    }
}
