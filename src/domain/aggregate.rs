//! Hourly price aggregation over TE listings.
//!
//! A listing only contributes to the aggregate when it is actually
//! buyable through the widget's flow: correct type, no broker notes that
//! void fulfilment, a sane price, enough inventory, and a split that
//! admits a pair of tickets. Everything else is noise and is dropped
//! before any arithmetic happens.

use crate::te::types::TeListing;

/// Upper bound (exclusive) for a plausible retail price.
const MAX_RETAIL_PRICE: f64 = 100_000.0;

/// Quantity window: at least a pair, below obviously-bogus inventory.
const MIN_QUANTITY: i64 = 2;
const MAX_QUANTITY: i64 = 10_000;

/// Broker-note phrases that mark a listing as non-buyable.
const NON_BUYABLE_PHRASES: [&str; 5] = [
    "will be rejected",
    "accepted but not fulfilled",
    "will be accepted but not fulfilled",
    "will remain pending",
    "not fulfilled",
];

/// Aggregate of the eligible listings for one (event, hour) cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceAggregate {
    pub min_price: f64,
    pub avg_price: f64,
    pub max_price: f64,
    pub listing_count: i32,
}

/// Whether one listing passes the eligibility predicate.
#[must_use]
pub fn is_eligible(listing: &TeListing) -> bool {
    if listing.listing_type.as_deref() != Some("event") {
        return false;
    }

    let notes = format!(
        "{} {}",
        listing.public_notes.as_deref().unwrap_or_default(),
        listing.notes.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    if NON_BUYABLE_PHRASES.iter().any(|phrase| notes.contains(phrase)) {
        return false;
    }

    let Some(price) = listing.retail_price.as_ref().and_then(|p| p.as_f64()) else {
        return false;
    };
    if !(price > 0.0 && price < MAX_RETAIL_PRICE) {
        return false;
    }

    let Some(quantity) = listing.available_quantity else {
        return false;
    };
    if !(MIN_QUANTITY..MAX_QUANTITY).contains(&quantity) {
        return false;
    }

    listing.splits.contains(&2)
}

/// Reduces a listings payload to the hourly aggregate.
///
/// Returns `None` when no listing is eligible; the poller records that
/// hour as captured-with-no-data rather than failed.
#[must_use]
pub fn aggregate_listings(listings: &[TeListing]) -> Option<PriceAggregate> {
    let prices: Vec<f64> = listings
        .iter()
        .filter(|l| is_eligible(l))
        .filter_map(|l| l.retail_price.as_ref().and_then(|p| p.as_f64()))
        .collect();

    if prices.is_empty() {
        return None;
    }

    let min_price = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max_price = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;

    Some(PriceAggregate {
        min_price,
        avg_price: round2(mean),
        max_price,
        listing_count: prices.len() as i32,
    })
}

/// Rounds to two decimal places (cent precision).
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
