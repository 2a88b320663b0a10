//! Ticket Evolution wire types.
//!
//! TE payloads are not perfectly regular: the listings envelope carries
//! either `ticket_groups` or `listings`, and `retail_price` arrives as a
//! JSON number or a quoted string depending on the endpoint revision.
//! Everything irregular is normalised here, at the edge, so downstream
//! code only ever sees typed values.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// A price that may be encoded as a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PriceValue {
    Number(f64),
    Text(String),
}

impl PriceValue {
    /// Coerces to `f64`, returning `None` for unparseable strings.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// One listing from `GET /listings`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeListing {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, rename = "type")]
    pub listing_type: Option<String>,
    #[serde(default)]
    pub retail_price: Option<PriceValue>,
    #[serde(default)]
    pub available_quantity: Option<i64>,
    #[serde(default)]
    pub splits: Vec<i64>,
    #[serde(default)]
    pub public_notes: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Envelope for `GET /listings`. Older responses use `listings`, newer
/// ones `ticket_groups`; `ticket_groups` wins when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeListingsPage {
    #[serde(default)]
    pub ticket_groups: Option<Vec<TeListing>>,
    #[serde(default)]
    pub listings: Option<Vec<TeListing>>,
}

impl TeListingsPage {
    /// Flattens the envelope into a single listings vector.
    #[must_use]
    pub fn into_listings(self) -> Vec<TeListing> {
        self.ticket_groups.or(self.listings).unwrap_or_default()
    }
}

/// Venue block of an event payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeVenue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Category block of an event payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeCategory {
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One event from `GET /events/<id>` or the paged `GET /events` listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeEvent {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub occurs_at: Option<String>,
    #[serde(default)]
    pub venue: Option<TeVenue>,
    #[serde(default)]
    pub category: Option<TeCategory>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl TeEvent {
    /// Parses `occurs_at` as a UTC instant.
    ///
    /// TE usually sends a bare local datetime without an offset; such
    /// values are taken at face value. Offset-carrying RFC 3339 strings
    /// are converted.
    #[must_use]
    pub fn occurs_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.occurs_at.as_deref()?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Best display label for the category: `short_name`, then `slug`,
    /// then `name`.
    #[must_use]
    pub fn category_label(&self) -> Option<&str> {
        let cat = self.category.as_ref()?;
        cat.short_name
            .as_deref()
            .or(cat.slug.as_deref())
            .or(cat.name.as_deref())
    }
}

/// Envelope for the paged `GET /events` listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeEventsPage {
    #[serde(default)]
    pub events: Vec<TeEvent>,
    #[serde(default)]
    pub total_entries: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
    #[serde(default)]
    pub current_page: Option<i64>,
}
