//! SEO URL derivation for an event.
//!
//! The widget links every chart through a deterministic URL derived from
//! TE event metadata. The slug grammar is owned by the destination site,
//! so the rules here are exact rather than pretty: `&` becomes `and`,
//! parentheses survive, and a spaced hyphen (` - `) must come out as a
//! literal triple hyphen while every other punctuation run collapses to
//! a single one.
//!
//! Missing id, name, or occurs_at fails the build. Callers that need a
//! regenerated URL must treat that failure as fatal for the event.

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use chrono_tz::Tz;

use crate::te::types::TeEvent;

/// Fallback when the payload names no timezone.
const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Chicago;

/// Placeholder protecting ` - ` through the punctuation-collapse pass.
const SPACED_HYPHEN_MARK: char = '\u{1}';

/// URL derivation failure. Always fatal for the affected event.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("event payload is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("occurs_at is not a recognisable datetime: {0}")]
    BadTimestamp(String),
}

/// Slugifies one text fragment per the destination-site grammar.
#[must_use]
pub fn slugify(input: &str) -> String {
    let marked = input.replace(" - ", &SPACED_HYPHEN_MARK.to_string());
    let lowered = marked.to_lowercase().replace('&', "and");

    let mut out = String::with_capacity(lowered.len());
    let mut last_dash = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() || ch == '(' || ch == ')' || ch == SPACED_HYPHEN_MARK {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    out.replace(SPACED_HYPHEN_MARK, "---")
        .trim_matches('-')
        .to_string()
}

/// Renders the date segment (`friday-25-july-at-7:30-pm`) from an
/// event-local wall time.
fn date_segment(local: NaiveDateTime) -> String {
    let day_name = local.format("%A").to_string().to_lowercase();
    let month_name = local.format("%B").to_string().to_lowercase();
    let (is_pm, hour12) = local.time().hour12();
    let meridiem = if is_pm { "pm" } else { "am" };
    format!(
        "{day_name}-{}-{month_name}-at-{}:{:02}-{meridiem}",
        local.day(),
        hour12,
        local.minute()
    )
}

/// Resolves `occurs_at` into the event-local wall time used for the
/// date segment. Offset-carrying instants are converted into the event
/// timezone; bare datetimes are already event-local.
fn local_wall_time(event: &TeEvent, raw: &str) -> Result<NaiveDateTime, UrlError> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        let tz: Tz = event
            .timezone
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or(DEFAULT_TIMEZONE);
        return Ok(instant.with_timezone(&tz).naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| UrlError::BadTimestamp(raw.to_string()))
}

/// Builds the canonical SEO URL for an event.
///
/// # Errors
///
/// Returns [`UrlError`] when the payload lacks id, name, or a parseable
/// `occurs_at`.
pub fn build_olt_url(base: &str, event: &TeEvent) -> Result<String, UrlError> {
    let id = event.id.ok_or(UrlError::MissingField("id"))?;
    let name = event
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .ok_or(UrlError::MissingField("name"))?;
    let raw_occurs = event
        .occurs_at
        .as_deref()
        .ok_or(UrlError::MissingField("occurs_at"))?;

    let local = local_wall_time(event, raw_occurs)?;

    let venue = event.venue.as_ref();
    let city = slugify(venue.and_then(|v| v.city.as_deref()).unwrap_or_default());
    let state = slugify(
        venue
            .and_then(|v| v.state_code.as_deref().or(v.state.as_deref()))
            .unwrap_or_default(),
    );
    let venue_name = slugify(venue.and_then(|v| v.name.as_deref()).unwrap_or_default());
    let category = slugify(event.category_label().unwrap_or_default());

    Ok(format!(
        "{}/events/{}-tickets_{}-{}_{}_{}_{}/{}?listingsType=event&orderListBy=retail_price%20asc&quantity=2",
        base.trim_end_matches('/'),
        slugify(name),
        city,
        state,
        venue_name,
        date_segment(local),
        category,
        id
    ))
}
