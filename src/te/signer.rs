//! Request signing for the Ticket Evolution API.
//!
//! Every TE request carries an `X-Signature` header: base64 of an
//! HMAC-SHA256 over a canonical string of the form
//!
//! ```text
//! GET api.ticketevolution.com/v9/listings?event_id=603615&type=event
//! ```
//!
//! Two details are load-bearing and rejected with a 401 when wrong: the
//! query section starts with `?` even when there are no parameters, and
//! the hostname is part of the signed string.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// RFC 3986 unreserved characters stay literal; everything else is
/// escaped. Spaces become `%20`, never `+`.
pub(crate) const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Builds the canonical string to be signed.
///
/// `path` must carry the version prefix (e.g. `/v9/listings`). Query keys
/// are sorted lexicographically; keys and values are percent-encoded.
#[must_use]
pub fn canonical_string(
    method: &str,
    host: &str,
    path: &str,
    query: &BTreeMap<String, String>,
) -> String {
    let mut qs = String::from("?");
    for (i, (key, value)) in query.iter().enumerate() {
        if i > 0 {
            qs.push('&');
        }
        qs.push_str(&utf8_percent_encode(key, QUERY_ENCODE_SET).to_string());
        qs.push('=');
        qs.push_str(&utf8_percent_encode(value, QUERY_ENCODE_SET).to_string());
    }
    format!("{method} {host}{path}{qs}")
}

/// Signs a canonical string with the API secret.
#[must_use]
pub fn sign(secret: &str, canonical: &str) -> String {
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret.as_bytes());
    let tag = ring::hmac::sign(&key, canonical.as_bytes());
    BASE64.encode(tag.as_ref())
}

/// Convenience wrapper: canonicalize and sign in one step.
#[must_use]
pub fn sign_request(
    secret: &str,
    method: &str,
    host: &str,
    path: &str,
    query: &BTreeMap<String, String>,
) -> String {
    sign(secret, &canonical_string(method, host, path, query))
}
