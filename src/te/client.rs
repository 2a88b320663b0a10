//! Signed HTTP client for the Ticket Evolution API.
//!
//! All requests are GETs authenticated with `X-Token` / `X-Signature`
//! headers (see [`crate::te::signer`]). Transient upstream failures are
//! retried with exponential backoff; everything else is classified and
//! returned to the caller, which decides whether the failure is fatal
//! for the run or only for one event.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::utf8_percent_encode;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use crate::te::signer;
use crate::te::types::{TeEvent, TeEventsPage, TeListing, TeListingsPage};

/// Request timeout applied to every TE call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP statuses worth retrying.
const TRANSIENT_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Classified TE client failure.
#[derive(Debug, thiserror::Error)]
pub enum TeError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Retryable HTTP status. Only observed inside the retry loop; it
    /// escapes to callers wrapped in [`TeError::RetryExhausted`].
    #[error("transient http {status}: {body}")]
    TransientHttp { status: u16, body: String },

    /// Non-retryable HTTP status (4xx other than 408/429).
    #[error("permanent http {status}: {body}")]
    PermanentHttp { status: u16, body: String },

    /// Response body was not the expected JSON shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Retries were exhausted on a transient failure.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },
}

impl TeError {
    /// Whether the retry loop may try again on this failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::TransientHttp { .. })
    }
}

/// Whether an HTTP status code counts as transient.
#[must_use]
pub fn is_transient_status(status: u16) -> bool {
    TRANSIENT_STATUSES.contains(&status)
}

/// Read-side surface of the TE API consumed by the services.
///
/// Kept as a trait so the poller and refresher can be exercised against
/// scripted responses.
#[async_trait]
pub trait TeApi: Send + Sync {
    /// `GET /listings?event_id=<id>&type=event`, flattened to listings.
    async fn listings(&self, event_id: i64) -> Result<Vec<TeListing>, TeError>;

    /// `GET /events/<id>`.
    async fn event(&self, event_id: i64) -> Result<TeEvent, TeError>;

    /// One page of `GET /events?performer_id=<id>` for bulk discovery.
    async fn events_by_performer(
        &self,
        performer_id: i64,
        page: u32,
        per_page: u32,
        primary: Option<bool>,
    ) -> Result<TeEventsPage, TeError>;
}

/// Production TE client.
pub struct TeClient {
    http: reqwest::Client,
    base: Url,
    token: String,
    secret: SecretString,
    max_retries: u32,
}

impl TeClient {
    /// Builds a client for the given base URL (version prefix included,
    /// e.g. `https://api.sandbox.ticketevolution.com/v9`).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the underlying
    /// HTTP client cannot be constructed.
    pub fn new(
        base_url: &str,
        token: String,
        secret: SecretString,
        max_retries: u32,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base = Url::parse(base_url)?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base,
            token,
            secret,
            max_retries,
        })
    }

    /// Resolves an endpoint path (leading `/`) against the base URL and
    /// attaches the query string with the same percent-encoding the
    /// signature uses.
    fn endpoint_url(&self, path: &str, query: &BTreeMap<String, String>) -> Url {
        let mut url = self.base.clone();
        let full_path = format!("{}{}", self.base.path().trim_end_matches('/'), path);
        url.set_path(&full_path);
        if query.is_empty() {
            url.set_query(None);
        } else {
            let qs = query
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        utf8_percent_encode(k, signer::QUERY_ENCODE_SET),
                        utf8_percent_encode(v, signer::QUERY_ENCODE_SET)
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&qs));
        }
        url
    }

    /// One signed GET without retries.
    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &BTreeMap<String, String>,
    ) -> Result<T, TeError> {
        let url = self.endpoint_url(path, query);
        let host = url.host_str().unwrap_or_default().to_string();
        let signature =
            signer::sign_request(self.secret.expose_secret(), "GET", &host, url.path(), query);

        let response = self
            .http
            .get(url)
            .header("X-Token", &self.token)
            .header("X-Signature", signature)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            let bytes = response.bytes().await?;
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            let body = response.text().await.unwrap_or_default();
            if is_transient_status(status) {
                Err(TeError::TransientHttp { status, body })
            } else {
                Err(TeError::PermanentHttp { status, body })
            }
        }
    }

    /// Signed GET with exponential backoff (1s, 2s, 4s, …) on transient
    /// failures, capped at `max_retries` retries.
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        query: BTreeMap<String, String>,
    ) -> Result<T, TeError> {
        let mut attempt: u32 = 0;
        loop {
            match self.get_once(path, &query).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = Duration::from_secs(1 << attempt);
                    tracing::warn!(
                        path,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "transient TE failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(TeError::RetryExhausted {
                        attempts: attempt + 1,
                        last: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl TeApi for TeClient {
    async fn listings(&self, event_id: i64) -> Result<Vec<TeListing>, TeError> {
        let mut query = BTreeMap::new();
        query.insert("event_id".to_string(), event_id.to_string());
        query.insert("type".to_string(), "event".to_string());
        let page: TeListingsPage = self.get_with_retry("/listings", query).await?;
        Ok(page.into_listings())
    }

    async fn event(&self, event_id: i64) -> Result<TeEvent, TeError> {
        self.get_with_retry(&format!("/events/{event_id}"), BTreeMap::new())
            .await
    }

    async fn events_by_performer(
        &self,
        performer_id: i64,
        page: u32,
        per_page: u32,
        primary: Option<bool>,
    ) -> Result<TeEventsPage, TeError> {
        let mut query = BTreeMap::new();
        query.insert("performer_id".to_string(), performer_id.to_string());
        query.insert("page".to_string(), page.to_string());
        query.insert("per_page".to_string(), per_page.to_string());
        if let Some(primary) = primary {
            query.insert("primary_performer".to_string(), primary.to_string());
        }
        self.get_with_retry("/events", query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client() -> TeClient {
        let Ok(client) = TeClient::new(
            "https://api.sandbox.ticketevolution.com/v9",
            "token".to_string(),
            SecretString::from("secret".to_string()),
            3,
        ) else {
            panic!("client construction failed");
        };
        client
    }

    #[test]
    fn transient_statuses_match_contract() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_transient_status(status), "{status} should be transient");
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!is_transient_status(status), "{status} should be permanent");
        }
    }

    #[test]
    fn transient_http_error_is_retryable_permanent_is_not() {
        let transient = TeError::TransientHttp {
            status: 503,
            body: String::new(),
        };
        let permanent = TeError::PermanentHttp {
            status: 404,
            body: String::new(),
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert!(
            !TeError::RetryExhausted {
                attempts: 4,
                last: "503".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn endpoint_url_keeps_version_prefix_and_encodes_spaces() {
        let client = make_client();
        let mut query = BTreeMap::new();
        query.insert("q".to_string(), "two words".to_string());
        let url = client.endpoint_url("/listings", &query);
        assert_eq!(url.path(), "/v9/listings");
        assert_eq!(url.query(), Some("q=two%20words"));
    }

    #[test]
    fn endpoint_url_with_empty_query_has_none() {
        let client = make_client();
        let url = client.endpoint_url("/events/5", &BTreeMap::new());
        assert_eq!(url.path(), "/v9/events/5");
        assert_eq!(url.query(), None);
    }
}
