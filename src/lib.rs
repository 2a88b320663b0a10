//! # olt-pricefeed
//!
//! Hourly time-series price ingestion for live ticketed events, sourced
//! from the Ticket Evolution (TE) listings API. A public price-history
//! widget reads the captured aggregates through database views; this
//! service owns the write side only.
//!
//! ## Architecture
//!
//! ```text
//! External scheduler (HTTP POST)
//!     │
//!     ├── Job Handlers (api/)
//!     │
//!     ├── PollerEngine ── RunCoordinator (service/)
//!     ├── MetadataRefresher, RetentionEnforcer
//!     │
//!     ├── TE client + signer (te/)
//!     ├── Aggregation, hour buckets, SEO URLs (domain/)
//!     │
//!     └── PostgreSQL store (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod te;
