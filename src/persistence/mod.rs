//! Persistence layer: row models, the [`store::PriceStore`] trait, and
//! the PostgreSQL implementation.
//!
//! All writes are single-statement atomic upserts or conditional
//! updates keyed by natural keys, so concurrent invocations never need
//! cross-statement transactions.

pub mod models;
pub mod postgres;
pub mod store;

pub use postgres::PgStore;
pub use store::PriceStore;
