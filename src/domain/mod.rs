//! Domain layer: pure computation shared by every service.
//!
//! Hour-bucket arithmetic, the listing eligibility predicate with its
//! price aggregation, and SEO URL derivation. Nothing in here performs
//! I/O; the services wire these functions to the store and the TE API.

pub mod aggregate;
pub mod hour;
pub mod olt_url;

pub use aggregate::{PriceAggregate, aggregate_listings};
pub use hour::truncate_to_hour_utc;
pub use olt_url::build_olt_url;
