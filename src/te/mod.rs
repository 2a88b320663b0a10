//! Ticket Evolution API integration: request signing, the signed HTTP
//! client with retry/backoff, and tolerant wire types.

pub mod client;
pub mod signer;
pub mod types;

pub use client::{TeApi, TeClient, TeError};
