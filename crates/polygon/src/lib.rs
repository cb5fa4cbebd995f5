//! polyhouse-polygon: typed REST client for the upstream market-data API
//!
//! Covers the three operations the ingestion pipeline consumes: paginated
//! trades for a symbol and day, the grouped daily aggregate used to enumerate
//! a day's traded symbols, and the point-in-time ticker detail lookup.

pub mod client;
pub mod error;
pub mod types;

pub use client::PolygonClient;
pub use error::PolygonError;
pub use types::{RawAddress, RawTickerDetails, RawTrade, TradesPage};
