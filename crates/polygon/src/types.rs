//! Raw upstream payloads. Fields the API omits decode to their zero value;
//! normalization (e.g. zero timestamps to "absent") happens downstream.

use serde::Deserialize;

/// A single trade as returned by `/v3/trades/{ticker}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawTrade {
    pub sequence_number: i64,
    pub tape: i64,
    pub id: String,
    /// Nanoseconds since the epoch; always present upstream.
    pub sip_timestamp: i64,
    /// Nanoseconds since the epoch; zero when not reported.
    pub participant_timestamp: i64,
    /// Nanoseconds since the epoch; zero when not reported.
    pub trf_timestamp: i64,
    pub price: f64,
    pub size: f64,
    pub conditions: Vec<i32>,
    pub correction: i64,
    pub exchange: i64,
    pub trf_id: i64,
}

/// One page of trades plus the cursor for the next one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TradesPage {
    pub results: Vec<RawTrade>,
    pub next_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GroupedDailyResponse {
    #[serde(rename = "resultsCount")]
    pub results_count: u64,
    pub results: Option<Vec<GroupedDailyBar>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupedDailyBar {
    #[serde(rename = "T")]
    pub ticker: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawAddress {
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

/// Ticker reference data as of a date, from `/v3/reference/tickers/{ticker}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawTickerDetails {
    pub ticker: String,
    pub name: String,
    pub active: bool,
    pub primary_exchange: String,
    #[serde(rename = "type")]
    pub ticker_type: String,
    pub cik: String,
    pub composite_figi: String,
    pub share_class_figi: String,
    pub phone_number: String,
    pub description: String,
    pub sic_code: String,
    pub sic_description: String,
    pub ticker_root: String,
    pub homepage_url: String,
    pub total_employees: Option<u64>,
    /// `YYYY-MM-DD`, empty when unknown.
    pub list_date: String,
    pub delisted_utc: String,
    pub share_class_shares_outstanding: Option<f64>,
    pub weighted_shares_outstanding: Option<f64>,
    pub address: RawAddress,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TickerDetailsResponse {
    pub results: RawTickerDetails,
}
