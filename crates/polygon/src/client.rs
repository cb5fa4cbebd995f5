use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::PolygonError;
use crate::types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
pub const DEFAULT_PAGE_LIMIT: u32 = 50_000;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Polygon REST client. Every call is a single request; there is no retry.
pub struct PolygonClient {
    http: Client,
    base_url: Url,
    api_key: String,
    page_limit: u32,
}

impl PolygonClient {
    /// Create a client. `timeout` of `None` leaves requests unbounded.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, PolygonError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            return Err(PolygonError::BaseUrl(base_url.to_string()));
        }

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            page_limit: DEFAULT_PAGE_LIMIT,
        })
    }

    /// Maximum trades requested per page.
    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    /// Fetch one page of trades for `symbol` on `date`, oldest first.
    ///
    /// Pass `None` for the first page and the previous page's `next_url` after that.
    pub async fn trades_page(
        &self,
        symbol: &str,
        date: NaiveDate,
        cursor: Option<&str>,
    ) -> Result<TradesPage, PolygonError> {
        let url = match cursor {
            Some(next) => self.normalize_url(next)?,
            None => {
                let mut url = self.endpoint(&["v3", "trades", symbol])?;
                url.query_pairs_mut()
                    .append_pair("timestamp", &date.format(DATE_FORMAT).to_string())
                    .append_pair("order", "asc")
                    .append_pair("limit", &self.page_limit.to_string());
                url
            }
        };
        self.get_json(url).await
    }

    /// Symbols with at least one bar on `date`. Empty on market holidays.
    pub async fn grouped_daily(&self, date: NaiveDate) -> Result<Vec<String>, PolygonError> {
        let date_str = date.format(DATE_FORMAT).to_string();
        let mut url = self.endpoint(&[
            "v2", "aggs", "grouped", "locale", "us", "market", "stocks", &date_str,
        ])?;
        url.query_pairs_mut().append_pair("adjusted", "false");

        let response: GroupedDailyResponse = self.get_json(url).await?;
        if response.results_count == 0 {
            return Ok(Vec::new());
        }

        Ok(response
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|bar| bar.ticker)
            .collect())
    }

    /// Ticker reference data as of `date`. Unknown symbol/date pairs yield
    /// [`PolygonError::NotFound`].
    pub async fn ticker_details(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<RawTickerDetails, PolygonError> {
        let mut url = self.endpoint(&["v3", "reference", "tickers", symbol])?;
        url.query_pairs_mut()
            .append_pair("date", &date.format(DATE_FORMAT).to_string());

        let response: TickerDetailsResponse = self.get_json(url).await?;
        Ok(response.results)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PolygonError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PolygonError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("apiKey", &self.api_key);
        Ok(url)
    }

    /// Pagination cursors come back without credentials.
    fn normalize_url(&self, next_url: &str) -> Result<Url, PolygonError> {
        let mut url = match Url::parse(next_url) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.base_url.join(next_url)?,
            Err(e) => return Err(e.into()),
        };
        if !url.query_pairs().any(|(k, _)| k == "apiKey") {
            url.query_pairs_mut().append_pair("apiKey", &self.api_key);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, PolygonError> {
        // Path only: the query string carries the API key
        let path = url.path().to_string();
        debug!(path = %path, "GET request");

        let resp = self.http.get(url).send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(PolygonError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PolygonError::NotFound(path));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PolygonError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
