use async_trait::async_trait;
use chrono::NaiveDate;
use polyhouse_polygon::{PolygonClient, PolygonError, RawTickerDetails, TradesPage};

/// The three upstream operations the pipeline consumes.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// One page of trades. `cursor` is the previous page's `next_url`.
    async fn trades_page(
        &self,
        symbol: &str,
        date: NaiveDate,
        cursor: Option<&str>,
    ) -> Result<TradesPage, PolygonError>;

    /// Symbols traded on `date`; empty when the market was closed.
    async fn grouped_daily(&self, date: NaiveDate) -> Result<Vec<String>, PolygonError>;

    /// Point-in-time ticker details; `PolygonError::NotFound` when upstream has none.
    async fn ticker_details(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<RawTickerDetails, PolygonError>;
}

#[async_trait]
impl MarketData for PolygonClient {
    async fn trades_page(
        &self,
        symbol: &str,
        date: NaiveDate,
        cursor: Option<&str>,
    ) -> Result<TradesPage, PolygonError> {
        PolygonClient::trades_page(self, symbol, date, cursor).await
    }

    async fn grouped_daily(&self, date: NaiveDate) -> Result<Vec<String>, PolygonError> {
        PolygonClient::grouped_daily(self, date).await
    }

    async fn ticker_details(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<RawTickerDetails, PolygonError> {
        PolygonClient::ticker_details(self, symbol, date).await
    }
}
