use std::collections::HashSet;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use polyhouse_schemas::Table;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::error::StorageError;
use crate::storage::{date_str, Storage};

/// ClickHouse over its HTTP interface.
///
/// Batches are shipped as Parquet in a single `INSERT ... FORMAT Parquet`
/// request, which ClickHouse applies as one insert block.
pub struct ClickHouseStore {
    http: Client,
    url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl ClickHouseStore {
    pub fn new(
        url: &str,
        database: &str,
        username: Option<String>,
        password: Option<String>,
        max_idle_conns: usize,
    ) -> Result<Self, StorageError> {
        let http = Client::builder()
            .pool_max_idle_per_host(max_idle_conns)
            .build()?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            database: database.to_string(),
            username,
            password,
        })
    }

    fn qualified(&self, table: Table) -> String {
        format!("{}.{}", quote_ident(&self.database), quote_ident(table.name()))
    }

    fn request(&self, query: &str) -> RequestBuilder {
        let mut req = self
            .http
            .post(format!("{}/", self.url))
            .query(&[("query", query)]);
        if let Some(user) = &self.username {
            req = req.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            req = req.header("X-ClickHouse-Key", password);
        }
        req
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Bytes, StorageError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StorageError::Query {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }
        Ok(resp.bytes().await?)
    }
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

/// Row filter selecting one calendar day of `table`.
fn date_predicate(table: Table, date: NaiveDate) -> String {
    match table {
        Table::Tickers => format!("ts = '{}'", date_str(date)),
        Table::Trades => format!("toDate(ts) = '{}'", date_str(date)),
    }
}

fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>, StorageError> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buf)
}

#[async_trait]
impl Storage for ClickHouseStore {
    async fn insert(
        &self,
        table: Table,
        date: NaiveDate,
        batch: RecordBatch,
    ) -> Result<(), StorageError> {
        let rows = batch.num_rows();
        let body = tokio::task::spawn_blocking(move || encode_parquet(&batch))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        let query = format!("INSERT INTO {} FORMAT Parquet", self.qualified(table));
        self.execute(self.request(&query).body(body)).await?;

        debug!(table = %table, date = %date, rows, "Inserted batch");
        Ok(())
    }

    async fn ingested_symbols(
        &self,
        table: Table,
        date: NaiveDate,
    ) -> Result<HashSet<String>, StorageError> {
        let query = format!(
            "SELECT DISTINCT ticker FROM {} WHERE {} FORMAT TabSeparated",
            self.qualified(table),
            date_predicate(table, date)
        );
        let body = self.execute(self.request(&query)).await?;

        Ok(String::from_utf8_lossy(&body)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyhouse_schemas::{TableRow, TickerRow};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn store(server: &MockServer) -> ClickHouseStore {
        ClickHouseStore::new(
            &server.uri(),
            "us_equities",
            Some("ingest".to_string()),
            Some("secret".to_string()),
            4,
        )
        .unwrap()
    }

    #[test]
    fn test_date_predicate() {
        assert_eq!(date_predicate(Table::Tickers, date()), "ts = '2024-01-02'");
        assert_eq!(
            date_predicate(Table::Trades, date()),
            "toDate(ts) = '2024-01-02'"
        );
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("us_equities"), "`us_equities`");
        assert_eq!(quote_ident("a`b"), "`a\\`b`");
    }

    #[tokio::test]
    async fn test_insert_posts_parquet() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(query_param(
                "query",
                "INSERT INTO `us_equities`.`tickers` FORMAT Parquet",
            ))
            .and(header("X-ClickHouse-User", "ingest"))
            .and(header("X-ClickHouse-Key", "secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let rows = vec![TickerRow {
            ts: date(),
            ticker: "AAPL".into(),
            ..Default::default()
        }];
        store(&server)
            .insert(Table::Tickers, date(), TickerRow::to_batch(&rows).unwrap())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].body.starts_with(b"PAR1"));
        assert!(requests[0].body.ends_with(b"PAR1"));
    }

    #[tokio::test]
    async fn test_ingested_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param(
                "query",
                "SELECT DISTINCT ticker FROM `us_equities`.`trades` WHERE toDate(ts) = '2024-01-02' FORMAT TabSeparated",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("AAPL\nMSFT\n"))
            .mount(&server)
            .await;

        let symbols = store(&server)
            .ingested_symbols(Table::Trades, date())
            .await
            .unwrap();
        assert_eq!(symbols.len(), 2);
        assert!(symbols.contains("AAPL"));
        assert!(symbols.contains("MSFT"));
    }

    #[tokio::test]
    async fn test_server_error_is_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "Code: 60. DB::Exception: Table us_equities.tickers does not exist\n",
            ))
            .mount(&server)
            .await;

        match store(&server)
            .ingested_symbols(Table::Tickers, date())
            .await
            .unwrap_err()
        {
            StorageError::Query { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("does not exist"));
            }
            e => panic!("expected Query error, got: {:?}", e),
        }
    }
}
