//! End-to-end pipeline tests against an in-process market and store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow::array::{Array, StringArray, UInt64Array};
use async_trait::async_trait;
use chrono::NaiveDate;
use polyhouse_ingest::storage::MemoryStore;
use polyhouse_ingest::{
    DateOutcome, DateRangeOrchestrator, IngestError, IngestSettings, MarketData, Storage,
};
use polyhouse_polygon::{PolygonError, RawTickerDetails, RawTrade, TradesPage};
use polyhouse_schemas::{EnumKind, EnumRegistry, Table, TableRow, TickerRow, TradeRow};

#[derive(Default)]
struct FakeMarket {
    universe: HashMap<NaiveDate, Vec<String>>,
    /// Trade pages per symbol; symbols without an entry have one empty page.
    pages: HashMap<String, Vec<Vec<RawTrade>>>,
    missing_details: HashSet<String>,
    /// Upstream latency per (symbol, page index).
    delays: HashMap<(String, usize), Duration>,
    /// Remaining failed trades requests per symbol.
    failures: Mutex<HashMap<String, usize>>,
    /// (symbol, page index) for every trades request.
    trade_calls: Mutex<Vec<(String, usize)>>,
    detail_calls: Mutex<Vec<String>>,
}

impl FakeMarket {
    fn with_universe(mut self, date: NaiveDate, symbols: &[&str]) -> Self {
        self.universe
            .insert(date, symbols.iter().map(|s| s.to_string()).collect());
        self
    }

    fn with_pages(mut self, symbol: &str, pages: Vec<Vec<RawTrade>>) -> Self {
        self.pages.insert(symbol.to_string(), pages);
        self
    }

    fn with_missing_details(mut self, symbol: &str) -> Self {
        self.missing_details.insert(symbol.to_string());
        self
    }

    fn with_delay(mut self, symbol: &str, page: usize, delay: Duration) -> Self {
        self.delays.insert((symbol.to_string(), page), delay);
        self
    }

    fn with_failures(mut self, symbol: &str, times: usize) -> Self {
        self.failures
            .get_mut()
            .unwrap()
            .insert(symbol.to_string(), times);
        self
    }

    fn trade_calls(&self) -> Vec<(String, usize)> {
        self.trade_calls.lock().unwrap().clone()
    }

    fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn trades_page(
        &self,
        symbol: &str,
        _date: NaiveDate,
        cursor: Option<&str>,
    ) -> Result<TradesPage, PolygonError> {
        let index: usize = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .unwrap(),
        };
        self.trade_calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), index));

        if let Some(delay) = self.delays.get(&(symbol.to_string(), index)) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(symbol) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PolygonError::Status {
                    status: 500,
                    message: "internal error".to_string(),
                });
            }
        }

        let pages = self.pages.get(symbol).cloned().unwrap_or_else(|| vec![vec![]]);
        let next_url = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(TradesPage {
            results: pages[index].clone(),
            next_url,
        })
    }

    async fn grouped_daily(&self, date: NaiveDate) -> Result<Vec<String>, PolygonError> {
        Ok(self.universe.get(&date).cloned().unwrap_or_default())
    }

    async fn ticker_details(
        &self,
        symbol: &str,
        _date: NaiveDate,
    ) -> Result<RawTickerDetails, PolygonError> {
        self.detail_calls.lock().unwrap().push(symbol.to_string());
        if self.missing_details.contains(symbol) {
            return Err(PolygonError::NotFound(format!("/v3/reference/tickers/{}", symbol)));
        }
        Ok(RawTickerDetails {
            ticker: symbol.to_string(),
            name: format!("{} Corp", symbol),
            active: true,
            ..Default::default()
        })
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn trade(seq: i64) -> RawTrade {
    RawTrade {
        sequence_number: seq,
        tape: 3,
        id: seq.to_string(),
        sip_timestamp: 1_704_205_800_000_000_000 + seq,
        price: 100.0,
        size: 10.0,
        conditions: vec![12],
        exchange: 12,
        ..Default::default()
    }
}

fn trades(range: std::ops::Range<i64>) -> Vec<RawTrade> {
    range.map(trade).collect()
}

fn settings(tables: &[Table]) -> IngestSettings {
    IngestSettings {
        tables: tables.to_vec(),
        concurrency: 4,
        batch_size: 100,
        channel_capacity: 8,
        ..Default::default()
    }
}

fn orchestrator(
    market: &Arc<FakeMarket>,
    store: &Arc<MemoryStore>,
    settings: IngestSettings,
) -> DateRangeOrchestrator {
    DateRangeOrchestrator::new(
        market.clone(),
        store.clone(),
        Arc::new(EnumRegistry::builtin()),
        HashSet::new(),
        settings,
    )
}

/// (ticker, seqnum) of every stored trade, in insert order.
async fn stored_trades(store: &MemoryStore) -> Vec<(String, u64)> {
    let mut rows = Vec::new();
    for stored in store.batches().await {
        if stored.table != Table::Trades {
            continue;
        }
        let batch = &stored.batch;
        let tickers = batch
            .column_by_name("ticker")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        let seqnums = batch
            .column_by_name("seqnum")
            .unwrap()
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        for i in 0..batch.num_rows() {
            rows.push((tickers.value(i).to_string(), seqnums.value(i)));
        }
    }
    rows
}

async fn seed(store: &MemoryStore, day: NaiveDate, symbol: &str) {
    let ticker = TickerRow {
        ts: day,
        ticker: symbol.to_string(),
        ..Default::default()
    };
    store
        .insert(Table::Tickers, day, TickerRow::to_batch(&[ticker]).unwrap())
        .await
        .unwrap();

    let trade = TradeRow {
        seqnum: 1,
        tape: 3,
        id: 1,
        ticker: symbol.to_string(),
        ts: 1,
        ts_participant: None,
        ts_trf: None,
        price: 1.0,
        size: 1,
        conditions: vec![],
        correction: 0,
        exchange: 12,
        trf: 0,
    };
    store
        .insert(Table::Trades, day, TradeRow::to_batch(&[trade]).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_empty_universe_skips_date() {
    let day = date(2024, 12, 25);
    let market = Arc::new(FakeMarket::default());
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(&market, &store, settings(&Table::ALL))
        .run(day, day)
        .await
        .unwrap();

    assert_eq!(summary.dates.len(), 1);
    assert_eq!(summary.dates[0].outcome, DateOutcome::NoData);
    assert!(market.trade_calls().is_empty());
    assert!(market.detail_calls().is_empty());
    assert!(store.batches().await.is_empty());
}

#[tokio::test]
async fn test_guard_skips_ingested_symbol() {
    let day = date(2024, 1, 2);
    let market = Arc::new(
        FakeMarket::default()
            .with_universe(day, &["X", "Y"])
            .with_pages("X", vec![trades(1..4)])
            .with_pages("Y", vec![trades(1..3)]),
    );
    let store = Arc::new(MemoryStore::new());
    seed(&store, day, "X").await;

    let summary = orchestrator(&market, &store, settings(&Table::ALL))
        .run(day, day)
        .await
        .unwrap();

    assert_eq!(market.detail_calls(), vec!["Y".to_string()]);

    let reports = summary.dates[0].outcome.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].table, Table::Tickers);
    assert_eq!(reports[0].listed, 2);
    assert_eq!(reports[0].skipped, 1);
    assert_eq!(reports[0].fetch.symbols, 1);

    // X keeps only its seeded ticker row
    assert_eq!(store.tickers(Table::Tickers).await, vec!["X", "Y"]);
}

#[tokio::test]
async fn test_guarded_trades_skip_ingested_symbol() {
    let day = date(2024, 1, 2);
    let market = Arc::new(
        FakeMarket::default()
            .with_universe(day, &["X", "Y"])
            .with_pages("X", vec![trades(1..4)])
            .with_pages("Y", vec![trades(1..3)]),
    );
    let store = Arc::new(MemoryStore::new());
    seed(&store, day, "X").await;

    let mut settings = settings(&[Table::Trades]);
    settings.guarded_tables = vec![Table::Trades];
    let summary = orchestrator(&market, &store, settings)
        .run(day, day)
        .await
        .unwrap();

    assert!(market.trade_calls().iter().all(|(s, _)| s == "Y"));
    let report = &summary.dates[0].outcome.reports()[0];
    assert_eq!(report.skipped, 1);
    assert_eq!(report.fetch.symbols, 1);

    let trade_tickers = store.tickers(Table::Trades).await;
    assert_eq!(trade_tickers.iter().filter(|t| *t == "X").count(), 1);
    assert_eq!(trade_tickers.iter().filter(|t| *t == "Y").count(), 2);
}

#[tokio::test]
async fn test_trades_are_refetched_by_default() {
    let day = date(2024, 1, 2);
    let market = Arc::new(
        FakeMarket::default()
            .with_universe(day, &["X"])
            .with_pages("X", vec![trades(1..3)]),
    );
    let store = Arc::new(MemoryStore::new());
    seed(&store, day, "X").await;

    orchestrator(&market, &store, settings(&Table::ALL))
        .run(day, day)
        .await
        .unwrap();

    assert!(market.detail_calls().is_empty());
    assert_eq!(market.trade_calls(), vec![("X".to_string(), 0)]);
}

#[tokio::test]
async fn test_every_symbol_fetched_exactly_once() {
    let day = date(2024, 1, 2);
    let names: Vec<String> = (0..40).map(|i| format!("SYM{:02}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let mut market = FakeMarket::default().with_universe(day, &refs);
    for name in &names {
        market = market.with_pages(name, vec![trades(1..4), trades(4..6)]);
    }
    let market = Arc::new(market);
    let store = Arc::new(MemoryStore::new());

    let mut settings = settings(&[Table::Trades]);
    settings.concurrency = 8;
    settings.batch_size = 7;
    let summary = orchestrator(&market, &store, settings)
        .run(day, day)
        .await
        .unwrap();

    let calls = market.trade_calls();
    assert_eq!(calls.len(), 80);
    for name in &names {
        let mut pages: Vec<usize> = calls
            .iter()
            .filter(|(s, _)| s == name)
            .map(|(_, p)| *p)
            .collect();
        pages.sort();
        assert_eq!(pages, vec![0, 1], "{} fetched wrong pages", name);
    }

    assert_eq!(summary.rows_written(), 200);
    let sizes = store.batch_sizes(Table::Trades).await;
    assert_eq!(sizes.iter().sum::<usize>(), 200);
    // 200 = 28 * 7 + 4
    assert_eq!(sizes.len(), 29);
    assert!(sizes[..28].iter().all(|&n| n == 7));
    assert_eq!(sizes[28], 4);
}

#[tokio::test]
async fn test_batches_of_three() {
    let day = date(2024, 1, 2);
    let market = Arc::new(
        FakeMarket::default()
            .with_universe(day, &["AAPL"])
            .with_pages("AAPL", vec![trades(1..4), trades(4..8)]),
    );
    let store = Arc::new(MemoryStore::new());

    let mut settings = settings(&[Table::Trades]);
    settings.batch_size = 3;
    orchestrator(&market, &store, settings)
        .run(day, day)
        .await
        .unwrap();

    assert_eq!(store.batch_sizes(Table::Trades).await, vec![3, 3, 1]);
}

#[tokio::test]
async fn test_unknown_participant_aborts_run() {
    let day = date(2024, 1, 2);
    let mut bad = trade(2);
    bad.exchange = 42;
    let market = Arc::new(
        FakeMarket::default()
            .with_universe(day, &["AAPL"])
            .with_pages("AAPL", vec![vec![trade(1), bad, trade(3)]]),
    );
    let store = Arc::new(MemoryStore::new());

    let mut settings = settings(&[Table::Trades]);
    settings.batch_size = 1;
    let err = orchestrator(&market, &store, settings)
        .run(day, day)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::UnknownEnumCode {
            kind: EnumKind::Participant,
            code: 42
        }
    ));
    // The row sent before the failure is still flushed; nothing after it is
    assert_eq!(
        stored_trades(&store).await,
        vec![("AAPL".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_rerun_after_failure_completes_every_symbol() {
    let day = date(2024, 1, 2);
    let market = Arc::new(
        FakeMarket::default()
            .with_universe(day, &["BAD", "GOOD"])
            .with_pages("BAD", vec![trades(1..3)])
            .with_pages("GOOD", vec![trades(1..3), trades(3..5)])
            .with_delay("BAD", 0, Duration::from_millis(50))
            .with_delay("GOOD", 1, Duration::from_millis(500))
            .with_failures("BAD", 1),
    );
    let store = Arc::new(MemoryStore::new());

    let mut settings = settings(&Table::ALL);
    settings.concurrency = 2;
    settings.batch_size = 1;

    let err = orchestrator(&market, &store, settings.clone())
        .run(day, day)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Upstream(PolygonError::Status { status: 500, .. })
    ));

    let summary = orchestrator(&market, &store, settings)
        .run(day, day)
        .await
        .unwrap();
    let trades_report = &summary.dates[0].outcome.reports()[1];
    assert_eq!(trades_report.table, Table::Trades);
    assert_eq!(trades_report.skipped, 0);

    let stored: HashSet<(String, u64)> = stored_trades(&store).await.into_iter().collect();
    for (symbol, seqnums) in [("BAD", 1..3), ("GOOD", 1..5)] {
        for seq in seqnums {
            assert!(
                stored.contains(&(symbol.to_string(), seq)),
                "{} trade {} missing after rerun",
                symbol,
                seq
            );
        }
    }
}

#[tokio::test]
async fn test_missing_ticker_details_are_skipped() {
    let day = date(2024, 1, 2);
    let market = Arc::new(
        FakeMarket::default()
            .with_universe(day, &["AAPL", "GONE", "MSFT"])
            .with_missing_details("GONE"),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(&market, &store, settings(&[Table::Tickers]))
        .run(day, day)
        .await
        .unwrap();

    let report = &summary.dates[0].outcome.reports()[0];
    assert_eq!(report.fetch.symbols, 3);
    assert_eq!(report.fetch.not_found, 1);
    assert_eq!(report.write.no_data, 1);
    assert_eq!(report.write.rows, 2);

    let mut stored = store.tickers(Table::Tickers).await;
    stored.sort();
    assert_eq!(stored, vec!["AAPL", "MSFT"]);
}

#[tokio::test]
async fn test_dates_processed_newest_first() {
    let market = Arc::new(
        FakeMarket::default()
            .with_universe(date(2024, 1, 3), &["AAPL"])
            .with_universe(date(2024, 1, 5), &["AAPL", "MSFT"]),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(&market, &store, settings(&[Table::Tickers]))
        .run(date(2024, 1, 3), date(2024, 1, 5))
        .await
        .unwrap();

    let dates: Vec<NaiveDate> = summary.dates.iter().map(|d| d.date).collect();
    assert_eq!(
        dates,
        vec![date(2024, 1, 5), date(2024, 1, 4), date(2024, 1, 3)]
    );
    assert_eq!(summary.no_data_dates(), 1);
    assert_eq!(summary.rows_written(), 3);

    let stored: Vec<NaiveDate> = store.batches().await.iter().map(|b| b.date).collect();
    assert_eq!(stored, vec![date(2024, 1, 5), date(2024, 1, 3)]);
}

#[tokio::test]
async fn test_blacklist_excludes_symbols() {
    let day = date(2024, 1, 2);
    let market = Arc::new(FakeMarket::default().with_universe(day, &["AAPL", "ZVZZT"]));
    let store = Arc::new(MemoryStore::new());

    let orchestrator = DateRangeOrchestrator::new(
        market.clone(),
        store.clone(),
        Arc::new(EnumRegistry::builtin()),
        HashSet::from(["ZVZZT".to_string()]),
        settings(&[Table::Tickers]),
    );
    orchestrator.run(day, day).await.unwrap();

    assert_eq!(market.detail_calls(), vec!["AAPL".to_string()]);
}

#[tokio::test]
async fn test_shutdown_before_run() {
    let day = date(2024, 1, 2);
    let market = Arc::new(FakeMarket::default().with_universe(day, &["AAPL"]));
    let store = Arc::new(MemoryStore::new());

    let orchestrator = orchestrator(&market, &store, settings(&Table::ALL));
    orchestrator.shutdown_token().cancel();

    let err = orchestrator.run(day, day).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(market.detail_calls().is_empty());
}
