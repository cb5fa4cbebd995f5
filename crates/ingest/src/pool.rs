//! Bounded fetch worker pool.
//!
//! `W` workers pull symbols from a shared queue. Each worker owns the whole
//! paginated fetch of its symbol, so pages for one symbol arrive in order;
//! records for different symbols interleave freely. Records are pushed onto a
//! bounded channel, which is the only backpressure in the pipeline.
//!
//! The first fatal error cancels the phase token. Sibling workers stop at
//! their next request or send, and the pool reports the original error rather
//! than the cancellations it caused.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use polyhouse_schemas::{EnumRegistry, TableRow, TickerRow, TradeRow};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::IngestError;
use crate::source::MarketData;
use crate::transform;

/// An item on the results channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<R> {
    Record(R),
    /// Upstream had nothing for this symbol. Counted, never written.
    NoData { symbol: String },
}

/// Per-pool-run fetch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub symbols: u64,
    pub records: u64,
    pub pages: u64,
    pub not_found: u64,
}

impl FetchStats {
    fn merge(&mut self, other: FetchStats) {
        self.symbols += other.symbols;
        self.records += other.records;
        self.pages += other.pages;
        self.not_found += other.not_found;
    }
}

/// A worker's handle on the results channel and the phase cancellation token.
pub struct RecordSink<R> {
    tx: mpsc::Sender<Fetched<R>>,
    cancel: CancellationToken,
}

impl<R: Send> RecordSink<R> {
    pub fn new(tx: mpsc::Sender<Fetched<R>>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Blocks while the channel is full. Fails once the phase is cancelled or
    /// the writer has gone away; a vanished writer cancels the phase.
    pub async fn send(&self, item: Fetched<R>) -> Result<(), IngestError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            res = self.tx.send(item) => res.map_err(|_| {
                self.cancel.cancel();
                IngestError::Cancelled
            }),
        }
    }

    /// Await `fut` unless the phase is cancelled first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, IngestError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

/// How one table's records are fetched for a single symbol.
#[async_trait]
pub trait SymbolFetcher: Send + Sync + 'static {
    type Row: TableRow;

    async fn fetch(
        &self,
        symbol: &str,
        date: NaiveDate,
        sink: &RecordSink<Self::Row>,
    ) -> Result<FetchStats, IngestError>;
}

/// Trades: follow `next_url` until upstream stops returning one.
pub struct TradesFetcher {
    source: Arc<dyn MarketData>,
    registry: Arc<EnumRegistry>,
}

impl TradesFetcher {
    pub fn new(source: Arc<dyn MarketData>, registry: Arc<EnumRegistry>) -> Self {
        Self { source, registry }
    }
}

#[async_trait]
impl SymbolFetcher for TradesFetcher {
    type Row = TradeRow;

    async fn fetch(
        &self,
        symbol: &str,
        date: NaiveDate,
        sink: &RecordSink<TradeRow>,
    ) -> Result<FetchStats, IngestError> {
        let mut stats = FetchStats {
            symbols: 1,
            ..Default::default()
        };
        let mut cursor: Option<String> = None;

        loop {
            let page = sink
                .guard(self.source.trades_page(symbol, date, cursor.as_deref()))
                .await??;
            stats.pages += 1;
            debug!(
                symbol,
                date = %date,
                page = stats.pages,
                trades = page.results.len(),
                "Fetched trades page"
            );

            for raw in page.results {
                let row = transform::trade_row(raw, symbol, &self.registry)?;
                sink.send(Fetched::Record(row)).await?;
                stats.records += 1;
            }

            match page.next_url {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(stats)
    }
}

/// Ticker details: one lookup per symbol; not-found becomes a no-data marker.
pub struct TickersFetcher {
    source: Arc<dyn MarketData>,
}

impl TickersFetcher {
    pub fn new(source: Arc<dyn MarketData>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SymbolFetcher for TickersFetcher {
    type Row = TickerRow;

    async fn fetch(
        &self,
        symbol: &str,
        date: NaiveDate,
        sink: &RecordSink<TickerRow>,
    ) -> Result<FetchStats, IngestError> {
        let mut stats = FetchStats {
            symbols: 1,
            pages: 1,
            ..Default::default()
        };

        match sink.guard(self.source.ticker_details(symbol, date)).await? {
            Ok(raw) => {
                let row = transform::ticker_row(raw, symbol, date)?;
                sink.send(Fetched::Record(row)).await?;
                stats.records = 1;
            }
            Err(e) if e.is_not_found() => {
                warn!(symbol, date = %date, "No ticker details upstream");
                sink.send(Fetched::NoData {
                    symbol: symbol.to_string(),
                })
                .await?;
                stats.not_found = 1;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(stats)
    }
}

pub struct FetchWorkerPool {
    concurrency: usize,
}

impl FetchWorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every symbol exactly once and stream the results into `tx`.
    ///
    /// Returns once all workers have finished; `tx` and every worker's clone
    /// are dropped by then, which closes the channel for the writer.
    pub async fn run<F: SymbolFetcher>(
        &self,
        fetcher: Arc<F>,
        date: NaiveDate,
        symbols: Vec<String>,
        tx: mpsc::Sender<Fetched<F::Row>>,
        cancel: CancellationToken,
    ) -> Result<FetchStats, IngestError> {
        let workers = self.concurrency.min(symbols.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(symbols)));
        let mut tasks: JoinSet<Result<FetchStats, IngestError>> = JoinSet::new();

        for worker_id in 0..workers {
            let fetcher = Arc::clone(&fetcher);
            let queue = Arc::clone(&queue);
            let sink = RecordSink::new(tx.clone(), cancel.clone());
            tasks.spawn(async move { worker(worker_id, fetcher, date, queue, sink).await });
        }
        drop(tx);

        let mut stats = FetchStats::default();
        let mut first_error: Option<IngestError> = None;

        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(IngestError::Worker(e.to_string())));
            match result {
                Ok(worker_stats) => stats.merge(worker_stats),
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    if first_error.is_none() {
                        error!(date = %date, error = %e, "Fetch worker failed, cancelling phase");
                        cancel.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok(stats)
    }
}

async fn worker<F: SymbolFetcher>(
    worker_id: usize,
    fetcher: Arc<F>,
    date: NaiveDate,
    queue: Arc<Mutex<VecDeque<String>>>,
    sink: RecordSink<F::Row>,
) -> Result<FetchStats, IngestError> {
    let mut stats = FetchStats::default();
    loop {
        if sink.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let Some(symbol) = queue.lock().await.pop_front() else {
            break;
        };
        let fetched = fetcher.fetch(&symbol, date, &sink).await?;
        stats.merge(fetched);
    }
    debug!(worker_id, symbols = stats.symbols, records = stats.records, "Fetch worker done");
    Ok(stats)
}
