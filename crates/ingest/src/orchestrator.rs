//! Walks the date range newest-first and drives one ingestion phase per
//! requested table for each date.
//!
//! A phase is: prune the day's universe with the incremental guard, fetch the
//! remaining symbols through the worker pool, and write everything through a
//! single batch writer. Phases never overlap, so per-phase stats and failures
//! always belong to exactly one (date, table).

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use polyhouse_schemas::{EnumRegistry, Table};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::IngestError;
use crate::guard::IncrementalGuard;
use crate::lister::TickerLister;
use crate::pool::{FetchStats, FetchWorkerPool, SymbolFetcher, TickersFetcher, TradesFetcher};
use crate::source::MarketData;
use crate::storage::Storage;
use crate::writer::{BatchWriter, WriteStats};

/// Pipeline sizing for every phase of a run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub tables: Vec<Table>,
    /// Tables pruned by the incremental guard. Guarding is only restart-safe
    /// for tables written as one row per symbol.
    pub guarded_tables: Vec<Table>,
    pub concurrency: usize,
    pub batch_size: usize,
    pub channel_capacity: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            tables: Table::ALL.to_vec(),
            guarded_tables: vec![Table::Tickers],
            concurrency: 100,
            batch_size: 50_000,
            channel_capacity: 4096,
        }
    }
}

/// Result of one (date, table) phase.
#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    pub table: Table,
    /// Active symbols for the date.
    pub listed: usize,
    /// Symbols the guard found already stored.
    pub skipped: usize,
    pub fetch: FetchStats,
    pub write: WriteStats,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DateOutcome {
    /// No symbols traded; nothing was fetched or written.
    NoData,
    Ingested(Vec<TableReport>),
}

impl DateOutcome {
    pub fn reports(&self) -> &[TableReport] {
        match self {
            DateOutcome::NoData => &[],
            DateOutcome::Ingested(reports) => reports,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateReport {
    pub date: NaiveDate,
    pub outcome: DateOutcome,
}

/// Every processed date, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub dates: Vec<DateReport>,
}

impl RunSummary {
    pub fn rows_written(&self) -> u64 {
        self.table_reports().map(|r| r.write.rows).sum()
    }

    pub fn symbols_fetched(&self) -> u64 {
        self.table_reports().map(|r| r.fetch.symbols).sum()
    }

    pub fn no_data_dates(&self) -> usize {
        self.dates
            .iter()
            .filter(|d| d.outcome == DateOutcome::NoData)
            .count()
    }

    pub fn table_reports(&self) -> impl Iterator<Item = &TableReport> {
        self.dates.iter().flat_map(|d| d.outcome.reports())
    }
}

/// Dates from `to` down to `from`, both inclusive.
pub fn dates_descending(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    std::iter::successors(Some(to), |d| d.pred_opt())
        .take_while(|d| *d >= from)
        .collect()
}

pub struct DateRangeOrchestrator {
    source: Arc<dyn MarketData>,
    storage: Arc<dyn Storage>,
    registry: Arc<EnumRegistry>,
    lister: TickerLister,
    guard: IncrementalGuard,
    settings: IngestSettings,
    shutdown: CancellationToken,
}

impl DateRangeOrchestrator {
    pub fn new(
        source: Arc<dyn MarketData>,
        storage: Arc<dyn Storage>,
        registry: Arc<EnumRegistry>,
        blacklist: HashSet<String>,
        settings: IngestSettings,
    ) -> Self {
        let lister = TickerLister::new(Arc::clone(&source), blacklist);
        let guard = IncrementalGuard::new(Arc::clone(&storage), settings.guarded_tables.clone());
        Self {
            source,
            storage,
            registry,
            lister,
            guard,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that aborts the run; every phase listens on a child of it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ingest every date in `[from, to]`, newest first. Stops at the first fatal error.
    pub async fn run(&self, from: NaiveDate, to: NaiveDate) -> Result<RunSummary, IngestError> {
        let dates = dates_descending(from, to);
        info!(
            from = %from,
            to = %to,
            dates = dates.len(),
            tables = ?self.settings.tables,
            concurrency = self.settings.concurrency,
            "Starting ingestion"
        );

        let started = Instant::now();
        let mut summary = RunSummary::default();
        for date in dates {
            if self.shutdown.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            let outcome = self.ingest_date(date).await.map_err(|e| {
                error!(date = %date, error = %e, "Ingestion failed");
                e
            })?;
            summary.dates.push(DateReport { date, outcome });
        }

        info!(
            dates = summary.dates.len(),
            no_data_dates = summary.no_data_dates(),
            symbols = summary.symbols_fetched(),
            rows = summary.rows_written(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingestion complete"
        );
        Ok(summary)
    }

    /// One date, every requested table in order.
    pub async fn ingest_date(&self, date: NaiveDate) -> Result<DateOutcome, IngestError> {
        let active = self.lister.list_active(date).await?;
        if active.is_empty() {
            info!(date = %date, "No trading activity, skipping date");
            return Ok(DateOutcome::NoData);
        }

        let mut reports = Vec::with_capacity(self.settings.tables.len());
        for &table in &self.settings.tables {
            let report = self.ingest_table(table, date, &active).await?;
            info!(
                date = %date,
                table = %table,
                listed = report.listed,
                skipped = report.skipped,
                symbols = report.fetch.symbols,
                not_found = report.fetch.not_found,
                rows = report.write.rows,
                batches = report.write.batches,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Ingested table"
            );
            reports.push(report);
        }
        Ok(DateOutcome::Ingested(reports))
    }

    async fn ingest_table(
        &self,
        table: Table,
        date: NaiveDate,
        active: &BTreeSet<String>,
    ) -> Result<TableReport, IngestError> {
        let started = Instant::now();
        let (pending, skipped) = self.guard.prune(table, date, active).await?;

        let (fetch, write) = match table {
            Table::Trades => {
                let fetcher =
                    TradesFetcher::new(Arc::clone(&self.source), Arc::clone(&self.registry));
                self.run_phase(Arc::new(fetcher), date, pending).await?
            }
            Table::Tickers => {
                let fetcher = TickersFetcher::new(Arc::clone(&self.source));
                self.run_phase(Arc::new(fetcher), date, pending).await?
            }
        };

        Ok(TableReport {
            table,
            listed: active.len(),
            skipped,
            fetch,
            write,
            elapsed: started.elapsed(),
        })
    }

    /// Run the pool and the writer side by side until both finish.
    async fn run_phase<F: SymbolFetcher>(
        &self,
        fetcher: Arc<F>,
        date: NaiveDate,
        symbols: Vec<String>,
    ) -> Result<(FetchStats, WriteStats), IngestError> {
        let cancel = self.shutdown.child_token();
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity);
        let pool = FetchWorkerPool::new(self.settings.concurrency);
        let writer = BatchWriter::new(Arc::clone(&self.storage), self.settings.batch_size);

        let (fetched, written) = tokio::join!(
            pool.run(fetcher, date, symbols, tx, cancel.clone()),
            writer.consume(date, rx, &cancel),
        );

        match (fetched, written) {
            (Ok(fetch), Ok(write)) => Ok((fetch, write)),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(write)) => {
                warn!(
                    date = %date,
                    rows = write.rows,
                    batches = write.batches,
                    "Flushed buffered rows before aborting"
                );
                Err(e)
            }
            (Err(fetch_err), Err(write_err)) => {
                if fetch_err.is_cancelled() {
                    Err(write_err)
                } else {
                    warn!(date = %date, error = %write_err, "Writer also failed");
                    Err(fetch_err)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_dates_descending_inclusive() {
        assert_eq!(
            dates_descending(date(2024, 2, 27), date(2024, 3, 1)),
            vec![
                date(2024, 3, 1),
                date(2024, 2, 29),
                date(2024, 2, 28),
                date(2024, 2, 27)
            ]
        );
        assert_eq!(
            dates_descending(date(2024, 1, 2), date(2024, 1, 2)),
            vec![date(2024, 1, 2)]
        );
        assert!(dates_descending(date(2024, 1, 3), date(2024, 1, 2)).is_empty());
    }

    #[test]
    fn test_run_summary_totals() {
        let report = |rows| TableReport {
            table: Table::Trades,
            listed: 2,
            skipped: 0,
            fetch: FetchStats {
                symbols: 2,
                ..Default::default()
            },
            write: WriteStats {
                rows,
                batches: 1,
                no_data: 0,
            },
            elapsed: Duration::from_millis(5),
        };
        let summary = RunSummary {
            dates: vec![
                DateReport {
                    date: date(2024, 1, 3),
                    outcome: DateOutcome::Ingested(vec![report(10), report(5)]),
                },
                DateReport {
                    date: date(2024, 1, 1),
                    outcome: DateOutcome::NoData,
                },
            ],
        };
        assert_eq!(summary.rows_written(), 15);
        assert_eq!(summary.symbols_fetched(), 4);
        assert_eq!(summary.no_data_dates(), 1);
    }
}
