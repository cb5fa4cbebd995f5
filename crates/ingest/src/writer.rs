use std::sync::Arc;

use chrono::NaiveDate;
use polyhouse_schemas::TableRow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::IngestError;
use crate::pool::Fetched;
use crate::storage::Storage;

/// Initial buffer allocation cap; large batch sizes grow on demand.
const MAX_PREALLOC: usize = 65_536;

/// Per-writer-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub rows: u64,
    pub batches: u64,
    pub no_data: u64,
}

/// The single consumer of a phase's results channel.
///
/// Rows are written in arrival order in batches of exactly `batch_size`,
/// except for a final shorter batch. An empty batch is never written.
pub struct BatchWriter {
    storage: Arc<dyn Storage>,
    batch_size: usize,
}

impl BatchWriter {
    pub fn new(storage: Arc<dyn Storage>, batch_size: usize) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
        }
    }

    /// Drain `rx` until every sender is gone, then flush what is left.
    ///
    /// On a failed flush the phase token is cancelled and the receiver is
    /// dropped so blocked workers wake up.
    pub async fn consume<R: TableRow>(
        &self,
        date: NaiveDate,
        mut rx: mpsc::Receiver<Fetched<R>>,
        cancel: &CancellationToken,
    ) -> Result<WriteStats, IngestError> {
        let table = R::TABLE;
        let mut stats = WriteStats::default();
        let mut buffer: Vec<R> = Vec::with_capacity(self.batch_size.min(MAX_PREALLOC));

        while let Some(item) = rx.recv().await {
            match item {
                Fetched::Record(row) => {
                    buffer.push(row);
                    if buffer.len() >= self.batch_size {
                        let full = std::mem::replace(
                            &mut buffer,
                            Vec::with_capacity(self.batch_size.min(MAX_PREALLOC)),
                        );
                        if let Err(e) = self.flush(date, full, &mut stats).await {
                            error!(table = %table, date = %date, error = %e, "Batch write failed");
                            cancel.cancel();
                            return Err(e);
                        }
                    }
                }
                Fetched::NoData { symbol } => {
                    debug!(table = %table, symbol = %symbol, "Skipping no-data marker");
                    stats.no_data += 1;
                }
            }
        }

        if !buffer.is_empty() {
            if let Err(e) = self.flush(date, buffer, &mut stats).await {
                error!(table = %table, date = %date, error = %e, "Final batch write failed");
                cancel.cancel();
                return Err(e);
            }
        }
        Ok(stats)
    }

    async fn flush<R: TableRow>(
        &self,
        date: NaiveDate,
        rows: Vec<R>,
        stats: &mut WriteStats,
    ) -> Result<(), IngestError> {
        let table = R::TABLE;
        let count = rows.len();
        let batch = R::to_batch(&rows)?;
        drop(rows);

        self.storage.insert(table, date, batch).await?;
        stats.rows += count as u64;
        stats.batches += 1;
        debug!(table = %table, date = %date, rows = count, batch = stats.batches, "Flushed batch");
        Ok(())
    }
}
