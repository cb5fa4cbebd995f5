use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::NaiveDate;
use polyhouse_schemas::Table;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::storage::Storage;

/// One accepted insert.
#[derive(Debug, Clone)]
pub struct StoredBatch {
    pub table: Table,
    pub date: NaiveDate,
    pub batch: RecordBatch,
}

/// In-process store that keeps every insert in arrival order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    batches: Arc<RwLock<Vec<StoredBatch>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert so far, oldest first.
    pub async fn batches(&self) -> Vec<StoredBatch> {
        self.batches.read().await.clone()
    }

    /// Row count of each insert into `table`, in order.
    pub async fn batch_sizes(&self, table: Table) -> Vec<usize> {
        self.batches
            .read()
            .await
            .iter()
            .filter(|b| b.table == table)
            .map(|b| b.batch.num_rows())
            .collect()
    }

    /// Ticker column of every row stored for `table`, in insert order.
    pub async fn tickers(&self, table: Table) -> Vec<String> {
        self.batches
            .read()
            .await
            .iter()
            .filter(|b| b.table == table)
            .flat_map(|b| ticker_values(&b.batch))
            .collect()
    }
}

fn ticker_values(batch: &RecordBatch) -> Vec<String> {
    batch
        .column_by_name("ticker")
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .map(|arr| {
            (0..arr.len())
                .filter(|i| arr.is_valid(*i))
                .map(|i| arr.value(i).to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Storage for MemoryStore {
    async fn insert(
        &self,
        table: Table,
        date: NaiveDate,
        batch: RecordBatch,
    ) -> Result<(), StorageError> {
        self.batches
            .write()
            .await
            .push(StoredBatch { table, date, batch });
        Ok(())
    }

    async fn ingested_symbols(
        &self,
        table: Table,
        date: NaiveDate,
    ) -> Result<HashSet<String>, StorageError> {
        Ok(self
            .batches
            .read()
            .await
            .iter()
            .filter(|b| b.table == table && b.date == date)
            .flat_map(|b| ticker_values(&b.batch))
            .collect())
    }
}
