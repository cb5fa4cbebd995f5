//! Columnar store abstraction: atomic batch inserts plus the per-date symbol
//! lookup used by the incremental guard.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::NaiveDate;
use polyhouse_schemas::{EnumRegistry, Table};

use crate::config::StorageConfig;
use crate::error::StorageError;

pub mod clickhouse;
pub mod memory;
pub mod parquet_store;

pub use self::clickhouse::ClickHouseStore;
pub use self::memory::MemoryStore;
pub use self::parquet_store::ParquetStore;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Write one batch. Either every row becomes visible or none does.
    async fn insert(
        &self,
        table: Table,
        date: NaiveDate,
        batch: RecordBatch,
    ) -> Result<(), StorageError>;

    /// Distinct symbols already stored for `table` on `date`.
    async fn ingested_symbols(
        &self,
        table: Table,
        date: NaiveDate,
    ) -> Result<HashSet<String>, StorageError>;
}

/// Build the configured backend.
pub fn open(
    config: &StorageConfig,
    registry: &EnumRegistry,
) -> Result<Arc<dyn Storage>, StorageError> {
    match config {
        StorageConfig::Parquet { path } => Ok(Arc::new(ParquetStore::new(path.clone(), registry))),
        StorageConfig::ClickHouse {
            url,
            database,
            username,
            password,
            max_idle_conns,
        } => Ok(Arc::new(ClickHouseStore::new(
            url,
            database,
            username.clone(),
            password.clone(),
            *max_idle_conns,
        )?)),
    }
}

pub(crate) fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
