//! polyhouse-ingest: date-range ingestion of Polygon market data into a columnar store
//!
//! For each date (newest first) the day's traded symbols are listed, symbols
//! already stored are skipped, and the rest are fetched by a bounded worker
//! pool and written through a single batch writer per table.

pub mod config;
pub mod error;
pub mod guard;
pub mod lister;
pub mod orchestrator;
pub mod pool;
pub mod source;
pub mod storage;
pub mod transform;
pub mod writer;

pub use config::Config;
pub use error::{IngestError, StorageError};
pub use orchestrator::{DateOutcome, DateRangeOrchestrator, IngestSettings, RunSummary, TableReport};
pub use pool::{FetchStats, Fetched};
pub use source::MarketData;
pub use storage::Storage;
pub use writer::WriteStats;
