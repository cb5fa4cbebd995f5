use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use polyhouse_schemas::Table;
use serde::Deserialize;

use crate::error::IngestError;
use crate::orchestrator::IngestSettings;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub polygon: PolygonConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    /// Enum registry file; the built-in tables are used when absent.
    #[serde(default)]
    pub enums: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolygonConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Falls back to `POLYGON_API_KEY` when empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Per-request timeout. Requests are unbounded when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            page_limit: default_page_limit(),
            timeout_secs: None,
        }
    }
}

impl PolygonConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local Parquet partitions under `path`.
    Parquet { path: PathBuf },
    /// ClickHouse HTTP interface.
    ClickHouse {
        url: String,
        #[serde(default = "default_database")]
        database: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default = "default_max_idle_conns")]
        max_idle_conns: usize,
    },
}

impl StorageConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            StorageConfig::Parquet { .. } => "parquet",
            StorageConfig::ClickHouse { .. } => "clickhouse",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// First date of the range (inclusive).
    #[serde(default)]
    pub from: Option<NaiveDate>,
    /// Last date of the range (inclusive). Processing starts here.
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default = "default_tables")]
    pub tables: Vec<Table>,
    /// One symbol per line; blank lines and `#` comments are ignored.
    #[serde(default)]
    pub blacklist_file: Option<PathBuf>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Tables whose already-stored symbols are skipped. Only tables written
    /// as one row per symbol can be guarded.
    #[serde(default = "default_guarded_tables")]
    pub guarded_tables: Vec<Table>,
}

fn default_base_url() -> String {
    polyhouse_polygon::client::DEFAULT_BASE_URL.to_string()
}

fn default_page_limit() -> u32 {
    polyhouse_polygon::client::DEFAULT_PAGE_LIMIT
}

fn default_database() -> String {
    "us_equities".to_string()
}

fn default_max_idle_conns() -> usize {
    4
}

fn default_tables() -> Vec<Table> {
    Table::ALL.to_vec()
}

fn default_guarded_tables() -> Vec<Table> {
    vec![Table::Tickers]
}

fn default_concurrency() -> usize {
    100
}

fn default_batch_size() -> usize {
    50_000
}

fn default_channel_capacity() -> usize {
    4096
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub tables: Vec<Table>,
    pub concurrency: Option<usize>,
    pub api_key: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, IngestError> {
        serde_yaml::from_str(content).map_err(|e| IngestError::Config(e.to_string()))
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if overrides.from.is_some() {
            self.ingest.from = overrides.from;
        }
        if overrides.to.is_some() {
            self.ingest.to = overrides.to;
        }
        if !overrides.tables.is_empty() {
            let mut tables = Vec::with_capacity(overrides.tables.len());
            for table in overrides.tables {
                if !tables.contains(&table) {
                    tables.push(table);
                }
            }
            self.ingest.tables = tables;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.ingest.concurrency = concurrency;
        }
        if self.polygon.api_key.is_empty() {
            if let Some(key) = overrides.api_key {
                self.polygon.api_key = key;
            }
        }
    }

    /// Inclusive `(from, to)` range.
    pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate), IngestError> {
        let from = self
            .ingest
            .from
            .ok_or_else(|| IngestError::Config("missing ingest.from".to_string()))?;
        let to = self
            .ingest
            .to
            .ok_or_else(|| IngestError::Config("missing ingest.to".to_string()))?;
        if from > to {
            return Err(IngestError::Config(format!(
                "ingest.from {} is after ingest.to {}",
                from, to
            )));
        }
        Ok((from, to))
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        self.date_range()?;

        let ingest = &self.ingest;
        if ingest.tables.is_empty() {
            return Err(IngestError::Config("no tables requested".to_string()));
        }
        for (i, table) in ingest.tables.iter().enumerate() {
            if ingest.tables[..i].contains(table) {
                return Err(IngestError::Config(format!(
                    "table {} requested more than once",
                    table
                )));
            }
        }
        // A trades symbol spans many batches, so a failed run can leave it
        // partially stored and a guarded rerun would never complete it.
        if ingest.guarded_tables.contains(&Table::Trades) {
            return Err(IngestError::Config(
                "trades cannot be guarded; its symbols are not written atomically".to_string(),
            ));
        }
        for (name, value) in [
            ("concurrency", ingest.concurrency),
            ("batch_size", ingest.batch_size),
            ("channel_capacity", ingest.channel_capacity),
        ] {
            if value == 0 {
                return Err(IngestError::Config(format!(
                    "ingest.{} must be greater than zero",
                    name
                )));
            }
        }
        if self.polygon.api_key.trim().is_empty() {
            return Err(IngestError::Config(
                "Polygon API key not set (polygon.api_key or POLYGON_API_KEY)".to_string(),
            ));
        }
        if self.polygon.page_limit == 0 {
            return Err(IngestError::Config(
                "polygon.page_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Pipeline sizing for the orchestrator.
    pub fn settings(&self) -> IngestSettings {
        IngestSettings {
            tables: self.ingest.tables.clone(),
            guarded_tables: self.ingest.guarded_tables.clone(),
            concurrency: self.ingest.concurrency,
            batch_size: self.ingest.batch_size,
            channel_capacity: self.ingest.channel_capacity,
        }
    }
}
