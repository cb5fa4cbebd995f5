//! polyhouse-schemas: storage-side row types, Arrow schemas and the enum registry
//!
//! Both ingestible tables (`trades`, `tickers`) are described here so the
//! ingestion pipeline and the storage backends agree on a single column layout.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

pub mod enums;
pub mod error;
pub mod tickers;
pub mod trades;

pub use enums::{EnumKind, EnumRegistry, EnumTable};
pub use error::SchemaError;
pub use tickers::TickerRow;
pub use trades::TradeRow;

/// A destination table in the analytical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Tickers,
    Trades,
}

impl Table {
    /// Every table, in the order a date's phases run.
    pub const ALL: [Table; 2] = [Table::Tickers, Table::Trades];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Tickers => "tickers",
            Table::Trades => "trades",
        }
    }

    pub fn schema(&self) -> Arc<Schema> {
        match self {
            Table::Tickers => tickers::tickers_schema(),
            Table::Trades => trades::trades_schema(),
        }
    }

    pub fn schema_version(&self) -> &'static str {
        match self {
            Table::Tickers => tickers::TICKERS_SCHEMA_VERSION,
            Table::Trades => trades::TRADES_SCHEMA_VERSION,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tickers" => Ok(Table::Tickers),
            "trades" => Ok(Table::Trades),
            other => Err(SchemaError::UnknownTable(other.to_string())),
        }
    }
}

/// A transformed record ready to be appended to a table batch.
pub trait TableRow: Send + Sized + 'static {
    const TABLE: Table;

    /// Build a single Arrow batch from rows, preserving their order.
    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trips_through_str() {
        for table in Table::ALL {
            assert_eq!(table.name().parse::<Table>().unwrap(), table);
        }
        assert_eq!(" Trades ".parse::<Table>().unwrap(), Table::Trades);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let err = "quotes".parse::<Table>().unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTable(ref t) if t == "quotes"));
    }

    #[test]
    fn test_schema_has_ticker_column() {
        for table in Table::ALL {
            assert!(table.schema().field_with_name("ticker").is_ok());
        }
    }
}
