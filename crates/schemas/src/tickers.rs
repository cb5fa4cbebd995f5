use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};

use crate::{Table, TableRow};

pub const TICKERS_SCHEMA_VERSION: &str = "1.0.0";

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Convert a calendar date to an Arrow `Date32` value.
pub fn date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Daily ticker reference data in storage form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickerRow {
    /// As-of date of the snapshot.
    pub ts: NaiveDate,
    pub ticker: String,
    pub name: String,
    pub primary_exchange: String,
    pub ticker_type: String,
    pub active: bool,
    pub cik: String,
    pub composite_figi: String,
    pub share_class_figi: String,
    pub phone_number: String,
    pub description: String,
    pub sic_code: Option<u16>,
    pub sic_description: String,
    pub ticker_root: String,
    pub homepage_url: String,
    pub total_employees: Option<u32>,
    pub list_date: Option<NaiveDate>,
    pub delisted_utc: String,
    pub share_class_shares_outstanding: Option<f64>,
    pub weighted_shares_outstanding: Option<f64>,
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

const STRING_COLUMNS: &[&str] = &[
    "name",
    "primary_exchange",
    "type",
    "cik",
    "composite_figi",
    "share_class_figi",
    "phone_number",
    "description",
    "sic_description",
    "ticker_root",
    "homepage_url",
    "delisted_utc",
    "address1",
    "address2",
    "city",
    "state",
    "postal_code",
];

impl TickerRow {
    /// Values for [`STRING_COLUMNS`], in the same order.
    fn string_values(&self) -> [&str; 17] {
        [
            self.name.as_str(),
            self.primary_exchange.as_str(),
            self.ticker_type.as_str(),
            self.cik.as_str(),
            self.composite_figi.as_str(),
            self.share_class_figi.as_str(),
            self.phone_number.as_str(),
            self.description.as_str(),
            self.sic_description.as_str(),
            self.ticker_root.as_str(),
            self.homepage_url.as_str(),
            self.delisted_utc.as_str(),
            self.address1.as_str(),
            self.address2.as_str(),
            self.city.as_str(),
            self.state.as_str(),
            self.postal_code.as_str(),
        ]
    }
}

pub fn tickers_schema() -> Arc<Schema> {
    let mut fields = vec![
        Field::new("ts", DataType::Date32, false),
        Field::new("ticker", DataType::Utf8, false),
        Field::new("active", DataType::Boolean, false),
        Field::new("sic_code", DataType::UInt16, true),
        Field::new("total_employees", DataType::UInt32, true),
        Field::new("list_date", DataType::Date32, true),
        Field::new("share_class_shares_outstanding", DataType::Float64, true),
        Field::new("weighted_shares_outstanding", DataType::Float64, true),
    ];
    fields.extend(
        STRING_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false)),
    );
    Arc::new(Schema::new(fields))
}

impl TableRow for TickerRow {
    const TABLE: Table = Table::Tickers;

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        let mut ts = Date32Builder::with_capacity(rows.len());
        let mut ticker = StringBuilder::new();
        let mut active = BooleanBuilder::with_capacity(rows.len());
        let mut sic_code = UInt16Builder::with_capacity(rows.len());
        let mut total_employees = UInt32Builder::with_capacity(rows.len());
        let mut list_date = Date32Builder::with_capacity(rows.len());
        let mut shares_outstanding = Float64Builder::with_capacity(rows.len());
        let mut weighted_outstanding = Float64Builder::with_capacity(rows.len());
        let mut strings: Vec<StringBuilder> =
            STRING_COLUMNS.iter().map(|_| StringBuilder::new()).collect();

        for row in rows {
            ts.append_value(date32(row.ts));
            ticker.append_value(&row.ticker);
            active.append_value(row.active);
            sic_code.append_option(row.sic_code);
            total_employees.append_option(row.total_employees);
            list_date.append_option(row.list_date.map(date32));
            shares_outstanding.append_option(row.share_class_shares_outstanding);
            weighted_outstanding.append_option(row.weighted_shares_outstanding);
            for (builder, value) in strings.iter_mut().zip(row.string_values()) {
                builder.append_value(value);
            }
        }

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(ts.finish()),
            Arc::new(ticker.finish()),
            Arc::new(active.finish()),
            Arc::new(sic_code.finish()),
            Arc::new(total_employees.finish()),
            Arc::new(list_date.finish()),
            Arc::new(shares_outstanding.finish()),
            Arc::new(weighted_outstanding.finish()),
        ];
        columns.extend(
            strings
                .iter_mut()
                .map(|b| Arc::new(b.finish()) as ArrayRef),
        );

        RecordBatch::try_new(tickers_schema(), columns)
    }
}
