use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::{Table, TableRow};

pub const TRADES_SCHEMA_VERSION: &str = "1.0.0";

fn ts_type() -> DataType {
    DataType::Timestamp(TimeUnit::Nanosecond, Some(Arc::from("UTC")))
}

/// One trade execution in storage form.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    /// Unique within tape and day.
    pub seqnum: u64,
    pub tape: u8,
    pub id: u64,
    pub ticker: String,
    /// SIP timestamp, nanoseconds since the epoch.
    pub ts: i64,
    pub ts_participant: Option<i64>,
    pub ts_trf: Option<i64>,
    pub price: f64,
    pub size: u32,
    pub conditions: Vec<u8>,
    pub correction: u8,
    pub exchange: u8,
    pub trf: u8,
}

pub fn trades_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("seqnum", DataType::UInt64, false),
        Field::new("tape", DataType::UInt8, false),
        Field::new("id", DataType::UInt64, false),
        Field::new("ticker", DataType::Utf8, false),
        Field::new("ts", ts_type(), false),
        Field::new("ts_participant", ts_type(), true),
        Field::new("ts_trf", ts_type(), true),
        Field::new("price", DataType::Float64, false),
        Field::new("size", DataType::UInt32, false),
        Field::new(
            "conditions",
            DataType::List(Arc::new(Field::new("item", DataType::UInt8, true))),
            false,
        ),
        Field::new("correction", DataType::UInt8, false),
        Field::new("exchange", DataType::UInt8, false),
        Field::new("trf", DataType::UInt8, false),
    ]))
}

impl TableRow for TradeRow {
    const TABLE: Table = Table::Trades;

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        let mut seqnum = UInt64Builder::with_capacity(rows.len());
        let mut tape = UInt8Builder::with_capacity(rows.len());
        let mut id = UInt64Builder::with_capacity(rows.len());
        let mut ticker = StringBuilder::new();
        let mut ts = TimestampNanosecondBuilder::with_capacity(rows.len());
        let mut ts_participant = TimestampNanosecondBuilder::with_capacity(rows.len());
        let mut ts_trf = TimestampNanosecondBuilder::with_capacity(rows.len());
        let mut price = Float64Builder::with_capacity(rows.len());
        let mut size = UInt32Builder::with_capacity(rows.len());
        let mut conditions = ListBuilder::new(UInt8Builder::new());
        let mut correction = UInt8Builder::with_capacity(rows.len());
        let mut exchange = UInt8Builder::with_capacity(rows.len());
        let mut trf = UInt8Builder::with_capacity(rows.len());

        for row in rows {
            seqnum.append_value(row.seqnum);
            tape.append_value(row.tape);
            id.append_value(row.id);
            ticker.append_value(&row.ticker);
            ts.append_value(row.ts);
            ts_participant.append_option(row.ts_participant);
            ts_trf.append_option(row.ts_trf);
            price.append_value(row.price);
            size.append_value(row.size);
            for c in &row.conditions {
                conditions.values().append_value(*c);
            }
            conditions.append(true);
            correction.append_value(row.correction);
            exchange.append_value(row.exchange);
            trf.append_value(row.trf);
        }

        RecordBatch::try_new(
            trades_schema(),
            vec![
                Arc::new(seqnum.finish()),
                Arc::new(tape.finish()),
                Arc::new(id.finish()),
                Arc::new(ticker.finish()),
                Arc::new(ts.finish().with_timezone("UTC")),
                Arc::new(ts_participant.finish().with_timezone("UTC")),
                Arc::new(ts_trf.finish().with_timezone("UTC")),
                Arc::new(price.finish()),
                Arc::new(size.finish()),
                Arc::new(conditions.finish()),
                Arc::new(correction.finish()),
                Arc::new(exchange.finish()),
                Arc::new(trf.finish()),
            ],
        )
    }
}
