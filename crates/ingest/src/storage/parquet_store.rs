use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::array::{Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use polyhouse_schemas::{EnumRegistry, Table};
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::{date_str, Storage};

/// Parquet partitions on a local filesystem: `{root}/{table}/{date}/part-{uuid}.parquet`.
///
/// Each insert becomes one file, written under a `.tmp` name and renamed into
/// place, so readers never see a partial batch.
pub struct ParquetStore {
    root: PathBuf,
    tape_enum: String,
    participant_enum: String,
}

impl ParquetStore {
    pub fn new(root: PathBuf, registry: &EnumRegistry) -> Self {
        Self {
            root,
            tape_enum: registry.tapes().enum_definition(),
            participant_enum: registry.participants().enum_definition(),
        }
    }

    pub fn partition_dir(&self, table: Table, date: NaiveDate) -> PathBuf {
        self.root.join(table.name()).join(date_str(date))
    }

    fn writer_properties(&self, table: Table) -> WriterProperties {
        let mut metadata = vec![
            KeyValue::new("polyhouse.table".to_string(), table.name().to_string()),
            KeyValue::new(
                "polyhouse.schema_version".to_string(),
                table.schema_version().to_string(),
            ),
        ];
        if table == Table::Trades {
            metadata.push(KeyValue::new(
                "polyhouse.enum.tape".to_string(),
                self.tape_enum.clone(),
            ));
            metadata.push(KeyValue::new(
                "polyhouse.enum.participant".to_string(),
                self.participant_enum.clone(),
            ));
        }

        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_max_row_group_size(100_000)
            .set_data_page_size_limit(1024 * 1024)
            .set_statistics_enabled(EnabledStatistics::Chunk)
            .set_created_by("polyhouse-ingest".to_string())
            .set_key_value_metadata(Some(metadata))
            .build()
    }
}

fn write_file(
    dir: &Path,
    batch: &RecordBatch,
    props: WriterProperties,
) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(dir)?;

    let filename = format!("part-{}.parquet", Uuid::new_v4());
    let tmp_path = dir.join(format!("{}.tmp", filename));
    let final_path = dir.join(&filename);

    let result = (|| {
        let file = File::create(&tmp_path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;
        fs::rename(&tmp_path, &final_path)?;
        Ok::<_, StorageError>(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(final_path)
}

fn read_tickers(dir: &Path) -> Result<HashSet<String>, StorageError> {
    let mut symbols = HashSet::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(symbols),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
            continue;
        }

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
        let ticker_leaf = builder
            .parquet_schema()
            .columns()
            .iter()
            .position(|c| c.name() == "ticker");
        let Some(ticker_leaf) = ticker_leaf else {
            continue;
        };
        let mask = ProjectionMask::leaves(builder.parquet_schema(), [ticker_leaf]);
        let reader = builder.with_projection(mask).build()?;

        for batch in reader {
            let batch = batch?;
            if let Some(tickers) = batch
                .column_by_name("ticker")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            {
                for i in 0..tickers.len() {
                    if tickers.is_valid(i) {
                        symbols.insert(tickers.value(i).to_string());
                    }
                }
            }
        }
    }
    Ok(symbols)
}

#[async_trait]
impl Storage for ParquetStore {
    async fn insert(
        &self,
        table: Table,
        date: NaiveDate,
        batch: RecordBatch,
    ) -> Result<(), StorageError> {
        let dir = self.partition_dir(table, date);
        let props = self.writer_properties(table);
        let rows = batch.num_rows();

        let path = tokio::task::spawn_blocking(move || write_file(&dir, &batch, props))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        debug!(table = %table, date = %date, rows, path = ?path, "Wrote parquet file");
        Ok(())
    }

    async fn ingested_symbols(
        &self,
        table: Table,
        date: NaiveDate,
    ) -> Result<HashSet<String>, StorageError> {
        let dir = self.partition_dir(table, date);
        tokio::task::spawn_blocking(move || read_tickers(&dir))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}
