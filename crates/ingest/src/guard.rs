use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use polyhouse_schemas::Table;
use tracing::debug;

use crate::error::IngestError;
use crate::storage::Storage;

/// Skips symbols a previous run already stored.
pub struct IncrementalGuard {
    storage: Arc<dyn Storage>,
    tables: HashSet<Table>,
}

impl IncrementalGuard {
    pub fn new(storage: Arc<dyn Storage>, tables: impl IntoIterator<Item = Table>) -> Self {
        Self {
            storage,
            tables: tables.into_iter().collect(),
        }
    }

    pub fn applies_to(&self, table: Table) -> bool {
        self.tables.contains(&table)
    }

    /// Symbols already present for `table` on `date`. Always empty for unguarded tables.
    pub async fn already_ingested(
        &self,
        table: Table,
        date: NaiveDate,
    ) -> Result<HashSet<String>, IngestError> {
        if !self.applies_to(table) {
            return Ok(HashSet::new());
        }
        Ok(self.storage.ingested_symbols(table, date).await?)
    }

    /// Split `active` into the symbols still to fetch and the number skipped.
    pub async fn prune(
        &self,
        table: Table,
        date: NaiveDate,
        active: &BTreeSet<String>,
    ) -> Result<(Vec<String>, usize), IngestError> {
        let done = self.already_ingested(table, date).await?;
        let pending: Vec<String> = active
            .iter()
            .filter(|symbol| !done.contains(*symbol))
            .cloned()
            .collect();
        let skipped = active.len() - pending.len();

        if skipped > 0 {
            debug!(table = %table, date = %date, skipped, "Skipping already ingested symbols");
        }
        Ok((pending, skipped))
    }
}
