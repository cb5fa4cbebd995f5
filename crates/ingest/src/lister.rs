use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::source::MarketData;

/// Read a blacklist file: one symbol per line, `#` starts a comment line.
pub fn load_blacklist(path: &Path) -> Result<HashSet<String>, IngestError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_blacklist(&content))
}

fn parse_blacklist(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Enumerates the day's traded symbols, minus the blacklist.
pub struct TickerLister {
    source: Arc<dyn MarketData>,
    blacklist: HashSet<String>,
}

impl TickerLister {
    pub fn new(source: Arc<dyn MarketData>, blacklist: HashSet<String>) -> Self {
        if !blacklist.is_empty() {
            info!(symbols = blacklist.len(), "Loaded blacklist");
        }
        Self { source, blacklist }
    }

    /// Active symbols for `date`. Empty means there is nothing to ingest that day.
    pub async fn list_active(&self, date: NaiveDate) -> Result<BTreeSet<String>, IngestError> {
        let listed = self.source.grouped_daily(date).await?;
        let total = listed.len();

        let active: BTreeSet<String> = listed
            .into_iter()
            .filter(|symbol| !self.blacklist.contains(symbol))
            .collect();

        debug!(
            date = %date,
            listed = total,
            active = active.len(),
            "Listed active symbols"
        );
        Ok(active)
    }
}
