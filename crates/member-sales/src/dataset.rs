//! The loaded dataset: fetched once, normalized, cached, then read-only

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::aggregate::ComparisonYears;
use crate::cache::Cache;
use crate::config::Config;
use crate::error::LoadResult;
use crate::records::Record;
use crate::schema::{self, MonthLookup};
use crate::source;

/// Where the records in a Dataset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetOrigin {
    Cache,
    Source,
}

impl std::fmt::Display for DatasetOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetOrigin::Cache => write!(f, "cache"),
            DatasetOrigin::Source => write!(f, "source"),
        }
    }
}

/// Immutable record set shared by every recomputation in a session
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Arc<[Record]>,
    pub source_key: String,
    pub loaded_at: DateTime<Utc>,
    pub origin: DatasetOrigin,
}

impl Dataset {
    pub fn new(records: Vec<Record>, source_key: String, loaded_at: DateTime<Utc>, origin: DatasetOrigin) -> Self {
        Self {
            records: records.into(),
            source_key,
            loaded_at,
            origin,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct years present in the data, ascending
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    /// Years to compare: the configured pair, or the two latest years in the
    /// data when the config has no [comparison] section
    pub fn comparison_years(&self, config: &Config) -> ComparisonYears {
        if config.years_configured {
            return config.years;
        }
        match self.years().as_slice() {
            [.., previous, current] => ComparisonYears {
                previous: *previous,
                current: *current,
            },
            _ => config.years,
        }
    }
}

/// Cache key: the location plus everything that changes how it normalizes
pub fn cache_key(config: &Config) -> String {
    let lookup = match config.normalize.month_lookup {
        MonthLookup::Calendar => "calendar",
        MonthLookup::FiscalCrossYear => "fiscal-cross-year",
    };
    let sheets: Vec<String> = config
        .normalize
        .sheets
        .iter()
        .map(|s| match s.year {
            Some(year) => format!("{}={}", s.name, year),
            None => s.name.clone(),
        })
        .collect();

    format!(
        "{}|{}|{}|{}",
        config.location.key(),
        config.normalize.convention,
        lookup,
        sheets.join(",")
    )
}

/// Fetch and normalize straight from the configured source
pub async fn load_from_source(config: &Config) -> LoadResult<Vec<Record>> {
    let workbook = source::load_workbook(&config.location).await?;
    info!(sheets = ?workbook.sheet_names(), "loaded workbook");
    schema::normalize(&workbook, &config.normalize)
}

/// Load the dataset, reusing the cache unless `refresh` is set
pub async fn load(cache: &Cache, config: &Config, refresh: bool) -> Result<Dataset> {
    let key = cache_key(config);

    if !refresh {
        if let Some(records) = cache.get_records(&key).await? {
            let loaded_at = cache.loaded_at(&key).await?.unwrap_or_else(Utc::now);
            info!(records = records.len(), %loaded_at, "using cached dataset");
            return Ok(Dataset::new(records, key, loaded_at, DatasetOrigin::Cache));
        }
    }

    let records = load_from_source(config)
        .await
        .with_context(|| format!("Failed to load dataset from {}", config.location))?;

    let loaded_at = Utc::now();
    cache.store_records(&key, &records, loaded_at).await?;

    Ok(Dataset::new(records, key, loaded_at, DatasetOrigin::Source))
}
