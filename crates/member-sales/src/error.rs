//! Error types for dataset loading.

use thiserror::Error;

/// Result type for loading and normalizing the source workbook.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Fatal failures while obtaining the dataset.
///
/// Anything that goes wrong after the records exist (empty filters, zero
/// divisors, unparseable cells) is not an error and never produces one of these.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Transport failure, retried until exhausted.
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Server answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Reading a local source file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The bytes could not be opened as a spreadsheet.
    #[error("unreadable workbook: {0}")]
    Workbook(String),

    /// CSV source could not be parsed.
    #[error("unreadable csv: {0}")]
    Csv(#[from] csv::Error),

    /// A configured sheet does not exist in the workbook.
    #[error("sheet '{name}' not found (available: {})", available.join(", "))]
    MissingSheet { name: String, available: Vec<String> },

    /// A required column is absent from a sheet.
    #[error("sheet '{sheet}' has no '{column}' column")]
    MissingColumn { sheet: String, column: String },

    /// A per-year sheet carries no year in config or in its name.
    #[error("cannot determine the fiscal year of sheet '{0}'; set `year` in [[source.sheets]]")]
    UnknownSheetYear(String),

    /// The workbook contains no sheets at all.
    #[error("workbook has no sheets")]
    EmptyWorkbook,
}
