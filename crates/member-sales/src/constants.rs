//! Centralized constants for the member sales dashboard
//!
//! Dataset-specific settings (source location, sheet names, comparison years)
//! are loaded from member-sales.toml.

// =============================================================================
// Data Source
// =============================================================================

/// Google Drive direct download URL (append file id)
pub const DRIVE_DOWNLOAD_BASE: &str = "https://drive.google.com/uc?export=download&id=";

/// Maximum download attempts before the load is abandoned
pub const FETCH_MAX_RETRIES: u32 = 3;

/// Request timeout for the spreadsheet download (seconds)
pub const FETCH_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Fiscal Calendar
// =============================================================================

/// Calendar month that opens the fiscal year (April)
pub const FISCAL_YEAR_START_MONTH: u32 = 4;

/// Calendar months in fiscal order (April through March)
pub const FISCAL_MONTH_ORDER: [u32; 12] = [4, 5, 6, 7, 8, 9, 10, 11, 12, 1, 2, 3];

/// Default comparison years when the config omits them
pub const DEFAULT_PREVIOUS_YEAR: i32 = 2023;
pub const DEFAULT_CURRENT_YEAR: i32 = 2024;

// =============================================================================
// Column Naming
// =============================================================================

/// Separator used in wide column headers: `{year}_{month}_{metric}`
pub const COLUMN_SEPARATOR: char = '_';

/// Month tokens that mark a per-year summary column (`2023_총합_매출`)
pub const SUMMARY_TOKENS: [&str; 4] = ["총합", "total", "summary", "sum"];

/// Relative tolerance when reconciling summary columns with monthly sums
pub const SUMMARY_TOLERANCE: f64 = 1e-6;

// =============================================================================
// File Names
// =============================================================================

/// Default config file
pub const CONFIG_FILENAME: &str = "member-sales.toml";

/// Cache database filename
pub const CACHE_FILENAME: &str = "cache.sqlite";

/// Per-metric totals CSV filename
pub const TOTALS_FILENAME: &str = "totals.csv";

/// Proportion (pie) table CSV filename
pub const PROPORTION_FILENAME: &str = "proportion.csv";

/// Fiscal-month series CSV filename
pub const SERIES_FILENAME: &str = "series.csv";

/// Full dashboard hand-off document
pub const DASHBOARD_JSON_FILENAME: &str = "dashboard.json";
