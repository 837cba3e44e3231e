//! Schema normalization: raw sheets in any supported layout -> canonical records
//!
//! Three layouts exist in the wild:
//! - wide per-year sheets with `{year}_{month}_{metric}` columns,
//! - one flat table with explicit year/month/category/status columns,
//! - wide per-year sheets that also carry a `{year}_총합_{metric}` summary.
//!
//! Column lookups go through a [`ColumnMap`] built once per sheet. Headers that
//! don't fit the naming pattern are ignored, and cells that don't parse as
//! numbers count as zero.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::constants::{COLUMN_SEPARATOR, FISCAL_YEAR_START_MONTH, SUMMARY_TOKENS, SUMMARY_TOLERANCE};
use crate::error::{LoadError, LoadResult};
use crate::records::{MemberCategory, Metric, MetricValues, Record, Status};
use crate::source::{RawSheet, RawWorkbook};

/// Source layout selector
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaConvention {
    /// One sheet per fiscal year, wide monthly columns
    #[default]
    WideByYear,
    /// One long table with year and month columns
    FlatWithYearColumn,
    /// One sheet per fiscal year with monthly and summary columns
    SheetPerYearWithSummary,
}

impl std::fmt::Display for SchemaConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaConvention::WideByYear => write!(f, "wide-by-year"),
            SchemaConvention::FlatWithYearColumn => write!(f, "flat-with-year-column"),
            SchemaConvention::SheetPerYearWithSummary => write!(f, "sheet-per-year-with-summary"),
        }
    }
}

/// Which year's columns feed January-March of a fiscal-year sheet
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MonthLookup {
    /// Sheet year `Y` reads `Y_{m}_*` for every month
    #[default]
    Calendar,
    /// January-March read `(Y+1)_{m}_*`, the following calendar year
    FiscalCrossYear,
}

impl MonthLookup {
    /// Year whose columns hold `month` for a sheet covering `sheet_year`
    pub fn column_year(&self, sheet_year: i32, month: u32) -> i32 {
        match self {
            MonthLookup::Calendar => sheet_year,
            MonthLookup::FiscalCrossYear if month < FISCAL_YEAR_START_MONTH => sheet_year + 1,
            MonthLookup::FiscalCrossYear => sheet_year,
        }
    }
}

/// A configured sheet and the fiscal year it covers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SheetSpec {
    pub name: String,
    #[serde(default)]
    pub year: Option<i32>,
}

/// Everything the normalizer needs besides the workbook
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub convention: SchemaConvention,
    pub month_lookup: MonthLookup,
    /// Empty means "every sheet in the workbook"
    pub sheets: Vec<SheetSpec>,
}

// =============================================================================
// Column Map
// =============================================================================

/// Parsed meaning of a wide column header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKey {
    Monthly { year: i32, month: u32, metric: Metric },
    Summary { year: i32, metric: Metric },
}

/// Parse `{year}_{month}_{metric}` or `{year}_{summary}_{metric}`
pub fn parse_column_header(header: &str) -> Option<ColumnKey> {
    let mut parts = header.trim().split(COLUMN_SEPARATOR);
    let year = parts.next()?.trim();
    let middle = parts.next()?.trim();
    let metric = parts.next()?.trim();
    if parts.next().is_some() {
        return None;
    }

    if year.len() != 4 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let metric: Metric = metric.parse().ok()?;

    let lowered = middle.to_lowercase();
    if SUMMARY_TOKENS.contains(&lowered.as_str()) {
        return Some(ColumnKey::Summary { year, metric });
    }

    let month: u32 = middle.trim_end_matches('월').parse().ok()?;
    (1..=12)
        .contains(&month)
        .then_some(ColumnKey::Monthly { year, month, metric })
}

/// Lookup table from (year, month, metric) to column index, built once per sheet
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    monthly: HashMap<(i32, u32, Metric), usize>,
    summary: HashMap<(i32, Metric), usize>,
}

impl ColumnMap {
    pub fn from_headers(headers: &[String]) -> Self {
        let mut map = ColumnMap::default();
        for (idx, header) in headers.iter().enumerate() {
            match parse_column_header(header) {
                Some(ColumnKey::Monthly { year, month, metric }) => {
                    // First occurrence wins on duplicate headers
                    map.monthly.entry((year, month, metric)).or_insert(idx);
                }
                Some(ColumnKey::Summary { year, metric }) => {
                    map.summary.entry((year, metric)).or_insert(idx);
                }
                None => {}
            }
        }
        map
    }

    pub fn monthly(&self, year: i32, month: u32, metric: Metric) -> Option<usize> {
        self.monthly.get(&(year, month, metric)).copied()
    }

    pub fn summary(&self, year: i32, metric: Metric) -> Option<usize> {
        self.summary.get(&(year, metric)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.monthly.is_empty() && self.summary.is_empty()
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Decompose a workbook into canonical records
pub fn normalize(workbook: &RawWorkbook, options: &NormalizeOptions) -> LoadResult<Vec<Record>> {
    let records = match options.convention {
        SchemaConvention::FlatWithYearColumn => {
            let sheet = match options.sheets.first() {
                Some(spec) => workbook.sheet(&spec.name)?,
                None => workbook.sheets.first().ok_or(LoadError::EmptyWorkbook)?,
            };
            normalize_flat(sheet)?
        }
        SchemaConvention::WideByYear | SchemaConvention::SheetPerYearWithSummary => {
            let reconcile = options.convention == SchemaConvention::SheetPerYearWithSummary;
            let mut records = Vec::new();
            for (sheet, year) in resolve_year_sheets(workbook, &options.sheets)? {
                records.extend(normalize_wide(sheet, year, options.month_lookup, reconcile));
            }
            records
        }
    };

    info!(
        convention = %options.convention,
        records = records.len(),
        "normalized workbook"
    );
    Ok(records)
}

/// Pair each per-year sheet with its fiscal year
fn resolve_year_sheets<'a>(
    workbook: &'a RawWorkbook,
    specs: &[SheetSpec],
) -> LoadResult<Vec<(&'a RawSheet, i32)>> {
    if workbook.sheets.is_empty() {
        return Err(LoadError::EmptyWorkbook);
    }

    if specs.is_empty() {
        return workbook
            .sheets
            .iter()
            .map(|sheet| {
                infer_year(&sheet.name)
                    .map(|year| (sheet, year))
                    .ok_or_else(|| LoadError::UnknownSheetYear(sheet.name.clone()))
            })
            .collect();
    }

    specs
        .iter()
        .map(|spec| {
            let sheet = workbook.sheet(&spec.name)?;
            let year = spec
                .year
                .or_else(|| infer_year(&spec.name))
                .ok_or_else(|| LoadError::UnknownSheetYear(spec.name.clone()))?;
            Ok((sheet, year))
        })
        .collect()
}

/// First run of exactly four digits in a sheet name ("월별데이터(2023)" -> 2023)
pub fn infer_year(name: &str) -> Option<i32> {
    let chars: Vec<char> = name.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i - start == 4 {
                return chars[start..i].iter().collect::<String>().parse().ok();
            }
        } else {
            i += 1;
        }
    }
    None
}

fn parse_label<T: std::str::FromStr>(sheet: &RawSheet, row: usize, column: usize) -> Option<T> {
    sheet.cell(row, column).as_text()?.parse().ok()
}

/// Wide layout: column 0 = member category, column 1 = status, then monthly columns
fn normalize_wide(sheet: &RawSheet, year: i32, lookup: MonthLookup, reconcile: bool) -> Vec<Record> {
    let columns = ColumnMap::from_headers(&sheet.headers);
    if columns.is_empty() {
        warn!(sheet = %sheet.name, "no {{year}}_{{month}}_{{metric}} columns found");
    }

    let mut records = Vec::new();
    let mut mismatches = 0usize;

    for (row_idx, row) in sheet.rows.iter().enumerate() {
        if row.iter().all(|c| c.as_text().is_none()) {
            continue;
        }

        let member_category: Option<MemberCategory> = parse_label(sheet, row_idx, 0);
        let status: Option<Status> = parse_label(sheet, row_idx, 1);
        let mut row_totals = MetricValues::default();

        for month in 1..=12 {
            let column_year = lookup.column_year(year, month);
            let mut metrics = MetricValues::default();
            let mut found = false;

            for metric in Metric::ALL {
                if let Some(col) = columns.monthly(column_year, month, metric) {
                    *metrics.get_mut(metric) = sheet.cell(row_idx, col).as_number();
                    found = true;
                }
            }

            if found {
                row_totals.add(&metrics);
                records.push(Record {
                    year,
                    month,
                    member_category,
                    status,
                    metrics,
                });
            }
        }

        if reconcile {
            for metric in Metric::ALL {
                let Some(col) = columns.summary(year, metric) else {
                    continue;
                };
                let expected = sheet.cell(row_idx, col).as_number();
                let actual = row_totals.get(metric);
                if (expected - actual).abs() > SUMMARY_TOLERANCE * expected.abs().max(1.0) {
                    mismatches += 1;
                    debug!(
                        sheet = %sheet.name,
                        row = row_idx + 2,
                        %metric,
                        expected,
                        actual,
                        "summary column disagrees with monthly sum"
                    );
                }
            }
        }
    }

    if mismatches > 0 {
        warn!(
            sheet = %sheet.name,
            mismatches,
            "summary columns disagree with monthly columns; using monthly values"
        );
    }

    debug!(sheet = %sheet.name, year, records = records.len(), "normalized wide sheet");
    records
}

/// Header aliases for the flat layout, compared after lowercasing and
/// stripping spaces, underscores and hyphens
const YEAR_ALIASES: [&str; 3] = ["year", "연도", "년도"];
const MONTH_ALIASES: [&str; 2] = ["month", "월"];
const CATEGORY_ALIASES: [&str; 5] = ["membercategory", "category", "member", "회원구분", "회원"];
const STATUS_ALIASES: [&str; 4] = ["status", "type", "신규/기존", "구분"];

fn canonical_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect()
}

fn find_column(sheet: &RawSheet, aliases: &[&str], name: &str) -> LoadResult<usize> {
    sheet
        .headers
        .iter()
        .position(|h| aliases.contains(&canonical_header(h).as_str()))
        .ok_or_else(|| LoadError::MissingColumn {
            sheet: sheet.name.clone(),
            column: name.to_string(),
        })
}

/// Flat layout: one record per row
fn normalize_flat(sheet: &RawSheet) -> LoadResult<Vec<Record>> {
    let year_col = find_column(sheet, &YEAR_ALIASES, "year")?;
    let month_col = find_column(sheet, &MONTH_ALIASES, "month")?;
    let category_col = find_column(sheet, &CATEGORY_ALIASES, "memberCategory")?;
    let status_col = find_column(sheet, &STATUS_ALIASES, "status")?;

    let metric_cols: Vec<(Metric, usize)> = Metric::ALL
        .iter()
        .filter_map(|&metric| {
            sheet
                .headers
                .iter()
                .position(|h| h.parse::<Metric>() == Ok(metric))
                .map(|idx| (metric, idx))
        })
        .collect();

    let mut records = Vec::with_capacity(sheet.rows.len());
    let mut skipped = 0usize;

    for row_idx in 0..sheet.rows.len() {
        let year = sheet.cell(row_idx, year_col).as_int();
        let month = sheet.cell(row_idx, month_col).as_int();
        let year = year.and_then(|y| i32::try_from(y).ok());
        let month = month
            .and_then(|m| u32::try_from(m).ok())
            .filter(|m| (1..=12).contains(m));
        let (Some(year), Some(month)) = (year, month) else {
            skipped += 1;
            continue;
        };

        let mut metrics = MetricValues::default();
        for &(metric, col) in &metric_cols {
            *metrics.get_mut(metric) = sheet.cell(row_idx, col).as_number();
        }

        records.push(Record {
            year,
            month,
            member_category: parse_label(sheet, row_idx, category_col),
            status: parse_label(sheet, row_idx, status_col),
            metrics,
        });
    }

    if skipped > 0 {
        debug!(sheet = %sheet.name, skipped, "skipped rows without a valid year/month");
    }

    Ok(records)
}
