//! Spreadsheet loading from a remote URL, Google Drive, or a local file
//!
//! The workbook is reduced to plain header + cell grids so the normalizer
//! never sees calamine or csv types.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::constants;
use crate::error::{LoadError, LoadResult};

/// A single spreadsheet cell, reduced to what the normalizer needs
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Lenient numeric coercion: blanks and unparseable text count as zero
    pub fn as_number(&self) -> f64 {
        match self {
            Cell::Empty => 0.0,
            Cell::Number(n) if n.is_finite() => *n,
            Cell::Number(_) => 0.0,
            Cell::Text(s) => s
                .trim()
                .replace(',', "")
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .unwrap_or(0.0),
        }
    }

    /// Text content, with numbers rendered without a trailing ".0"
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
        }
    }

    /// Integer content (year/month columns)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Cell::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) => Cell::Empty,
        }
    }
}

/// One worksheet: the first row as headers, the rest as data
#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    /// Cell at (row, column), Empty when the row is short
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        const EMPTY: &Cell = &Cell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(EMPTY)
    }
}

/// Every sheet of a loaded workbook, in workbook order
#[derive(Debug, Clone, Default)]
pub struct RawWorkbook {
    pub sheets: Vec<RawSheet>,
}

impl RawWorkbook {
    pub fn sheet(&self, name: &str) -> LoadResult<&RawSheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| LoadError::MissingSheet {
                name: name.to_string(),
                available: self.sheet_names(),
            })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }
}

/// Where the workbook lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Url(String),
    File(std::path::PathBuf),
}

impl SourceLocation {
    /// Build the direct-download URL for a Google Drive file id
    pub fn drive(file_id: &str) -> Self {
        Self::Url(format!("{}{}", constants::DRIVE_DOWNLOAD_BASE, file_id))
    }

    /// Stable identifier used as the cache key
    pub fn key(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::File(path) => format!("file:{}", path.display()),
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Load the workbook from its location
pub async fn load_workbook(location: &SourceLocation) -> LoadResult<RawWorkbook> {
    match location {
        SourceLocation::Url(url) => {
            let bytes = fetch_bytes(url).await?;
            if looks_like_csv(url) {
                parse_csv(&bytes, "data")
            } else {
                parse_workbook(bytes)
            }
        }
        SourceLocation::File(path) => {
            let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if looks_like_csv(&path.to_string_lossy()) {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "data".to_string());
                parse_csv(&bytes, &name)
            } else {
                parse_workbook(bytes)
            }
        }
    }
}

fn looks_like_csv(location: &str) -> bool {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Download the source with exponential backoff on transport errors and 429s
async fn fetch_bytes(url: &str) -> LoadResult<Vec<u8>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(constants::FETCH_TIMEOUT_SECS))
        .build()
        .map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let max_retries = constants::FETCH_MAX_RETRIES;
    let mut last_error = None;

    for attempt in 0..max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(2u64.pow(attempt));
            debug!(attempt, ?delay, "retrying download");
            sleep(delay).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    match response.bytes().await {
                        Ok(bytes) => {
                            info!(bytes = bytes.len(), "downloaded workbook");
                            return Ok(bytes.to_vec());
                        }
                        Err(e) => {
                            last_error = Some(LoadError::Fetch {
                                url: url.to_string(),
                                message: format!("body read failed: {}", e),
                            });
                        }
                    }
                } else if status.as_u16() == 429 {
                    // Rate limited - always retry
                    warn!(attempt, "rate limited (429)");
                    last_error = Some(LoadError::Status {
                        url: url.to_string(),
                        status: 429,
                    });
                } else {
                    return Err(LoadError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "download failed");
                last_error = Some(LoadError::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| LoadError::Fetch {
        url: url.to_string(),
        message: format!("failed after {} retries", max_retries),
    }))
}

/// Open xlsx/xls/ods bytes and copy every sheet into a RawWorkbook
pub fn parse_workbook(bytes: Vec<u8>) -> LoadResult<RawWorkbook> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| LoadError::Workbook(e.to_string()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(LoadError::EmptyWorkbook);
    }

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| LoadError::Workbook(format!("sheet '{}': {}", name, e)))?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|header| {
                header
                    .iter()
                    .map(|c| Cell::from(c).as_text().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        let rows: Vec<Vec<Cell>> = rows.map(|r| r.iter().map(Cell::from).collect()).collect();

        debug!(sheet = %name, rows = rows.len(), "read worksheet");
        sheets.push(RawSheet {
            name,
            headers,
            rows,
        });
    }

    Ok(RawWorkbook { sheets })
}

/// Parse a CSV export as a single-sheet workbook
pub fn parse_csv(bytes: &[u8], sheet_name: &str) -> LoadResult<RawWorkbook> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(RawWorkbook {
        sheets: vec![RawSheet {
            name: sheet_name.to_string(),
            headers,
            rows,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_number_coercion() {
        assert_eq!(Cell::Empty.as_number(), 0.0);
        assert_eq!(Cell::Number(12.5).as_number(), 12.5);
        assert_eq!(Cell::Number(f64::NAN).as_number(), 0.0);
        assert_eq!(Cell::Text("1,234".into()).as_number(), 1234.0);
        assert_eq!(Cell::Text(" 7 ".into()).as_number(), 7.0);
        assert_eq!(Cell::Text("n/a".into()).as_number(), 0.0);
        assert_eq!(Cell::Text("-".into()).as_number(), 0.0);
    }

    #[test]
    fn test_cell_text_and_int() {
        assert_eq!(Cell::Number(2023.0).as_text().as_deref(), Some("2023"));
        assert_eq!(Cell::Text("  ".into()).as_text(), None);
        assert_eq!(Cell::Number(4.0).as_int(), Some(4));
        assert_eq!(Cell::Text("12".into()).as_int(), Some(12));
        assert_eq!(Cell::Number(4.5).as_int(), None);
    }

    #[test]
    fn test_parse_csv_single_sheet() {
        let data = "year,month,memberCategory,status,Revenue\n2023,4,General,New,100\n2024,4,General,New,\n";
        let workbook = parse_csv(data.as_bytes(), "flat").unwrap();
        let sheet = workbook.sheet("flat").unwrap();
        assert_eq!(sheet.headers[4], "Revenue");
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.cell(1, 4), &Cell::Empty);
        assert_eq!(sheet.cell(5, 0), &Cell::Empty);
    }

    #[test]
    fn test_missing_sheet_lists_available() {
        let workbook = RawWorkbook {
            sheets: vec![RawSheet {
                name: "2023".into(),
                ..Default::default()
            }],
        };
        let err = workbook.sheet("2024").unwrap_err();
        assert!(err.to_string().contains("2023"));
    }

    #[test]
    fn test_source_location() {
        let drive = SourceLocation::drive("abc123");
        assert_eq!(
            drive.key(),
            "https://drive.google.com/uc?export=download&id=abc123"
        );
        assert!(looks_like_csv("https://example.com/export.CSV?x=1"));
        assert!(!looks_like_csv("data/sales.xlsx"));
    }
}
