//! Configuration for the member sales dashboard

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::aggregate::ComparisonYears;
use crate::constants;
use crate::filter::{CategoryFilter, FilterSelection, StatusFilter};
use crate::records::Locale;
use crate::schema::{MonthLookup, NormalizeOptions, SchemaConvention, SheetSpec};
use crate::source::SourceLocation;

// =============================================================================
// File-based Configuration (member-sales.toml)
// =============================================================================

/// Configuration loaded from member-sales.toml
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    /// Label language for reports
    #[serde(default)]
    pub locale: Locale,
    pub source: SourceConfig,
    /// Years to compare; the two latest years in the data when omitted
    #[serde(default)]
    pub comparison: Option<ComparisonConfig>,
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Where the workbook lives and how it is laid out
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    /// Direct download URL
    #[serde(default)]
    pub url: Option<String>,
    /// Google Drive file id (expanded to a direct download URL)
    #[serde(default)]
    pub drive_file_id: Option<String>,
    /// Local xlsx/xls/ods/csv file
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub convention: SchemaConvention,
    #[serde(default)]
    pub month_lookup: MonthLookup,
    /// Sheets to read; all sheets when omitted
    #[serde(default)]
    pub sheets: Vec<SheetSpec>,
}

/// Fiscal years to compare
#[derive(Debug, Deserialize)]
pub struct ComparisonConfig {
    #[serde(default = "default_previous_year")]
    pub previous_year: i32,
    #[serde(default = "default_current_year")]
    pub current_year: i32,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            previous_year: constants::DEFAULT_PREVIOUS_YEAR,
            current_year: constants::DEFAULT_CURRENT_YEAR,
        }
    }
}

fn default_previous_year() -> i32 {
    constants::DEFAULT_PREVIOUS_YEAR
}

fn default_current_year() -> i32 {
    constants::DEFAULT_CURRENT_YEAR
}

/// Initial dropdown values (All / New+Existing when omitted)
#[derive(Debug, Default, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub member: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content).with_context(|| {
            format!(
                "Failed to parse {}. Check for:\n\
                 - A missing [source] section\n\
                 - Unknown convention (wide-by-year, flat-with-year-column, sheet-per-year-with-summary)\n\
                 - Invalid TOML syntax (missing quotes, brackets, etc.)\n\n\
                 See member-sales.toml.example for the expected format.",
                path.display()
            )
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Main configuration struct with resolved values
#[derive(Debug, Clone)]
pub struct Config {
    /// Workbook location
    pub location: SourceLocation,
    /// Layout and sheet selection for the normalizer
    pub normalize: NormalizeOptions,
    /// Fiscal years under comparison
    pub years: ComparisonYears,
    /// False when `years` are defaults standing in for a missing [comparison]
    pub years_configured: bool,
    pub locale: Locale,
    /// Selection used when the CLI doesn't pass one
    pub default_selection: FilterSelection,
}

impl Config {
    /// Create config from file config and an optional source override (URL or path)
    pub fn from_file(file_config: &FileConfig, source_override: Option<String>) -> Result<Self> {
        let source = &file_config.source;

        let location = match source_override {
            Some(s) if s.starts_with("http://") || s.starts_with("https://") => SourceLocation::Url(s),
            Some(s) => SourceLocation::File(PathBuf::from(s)),
            None => resolve_location(source)?,
        };

        let comparison = file_config.comparison.as_ref();
        let defaults = ComparisonConfig::default();
        let years = ComparisonYears {
            previous: comparison.unwrap_or(&defaults).previous_year,
            current: comparison.unwrap_or(&defaults).current_year,
        };
        if years.previous == years.current {
            anyhow::bail!(
                "comparison.previous_year and comparison.current_year are both {}",
                years.previous
            );
        }

        let category = match &file_config.selection.member {
            Some(s) => s.parse::<CategoryFilter>().map_err(anyhow::Error::msg)?,
            None => CategoryFilter::All,
        };
        let status = match &file_config.selection.status {
            Some(s) => s.parse::<StatusFilter>().map_err(anyhow::Error::msg)?,
            None => StatusFilter::Both,
        };

        Ok(Self {
            location,
            normalize: NormalizeOptions {
                convention: source.convention,
                month_lookup: source.month_lookup,
                sheets: source.sheets.clone(),
            },
            years,
            years_configured: comparison.is_some(),
            locale: file_config.locale,
            default_selection: FilterSelection::new(category, status),
        })
    }
}

/// Exactly one of url / drive_file_id / path must be set
fn resolve_location(source: &SourceConfig) -> Result<SourceLocation> {
    match (&source.url, &source.drive_file_id, &source.path) {
        (Some(url), None, None) => Ok(SourceLocation::Url(url.clone())),
        (None, Some(id), None) => Ok(SourceLocation::drive(id)),
        (None, None, Some(path)) => Ok(SourceLocation::File(path.clone())),
        (None, None, None) => {
            anyhow::bail!("[source] needs one of `url`, `drive_file_id` or `path`")
        }
        _ => anyhow::bail!("[source] has more than one of `url`, `drive_file_id` and `path`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{MemberCategory, Status};

    const FULL: &str = r#"
        locale = "ko"

        [source]
        drive_file_id = "1vlOddDEvMy1M4aRola3RbZIIxLH8srdh"
        convention = "sheet-per-year-with-summary"
        month_lookup = "fiscal-cross-year"

        [[source.sheets]]
        name = "월별데이터(2023)"
        year = 2023

        [[source.sheets]]
        name = "월별데이터(2024)"

        [comparison]
        previous_year = 2022
        current_year = 2023

        [selection]
        member = "학위논문"
        status = "신규"
    "#;

    #[test]
    fn test_full_config() {
        let file = FileConfig::parse(FULL).unwrap();
        let config = Config::from_file(&file, None).unwrap();

        assert_eq!(
            config.location,
            SourceLocation::Url(
                "https://drive.google.com/uc?export=download&id=1vlOddDEvMy1M4aRola3RbZIIxLH8srdh"
                    .to_string()
            )
        );
        assert_eq!(config.normalize.convention, SchemaConvention::SheetPerYearWithSummary);
        assert_eq!(config.normalize.month_lookup, MonthLookup::FiscalCrossYear);
        assert_eq!(config.normalize.sheets.len(), 2);
        assert_eq!(config.normalize.sheets[1].year, None);
        assert_eq!(config.years, ComparisonYears { previous: 2022, current: 2023 });
        assert!(config.years_configured);
        assert_eq!(config.locale, Locale::Ko);
        assert_eq!(
            config.default_selection,
            FilterSelection::new(
                CategoryFilter::One(MemberCategory::Thesis),
                StatusFilter::One(Status::New)
            )
        );
    }

    #[test]
    fn test_minimal_config_defaults() {
        let file = FileConfig::parse("[source]\npath = \"data/sales.csv\"\n").unwrap();
        let config = Config::from_file(&file, None).unwrap();

        assert_eq!(config.location, SourceLocation::File(PathBuf::from("data/sales.csv")));
        assert_eq!(config.normalize.convention, SchemaConvention::WideByYear);
        assert_eq!(config.normalize.month_lookup, MonthLookup::Calendar);
        assert_eq!(config.years, ComparisonYears { previous: 2023, current: 2024 });
        assert!(!config.years_configured);
        assert_eq!(config.locale, Locale::En);
        assert_eq!(config.default_selection, FilterSelection::default());
    }

    #[test]
    fn test_source_override() {
        let file = FileConfig::parse("[source]\npath = \"a.xlsx\"\n").unwrap();
        let config = Config::from_file(&file, Some("https://example.com/b.xlsx".into())).unwrap();
        assert_eq!(config.location, SourceLocation::Url("https://example.com/b.xlsx".into()));

        let config = Config::from_file(&file, Some("local.csv".into())).unwrap();
        assert_eq!(config.location, SourceLocation::File(PathBuf::from("local.csv")));
    }

    #[test]
    fn test_ambiguous_or_missing_source() {
        let file = FileConfig::parse("[source]\nurl = \"https://x\"\npath = \"a.xlsx\"\n").unwrap();
        assert!(Config::from_file(&file, None).is_err());

        let file = FileConfig::parse("[source]\n").unwrap();
        assert!(Config::from_file(&file, None).is_err());
    }

    #[test]
    fn test_same_comparison_years_rejected() {
        let file = FileConfig::parse(
            "[source]\npath = \"a.xlsx\"\n[comparison]\nprevious_year = 2024\ncurrent_year = 2024\n",
        )
        .unwrap();
        assert!(Config::from_file(&file, None).is_err());
    }

    #[test]
    fn test_unknown_convention_rejected() {
        assert!(FileConfig::parse("[source]\npath = \"a\"\nconvention = \"pivot\"\n").is_err());
    }
}
