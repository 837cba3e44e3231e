//! Row selection by member category and customer status
//!
//! Selecting every category collapses the status filter: the status choice is
//! ignored and only rows with a known status are kept. A specific category
//! honours the status choice, with `Both` meaning New or Existing.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::records::{Locale, MemberCategory, Record, Status};

/// Category dropdown value
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    One(MemberCategory),
}

/// Status dropdown value
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    Both,
    One(Status),
}

impl CategoryFilter {
    /// Every dropdown option, "All" last as in the dashboard
    pub fn options() -> [CategoryFilter; 4] {
        [
            Self::One(MemberCategory::General),
            Self::One(MemberCategory::Offset),
            Self::One(MemberCategory::Thesis),
            Self::All,
        ]
    }

    pub fn label(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::All, Locale::En) => "All",
            (Self::All, Locale::Ko) => "전체",
            (Self::One(category), _) => category.label(locale),
        }
    }
}

impl StatusFilter {
    pub fn options() -> [StatusFilter; 3] {
        [Self::One(Status::New), Self::One(Status::Existing), Self::Both]
    }

    pub fn label(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::Both, Locale::En) => "New+Existing",
            (Self::Both, Locale::Ko) => "신규+기존",
            (Self::One(status), _) => status.label(locale),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "전체" => Ok(Self::All),
            other => other.parse().map(Self::One),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "both" | "new+existing" | "신규+기존" => Ok(Self::Both),
            other => other.parse().map(Self::One),
        }
    }
}

/// The resolved pair of dropdown values
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterSelection {
    pub category: CategoryFilter,
    pub status: StatusFilter,
}

impl FilterSelection {
    pub fn new(category: CategoryFilter, status: StatusFilter) -> Self {
        Self { category, status }
    }

    /// Every category x status combination
    pub fn all_combinations() -> Vec<FilterSelection> {
        CategoryFilter::options()
            .into_iter()
            .flat_map(|category| {
                StatusFilter::options()
                    .into_iter()
                    .map(move |status| Self::new(category, status))
            })
            .collect()
    }

    /// Check whether a record passes this selection
    pub fn matches(&self, record: &Record) -> bool {
        let Some(status) = record.status else {
            return false;
        };

        match self.category {
            CategoryFilter::All => record.member_category.is_some(),
            CategoryFilter::One(category) => {
                record.member_category == Some(category)
                    && match self.status {
                        StatusFilter::Both => true,
                        StatusFilter::One(wanted) => status == wanted,
                    }
            }
        }
    }

    pub fn describe(&self, locale: Locale) -> String {
        format!("{} / {}", self.category.label(locale), self.status.label(locale))
    }
}

/// Select the records matching a selection
pub fn filter_records<'a>(records: &'a [Record], selection: &FilterSelection) -> Vec<&'a Record> {
    records.iter().filter(|r| selection.matches(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MetricValues;

    fn record(category: Option<MemberCategory>, status: Option<Status>) -> Record {
        Record {
            year: 2023,
            month: 4,
            member_category: category,
            status,
            metrics: MetricValues {
                headcount: 1.0,
                ..Default::default()
            },
        }
    }

    fn sample() -> Vec<Record> {
        let mut rows = Vec::new();
        for category in MemberCategory::ALL {
            for status in Status::ALL {
                rows.push(record(Some(category), Some(status)));
            }
            rows.push(record(Some(category), None));
        }
        // Aggregate row with no category
        rows.push(record(None, Some(Status::New)));
        rows
    }

    #[test]
    fn test_all_categories_ignores_status_choice() {
        let rows = sample();
        for status in StatusFilter::options() {
            let selection = FilterSelection::new(CategoryFilter::All, status);
            assert_eq!(filter_records(&rows, &selection).len(), 6);
        }
    }

    #[test]
    fn test_all_categories_excludes_indeterminate_status() {
        let rows = sample();
        let selection = FilterSelection::new(CategoryFilter::All, StatusFilter::Both);
        assert!(filter_records(&rows, &selection)
            .iter()
            .all(|r| r.status.is_some() && r.member_category.is_some()));
    }

    #[test]
    fn test_specific_category_both_statuses() {
        let rows = sample();
        let selection = FilterSelection::new(
            CategoryFilter::One(MemberCategory::Offset),
            StatusFilter::Both,
        );
        let selected = filter_records(&rows, &selection);
        assert_eq!(selected.len(), 2);
        assert!(selected
            .iter()
            .all(|r| r.member_category == Some(MemberCategory::Offset)));
    }

    #[test]
    fn test_exact_match() {
        let rows = sample();
        let selection = FilterSelection::new(
            CategoryFilter::One(MemberCategory::Thesis),
            StatusFilter::One(Status::Existing),
        );
        let selected = filter_records(&rows, &selection);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].status, Some(Status::Existing));
    }

    #[test]
    fn test_parse_dropdown_values() {
        assert_eq!("전체".parse::<CategoryFilter>(), Ok(CategoryFilter::All));
        assert_eq!(
            "offset".parse::<CategoryFilter>(),
            Ok(CategoryFilter::One(MemberCategory::Offset))
        );
        assert_eq!("신규+기존".parse::<StatusFilter>(), Ok(StatusFilter::Both));
        assert_eq!(
            "new".parse::<StatusFilter>(),
            Ok(StatusFilter::One(Status::New))
        );
        assert!("everyone".parse::<CategoryFilter>().is_err());
    }

    #[test]
    fn test_all_combinations_count() {
        assert_eq!(FilterSelection::all_combinations().len(), 12);
    }
}
