//! Canonical record types shared by the normalizer, filter and aggregator

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Display language for labels in reports
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ko,
}

/// Member category (closed set of three customer segments)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberCategory {
    General,
    Offset,
    Thesis,
}

impl MemberCategory {
    pub const ALL: [MemberCategory; 3] = [Self::General, Self::Offset, Self::Thesis];

    pub fn label(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::General, Locale::En) => "General",
            (Self::Offset, Locale::En) => "Offset",
            (Self::Thesis, Locale::En) => "Thesis",
            (Self::General, Locale::Ko) => "일반",
            (Self::Offset, Locale::Ko) => "오프셋",
            (Self::Thesis, Locale::Ko) => "학위논문",
        }
    }
}

impl FromStr for MemberCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" | "일반" => Ok(Self::General),
            "offset" | "오프셋" => Ok(Self::Offset),
            "thesis" | "학위논문" => Ok(Self::Thesis),
            other => Err(format!("unknown member category: {}", other)),
        }
    }
}

impl std::fmt::Display for MemberCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label(Locale::En))
    }
}

/// New vs existing customer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    New,
    Existing,
}

impl Status {
    pub const ALL: [Status; 2] = [Self::New, Self::Existing];

    pub fn label(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::New, Locale::En) => "New",
            (Self::Existing, Locale::En) => "Existing",
            (Self::New, Locale::Ko) => "신규",
            (Self::Existing, Locale::Ko) => "기존",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" | "신규" => Ok(Self::New),
            "existing" | "기존" => Ok(Self::Existing),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label(Locale::En))
    }
}

/// Tracked sales metric
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Headcount,
    Transactions,
    Revenue,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Self::Headcount, Self::Transactions, Self::Revenue];

    pub fn label(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::Headcount, Locale::En) => "Headcount",
            (Self::Transactions, Locale::En) => "Transactions",
            (Self::Revenue, Locale::En) => "Revenue",
            (Self::Headcount, Locale::Ko) => "명",
            (Self::Transactions, Locale::Ko) => "건",
            (Self::Revenue, Locale::Ko) => "매출",
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "headcount" | "명" => Ok(Self::Headcount),
            "transactions" | "transaction" | "건" => Ok(Self::Transactions),
            "revenue" | "sales" | "매출" => Ok(Self::Revenue),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label(Locale::En))
    }
}

/// One value per metric, zero when absent from the source
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricValues {
    pub headcount: f64,
    pub transactions: f64,
    pub revenue: f64,
}

impl MetricValues {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Headcount => self.headcount,
            Metric::Transactions => self.transactions,
            Metric::Revenue => self.revenue,
        }
    }

    pub fn get_mut(&mut self, metric: Metric) -> &mut f64 {
        match metric {
            Metric::Headcount => &mut self.headcount,
            Metric::Transactions => &mut self.transactions,
            Metric::Revenue => &mut self.revenue,
        }
    }

    /// Accumulate another set of values into this one
    pub fn add(&mut self, other: &MetricValues) {
        for metric in Metric::ALL {
            *self.get_mut(metric) += other.get(metric);
        }
    }
}

/// One normalized source row: a (year, month, category, status) cell of metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Fiscal year the row belongs to
    pub year: i32,
    /// Calendar month, 1-12
    pub month: u32,
    /// None for aggregate rows or unrecognized labels
    pub member_category: Option<MemberCategory>,
    /// None when the status cell is blank or unrecognized
    pub status: Option<Status>,
    pub metrics: MetricValues,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_parse_in_both_locales() {
        assert_eq!("일반".parse::<MemberCategory>(), Ok(MemberCategory::General));
        assert_eq!(" Thesis ".parse::<MemberCategory>(), Ok(MemberCategory::Thesis));
        assert_eq!("기존".parse::<Status>(), Ok(Status::Existing));
        assert_eq!("NEW".parse::<Status>(), Ok(Status::New));
        assert_eq!("매출".parse::<Metric>(), Ok(Metric::Revenue));
        assert!("합계".parse::<MemberCategory>().is_err());
    }

    #[test]
    fn test_label_round_trip() {
        for locale in [Locale::En, Locale::Ko] {
            for category in MemberCategory::ALL {
                assert_eq!(category.label(locale).parse::<MemberCategory>(), Ok(category));
            }
            for metric in Metric::ALL {
                assert_eq!(metric.label(locale).parse::<Metric>(), Ok(metric));
            }
        }
    }

    #[test]
    fn test_metric_values_add() {
        let mut total = MetricValues::default();
        total.add(&MetricValues {
            headcount: 1.0,
            transactions: 2.0,
            revenue: 300.0,
        });
        total.add(&MetricValues {
            headcount: 4.0,
            transactions: 0.0,
            revenue: 50.5,
        });
        assert_eq!(total.get(Metric::Headcount), 5.0);
        assert_eq!(total.get(Metric::Transactions), 2.0);
        assert_eq!(total.get(Metric::Revenue), 350.5);
    }
}
