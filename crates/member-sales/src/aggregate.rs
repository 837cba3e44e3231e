//! Totals, fiscal-month series and year-over-year comparisons

use serde::Serialize;
use std::collections::BTreeMap;

use crate::filter::{CategoryFilter, FilterSelection, StatusFilter};
use crate::fiscal::{calendar_month, fiscal_month};
use crate::records::{Locale, MemberCategory, Metric, MetricValues, Record, Status};

/// The two fiscal years being compared
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ComparisonYears {
    pub previous: i32,
    pub current: i32,
}

impl ComparisonYears {
    pub fn as_array(&self) -> [i32; 2] {
        [self.previous, self.current]
    }
}

/// One point of a trend line
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesPoint {
    pub fiscal_month: u32,
    pub calendar_month: u32,
    pub year: i32,
    pub value: f64,
}

/// Totals and series for one filtered record set
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub totals_by_year: BTreeMap<i32, MetricValues>,
    pub series_by_metric: BTreeMap<Metric, Vec<SeriesPoint>>,
}

impl AggregateResult {
    pub fn total(&self, year: i32, metric: Metric) -> f64 {
        self.totals_by_year
            .get(&year)
            .map(|v| v.get(metric))
            .unwrap_or(0.0)
    }

    pub fn series(&self, metric: Metric) -> &[SeriesPoint] {
        self.series_by_metric
            .get(&metric)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// KPI card values for a single metric
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricComparison {
    pub metric: Metric,
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
    pub growth_pct: f64,
}

/// One slice of the proportion chart
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProportionSlice {
    pub label: String,
    pub value: f64,
}

/// Sum every metric per year. Comparison years are present even when empty.
pub fn totals_by_year(records: &[&Record], years: ComparisonYears) -> BTreeMap<i32, MetricValues> {
    let mut totals: BTreeMap<i32, MetricValues> = years
        .as_array()
        .into_iter()
        .map(|y| (y, MetricValues::default()))
        .collect();

    for record in records {
        totals.entry(record.year).or_default().add(&record.metrics);
    }

    totals
}

/// Per-metric month sums for each comparison year, in fiscal order (April first)
pub fn fiscal_series(records: &[&Record], years: ComparisonYears) -> BTreeMap<Metric, Vec<SeriesPoint>> {
    // (year, fiscal month) -> metric sums
    let mut monthly: BTreeMap<(i32, u32), MetricValues> = BTreeMap::new();
    for record in records {
        monthly
            .entry((record.year, fiscal_month(record.month)))
            .or_default()
            .add(&record.metrics);
    }

    let mut series = BTreeMap::new();
    for metric in Metric::ALL {
        let mut points = Vec::with_capacity(24);
        for fiscal in 1..=12 {
            for year in years.as_array() {
                let value = monthly
                    .get(&(year, fiscal))
                    .map(|v| v.get(metric))
                    .unwrap_or(0.0);
                points.push(SeriesPoint {
                    fiscal_month: fiscal,
                    calendar_month: calendar_month(fiscal),
                    year,
                    value,
                });
            }
        }
        series.insert(metric, points);
    }

    series
}

/// Compute totals and series in one pass over the filtered set
pub fn aggregate(records: &[&Record], years: ComparisonYears) -> AggregateResult {
    AggregateResult {
        totals_by_year: totals_by_year(records, years),
        series_by_metric: fiscal_series(records, years),
    }
}

/// Percentage change; zero when there is no previous value to compare against
pub fn growth_rate(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Before/after card values for every metric
pub fn compare(result: &AggregateResult, years: ComparisonYears) -> Vec<MetricComparison> {
    Metric::ALL
        .iter()
        .map(|&metric| {
            let previous = result.total(years.previous, metric);
            let current = result.total(years.current, metric);
            MetricComparison {
                metric,
                previous,
                current,
                delta: current - previous,
                growth_pct: growth_rate(previous, current),
            }
        })
        .collect()
}

/// Split a metric for one year across categories (when all are selected) or
/// across statuses within the chosen category.
pub fn proportion(
    records: &[&Record],
    selection: &FilterSelection,
    metric: Metric,
    year: i32,
    locale: Locale,
) -> Vec<ProportionSlice> {
    let in_year = records.iter().filter(|r| r.year == year);

    match selection.category {
        CategoryFilter::All => {
            let mut sums: BTreeMap<MemberCategory, f64> = BTreeMap::new();
            for record in in_year {
                if let Some(category) = record.member_category {
                    *sums.entry(category).or_insert(0.0) += record.metrics.get(metric);
                }
            }
            MemberCategory::ALL
                .iter()
                .map(|c| ProportionSlice {
                    label: c.label(locale).to_string(),
                    value: sums.get(c).copied().unwrap_or(0.0),
                })
                .collect()
        }
        CategoryFilter::One(category) => {
            let mut sums: BTreeMap<Status, f64> = BTreeMap::new();
            for record in in_year.filter(|r| r.member_category == Some(category)) {
                if let Some(status) = record.status {
                    *sums.entry(status).or_insert(0.0) += record.metrics.get(metric);
                }
            }
            Status::ALL
                .iter()
                .map(|s| ProportionSlice {
                    label: s.label(locale).to_string(),
                    value: sums.get(s).copied().unwrap_or(0.0),
                })
                .collect()
        }
    }
}

/// True when the status filter has no effect on the selection
pub fn status_ignored(selection: &FilterSelection) -> bool {
    selection.category == CategoryFilter::All && selection.status != StatusFilter::Both
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::filter_records;

    const YEARS: ComparisonYears = ComparisonYears {
        previous: 2023,
        current: 2024,
    };

    fn rec(year: i32, month: u32, category: MemberCategory, status: Status, revenue: f64) -> Record {
        Record {
            year,
            month,
            member_category: Some(category),
            status: Some(status),
            metrics: MetricValues {
                headcount: 1.0,
                transactions: 2.0,
                revenue,
            },
        }
    }

    fn dataset() -> Vec<Record> {
        let mut rows = Vec::new();
        for (i, category) in MemberCategory::ALL.into_iter().enumerate() {
            for status in Status::ALL {
                for month in 1..=12 {
                    let base = (i as f64 + 1.0) * 10.0 + month as f64;
                    let bump = if status == Status::New { 0.5 } else { 1.5 };
                    rows.push(rec(2023, month, category, status, base * bump));
                    rows.push(rec(2024, month, category, status, base * bump * 1.1));
                }
            }
        }
        rows
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6 * a.abs().max(1.0)
    }

    #[test]
    fn test_end_to_end_example() {
        let rows = vec![
            rec(2023, 4, MemberCategory::General, Status::New, 100.0),
            rec(2024, 4, MemberCategory::General, Status::New, 150.0),
        ];
        let selection = FilterSelection::new(
            CategoryFilter::One(MemberCategory::General),
            StatusFilter::One(Status::New),
        );
        let filtered = filter_records(&rows, &selection);
        let result = aggregate(&filtered, YEARS);

        assert_eq!(result.total(2023, Metric::Revenue), 100.0);
        assert_eq!(result.total(2024, Metric::Revenue), 150.0);

        let revenue = compare(&result, YEARS)
            .into_iter()
            .find(|c| c.metric == Metric::Revenue)
            .unwrap();
        assert_eq!(revenue.delta, 50.0);
        assert_eq!(revenue.growth_pct, 50.0);

        let nonzero: Vec<_> = result
            .series(Metric::Revenue)
            .iter()
            .filter(|p| p.value != 0.0)
            .collect();
        assert_eq!(nonzero.len(), 2);
        assert!(nonzero.iter().all(|p| p.fiscal_month == 1));
        assert_eq!(nonzero[0].value, 100.0);
        assert_eq!(nonzero[1].value, 150.0);
    }

    #[test]
    fn test_series_sums_to_totals_for_every_selection() {
        let rows = dataset();
        for selection in FilterSelection::all_combinations() {
            let filtered = filter_records(&rows, &selection);
            let result = aggregate(&filtered, YEARS);
            for metric in Metric::ALL {
                for year in YEARS.as_array() {
                    let series_sum: f64 = result
                        .series(metric)
                        .iter()
                        .filter(|p| p.year == year)
                        .map(|p| p.value)
                        .sum();
                    assert!(approx(series_sum, result.total(year, metric)));
                }
            }
        }
    }

    #[test]
    fn test_all_categories_totals_independent_of_status() {
        let rows = dataset();
        let reference = aggregate(
            &filter_records(&rows, &FilterSelection::new(CategoryFilter::All, StatusFilter::Both)),
            YEARS,
        );
        for status in [StatusFilter::One(Status::New), StatusFilter::One(Status::Existing)] {
            let result = aggregate(
                &filter_records(&rows, &FilterSelection::new(CategoryFilter::All, status)),
                YEARS,
            );
            assert_eq!(result.totals_by_year, reference.totals_by_year);
        }
    }

    #[test]
    fn test_both_equals_new_plus_existing() {
        let rows = dataset();
        for category in MemberCategory::ALL {
            let total_for = |status| {
                let selection = FilterSelection::new(CategoryFilter::One(category), status);
                aggregate(&filter_records(&rows, &selection), YEARS)
            };
            let both = total_for(StatusFilter::Both);
            let new = total_for(StatusFilter::One(Status::New));
            let existing = total_for(StatusFilter::One(Status::Existing));
            for metric in Metric::ALL {
                for year in YEARS.as_array() {
                    assert!(approx(
                        both.total(year, metric),
                        new.total(year, metric) + existing.total(year, metric)
                    ));
                }
            }
        }
    }

    #[test]
    fn test_growth_rate() {
        assert_eq!(growth_rate(0.0, 500.0), 0.0);
        assert_eq!(growth_rate(0.0, 0.0), 0.0);
        assert_eq!(growth_rate(200.0, 150.0), -25.0);
        assert!(approx(growth_rate(3.0, 4.0), (4.0 - 3.0) / 3.0 * 100.0));
    }

    #[test]
    fn test_series_is_in_fiscal_order() {
        let rows = dataset();
        let filtered: Vec<&Record> = rows.iter().collect();
        let result = aggregate(&filtered, YEARS);
        let points = result.series(Metric::Headcount);
        assert_eq!(points.len(), 24);
        assert_eq!(points[0].calendar_month, 4);
        assert_eq!(points[0].fiscal_month, 1);
        assert_eq!(points[23].calendar_month, 3);
        assert_eq!(points[23].fiscal_month, 12);
        assert!(points.windows(2).all(|w| w[0].fiscal_month <= w[1].fiscal_month));
    }

    #[test]
    fn test_empty_dataset_is_all_zero() {
        let result = aggregate(&[], YEARS);
        for metric in Metric::ALL {
            assert_eq!(result.total(2023, metric), 0.0);
            assert_eq!(result.total(2024, metric), 0.0);
            assert!(result.series(metric).iter().all(|p| p.value == 0.0));
        }
        assert!(compare(&result, YEARS).iter().all(|c| c.growth_pct == 0.0));
    }

    #[test]
    fn test_proportion_by_category_when_all_selected() {
        let rows = vec![
            rec(2024, 5, MemberCategory::General, Status::New, 10.0),
            rec(2024, 6, MemberCategory::Thesis, Status::Existing, 30.0),
            rec(2023, 6, MemberCategory::Thesis, Status::Existing, 999.0),
        ];
        let selection = FilterSelection::default();
        let filtered = filter_records(&rows, &selection);
        let slices = proportion(&filtered, &selection, Metric::Revenue, 2024, Locale::En);
        assert_eq!(
            slices,
            vec![
                ProportionSlice { label: "General".into(), value: 10.0 },
                ProportionSlice { label: "Offset".into(), value: 0.0 },
                ProportionSlice { label: "Thesis".into(), value: 30.0 },
            ]
        );
    }

    #[test]
    fn test_proportion_by_status_within_category() {
        let rows = vec![
            rec(2024, 5, MemberCategory::Offset, Status::New, 10.0),
            rec(2024, 6, MemberCategory::Offset, Status::Existing, 30.0),
            rec(2024, 6, MemberCategory::General, Status::Existing, 70.0),
        ];
        let selection = FilterSelection::new(
            CategoryFilter::One(MemberCategory::Offset),
            StatusFilter::One(Status::New),
        );
        let filtered = filter_records(&rows, &selection);
        let slices = proportion(&filtered, &selection, Metric::Revenue, 2024, Locale::Ko);
        // The unselected status is already filtered out
        assert_eq!(slices[0], ProportionSlice { label: "신규".into(), value: 10.0 });
        assert_eq!(slices[1], ProportionSlice { label: "기존".into(), value: 0.0 });
    }

    #[test]
    fn test_status_ignored() {
        assert!(status_ignored(&FilterSelection::new(
            CategoryFilter::All,
            StatusFilter::One(Status::New)
        )));
        assert!(!status_ignored(&FilterSelection::default()));
    }
}
