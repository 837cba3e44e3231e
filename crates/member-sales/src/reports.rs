//! Dashboard hand-off: console summary, CSV tables and a JSON document

use anyhow::Result;
use csv::Writer;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::aggregate::{self, ComparisonYears, MetricComparison, ProportionSlice};
use crate::constants;
use crate::filter::FilterSelection;
use crate::fiscal::{fiscal_year_label, month_label};
use crate::records::{Locale, Metric, Record};

/// Metric shown in the proportion chart
pub const PROPORTION_METRIC: Metric = Metric::Revenue;

/// Everything the presentation layer needs for one selection
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub selection: FilterSelection,
    pub selection_label: String,
    /// Status dropdown has no effect (every category selected)
    pub status_ignored: bool,
    pub years: ComparisonYears,
    pub comparisons: Vec<MetricComparison>,
    pub proportion_metric: Metric,
    pub proportion: Vec<ProportionSlice>,
    pub series: Vec<SeriesTable>,
    #[serde(skip)]
    pub locale: Locale,
}

/// Trend chart table for one metric, one row per fiscal month
#[derive(Debug, Clone, Serialize)]
pub struct SeriesTable {
    pub metric: Metric,
    pub label: String,
    pub rows: Vec<SeriesRow>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesRow {
    pub fiscal_month: u32,
    pub month_label: String,
    pub previous: f64,
    pub current: f64,
}

/// Filter, aggregate and reshape for one selection
pub fn build_view(
    records: &[Record],
    selection: &FilterSelection,
    years: ComparisonYears,
    locale: Locale,
) -> DashboardView {
    let filtered = crate::filter::filter_records(records, selection);
    let result = aggregate::aggregate(&filtered, years);

    let series = Metric::ALL
        .iter()
        .map(|&metric| {
            let points = result.series(metric);
            let rows = points
                .chunk_by(|a, b| a.fiscal_month == b.fiscal_month)
                .map(|month_points| {
                    let value_for = |year| {
                        month_points
                            .iter()
                            .find(|p| p.year == year)
                            .map(|p| p.value)
                            .unwrap_or(0.0)
                    };
                    SeriesRow {
                        fiscal_month: month_points[0].fiscal_month,
                        month_label: month_label(month_points[0].calendar_month, locale),
                        previous: value_for(years.previous),
                        current: value_for(years.current),
                    }
                })
                .collect();
            SeriesTable {
                metric,
                label: metric.label(locale).to_string(),
                rows,
            }
        })
        .collect();

    DashboardView {
        selection: *selection,
        selection_label: selection.describe(locale),
        status_ignored: aggregate::status_ignored(selection),
        years,
        comparisons: aggregate::compare(&result, years),
        proportion_metric: PROPORTION_METRIC,
        proportion: aggregate::proportion(&filtered, selection, PROPORTION_METRIC, years.current, locale),
        series,
        locale,
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Round to a whole number and group thousands: 1234567.8 -> "1,234,568"
pub fn format_amount(value: f64) -> String {
    let rounded = normalize_zero(value.round());
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Signed amount for deltas: "+50", "-1,200", "+0"
pub fn format_delta(value: f64) -> String {
    if normalize_zero(value.round()) < 0.0 {
        format_amount(value)
    } else {
        format!("+{}", format_amount(value))
    }
}

/// Signed percentage with one decimal: "+50.0%"
pub fn format_growth(pct: f64) -> String {
    format!("{:+.1}%", normalize_zero(pct))
}

/// Normalize -0.0 to 0.0 for cleaner display
fn normalize_zero(val: f64) -> f64 {
    if val == 0.0 { 0.0 } else { val }
}

// =============================================================================
// Console
// =============================================================================

#[derive(Tabled)]
struct SliceRow {
    #[tabled(rename = "Segment")]
    label: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Share")]
    share: String,
}

/// Render the dashboard for one selection as console tables
pub fn print_summary(out: &mut impl Write, view: &DashboardView) -> io::Result<()> {
    let locale = view.locale;
    let prev_label = fiscal_year_label(view.years.previous, locale);
    let curr_label = fiscal_year_label(view.years.current, locale);

    writeln!(out, "\n============================================================")?;
    writeln!(out, "  {}  ({} -> {})", view.selection_label, prev_label, curr_label)?;
    writeln!(out, "============================================================\n")?;

    if view.status_ignored {
        writeln!(out, "  (status filter has no effect when every category is selected)\n")?;
    }

    writeln!(out, "TOTALS:")?;
    for c in &view.comparisons {
        writeln!(
            out,
            "  {:<14} {:>14} -> {:>14}   {:>12}  {:>8}  {}",
            c.metric.label(locale),
            format_amount(c.previous),
            format_amount(c.current),
            format_delta(c.delta),
            format_growth(c.growth_pct),
            if c.delta >= 0.0 { "▲" } else { "▼" }
        )?;
    }

    writeln!(
        out,
        "\n{} SPLIT ({}):",
        view.proportion_metric.label(locale).to_uppercase(),
        curr_label
    )?;
    let total: f64 = view.proportion.iter().map(|s| s.value).sum();
    let rows: Vec<SliceRow> = view
        .proportion
        .iter()
        .map(|s| SliceRow {
            label: s.label.clone(),
            value: format_amount(s.value),
            share: if total == 0.0 {
                "-".to_string()
            } else {
                format!("{:.1}%", s.value / total * 100.0)
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    writeln!(out, "{}", table)?;

    for series in &view.series {
        writeln!(out, "\n{} BY MONTH:", series.label.to_uppercase())?;
        let mut builder = Builder::default();
        builder.push_record(["#".to_string(), "Month".to_string(), prev_label.clone(), curr_label.clone()]);
        for row in &series.rows {
            builder.push_record([
                row.fiscal_month.to_string(),
                row.month_label.clone(),
                format_amount(row.previous),
                format_amount(row.current),
            ]);
        }
        let mut table = builder.build();
        table.with(Style::rounded());
        writeln!(out, "{}", table)?;
    }

    writeln!(out, "============================================================")
}

/// One line per metric for many selections
pub fn print_sweep(out: &mut impl Write, views: &[DashboardView]) -> io::Result<()> {
    let Some(first) = views.first() else {
        return Ok(());
    };
    let locale = first.locale;

    let mut builder = Builder::default();
    builder.push_record([
        "Selection".to_string(),
        "Metric".to_string(),
        fiscal_year_label(first.years.previous, locale),
        fiscal_year_label(first.years.current, locale),
        "Delta".to_string(),
        "Growth".to_string(),
    ]);
    for view in views {
        for c in &view.comparisons {
            builder.push_record([
                view.selection_label.clone(),
                c.metric.label(locale).to_string(),
                format_amount(c.previous),
                format_amount(c.current),
                format_delta(c.delta),
                format_growth(c.growth_pct),
            ]);
        }
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    writeln!(out, "{}", table)
}

/// Print one view and write its report files.
///
/// `out` receives only the tables or, in JSON mode, only the JSON document;
/// progress lines go to `log`.
pub fn emit_report(
    out: &mut impl Write,
    log: &mut impl Write,
    output_dir: &Path,
    view: &DashboardView,
    json: bool,
) -> Result<Vec<PathBuf>> {
    if json {
        serde_json::to_writer_pretty(&mut *out, view)?;
        writeln!(out)?;
    } else {
        print_summary(out, view)?;
    }

    writeln!(log, "\nWriting reports to {}...", output_dir.display())?;
    write_reports(log, output_dir, view)
}

/// Sweep counterpart of [`emit_report`]
pub fn emit_sweep(
    out: &mut impl Write,
    log: &mut impl Write,
    output_dir: &Path,
    views: &[DashboardView],
    json: bool,
) -> Result<PathBuf> {
    if json {
        serde_json::to_writer_pretty(&mut *out, views)?;
        writeln!(out)?;
    } else {
        print_sweep(out, views)?;
    }

    writeln!(log, "\nWriting sweep to {}...", output_dir.display())?;
    write_sweep(log, output_dir, views)
}

// =============================================================================
// Files
// =============================================================================

/// Write totals, proportion, series CSVs and dashboard.json
pub fn write_reports(log: &mut impl Write, output_dir: &Path, view: &DashboardView) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let written = vec![
        write_totals(output_dir, std::slice::from_ref(view))?,
        write_proportion(output_dir, view)?,
        write_series(output_dir, view)?,
        write_json(output_dir, view)?,
    ];
    for path in &written {
        writeln!(log, "  Generated: {}", path.display())?;
    }
    Ok(written)
}

/// Write one totals file covering several selections
pub fn write_sweep(log: &mut impl Write, output_dir: &Path, views: &[DashboardView]) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = write_totals(output_dir, views)?;
    writeln!(log, "  Generated: {}", path.display())?;
    Ok(path)
}

/// Generate totals.csv
fn write_totals(output_dir: &Path, views: &[DashboardView]) -> Result<PathBuf> {
    let path = output_dir.join(constants::TOTALS_FILENAME);
    let mut wtr = Writer::from_path(&path)?;

    wtr.write_record([
        "Member",
        "Status",
        "Metric",
        "Previous_Year",
        "Previous_Total",
        "Current_Year",
        "Current_Total",
        "Delta",
        "Growth_Pct",
    ])?;

    for view in views {
        let locale = view.locale;
        for c in &view.comparisons {
            wtr.write_record([
                view.selection.category.label(locale),
                view.selection.status.label(locale),
                c.metric.label(locale),
                &view.years.previous.to_string(),
                &format!("{:.2}", c.previous),
                &view.years.current.to_string(),
                &format!("{:.2}", c.current),
                &format!("{:.2}", c.delta),
                &format!("{:.2}", c.growth_pct),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(path)
}

/// Generate proportion.csv
fn write_proportion(output_dir: &Path, view: &DashboardView) -> Result<PathBuf> {
    let path = output_dir.join(constants::PROPORTION_FILENAME);
    let mut wtr = Writer::from_path(&path)?;

    wtr.write_record(["Segment", "Year", "Metric", "Value"])?;
    for slice in &view.proportion {
        wtr.write_record([
            slice.label.as_str(),
            &view.years.current.to_string(),
            view.proportion_metric.label(view.locale),
            &format!("{:.2}", slice.value),
        ])?;
    }

    wtr.flush()?;
    Ok(path)
}

/// Generate series.csv (long format: one row per metric, month and year)
fn write_series(output_dir: &Path, view: &DashboardView) -> Result<PathBuf> {
    let path = output_dir.join(constants::SERIES_FILENAME);
    let mut wtr = Writer::from_path(&path)?;

    wtr.write_record(["Metric", "Fiscal_Month", "Month", "Fiscal_Year", "Value"])?;
    for series in &view.series {
        for row in &series.rows {
            for (year, value) in [(view.years.previous, row.previous), (view.years.current, row.current)] {
                wtr.write_record([
                    series.label.as_str(),
                    &row.fiscal_month.to_string(),
                    &row.month_label,
                    &fiscal_year_label(year, view.locale),
                    &format!("{:.2}", value),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(path)
}

/// Generate dashboard.json
fn write_json(output_dir: &Path, view: &DashboardView) -> Result<PathBuf> {
    let path = output_dir.join(constants::DASHBOARD_JSON_FILENAME);
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, view)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CategoryFilter, StatusFilter};
    use crate::records::{MemberCategory, MetricValues, Status};

    const YEARS: ComparisonYears = ComparisonYears {
        previous: 2023,
        current: 2024,
    };

    fn example_records() -> Vec<Record> {
        [(2023, 100.0), (2024, 150.0)]
            .into_iter()
            .map(|(year, revenue)| Record {
                year,
                month: 4,
                member_category: Some(MemberCategory::General),
                status: Some(Status::New),
                metrics: MetricValues {
                    revenue,
                    ..Default::default()
                },
            })
            .collect()
    }

    fn general_new() -> FilterSelection {
        FilterSelection::new(
            CategoryFilter::One(MemberCategory::General),
            StatusFilter::One(Status::New),
        )
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(-0.2), "0");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(1234567.8), "1,234,568");
        assert_eq!(format_amount(-1200.0), "-1,200");
        assert_eq!(format_delta(50.0), "+50");
        assert_eq!(format_delta(-1200.0), "-1,200");
        assert_eq!(format_delta(0.0), "+0");
        assert_eq!(format_growth(50.0), "+50.0%");
        assert_eq!(format_growth(-12.345), "-12.3%");
    }

    #[test]
    fn test_view_for_end_to_end_example() {
        let view = build_view(&example_records(), &general_new(), YEARS, Locale::En);

        let revenue = view
            .comparisons
            .iter()
            .find(|c| c.metric == Metric::Revenue)
            .unwrap();
        assert_eq!(format_delta(revenue.delta), "+50");
        assert_eq!(format_growth(revenue.growth_pct), "+50.0%");

        let revenue_series = view
            .series
            .iter()
            .find(|s| s.metric == Metric::Revenue)
            .unwrap();
        assert_eq!(revenue_series.rows.len(), 12);
        assert_eq!(
            revenue_series.rows[0],
            SeriesRow {
                fiscal_month: 1,
                month_label: "Apr".into(),
                previous: 100.0,
                current: 150.0,
            }
        );
        assert!(revenue_series.rows[1..]
            .iter()
            .all(|r| r.previous == 0.0 && r.current == 0.0));
        assert_eq!(revenue_series.rows[11].month_label, "Mar");

        assert!(!view.status_ignored);
        assert_eq!(view.proportion[0].value, 150.0);
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let view = build_view(&example_records(), &general_new(), YEARS, Locale::Ko);
        let mut log = Vec::new();
        let written = write_reports(&mut log, dir.path(), &view).unwrap();
        assert_eq!(written.len(), 4);
        assert_eq!(String::from_utf8(log).unwrap().matches("Generated:").count(), 4);

        let totals = std::fs::read_to_string(dir.path().join(constants::TOTALS_FILENAME)).unwrap();
        assert!(totals.contains("일반,신규,매출,2023,100.00,2024,150.00,50.00,50.00"));

        let series = std::fs::read_to_string(dir.path().join(constants::SERIES_FILENAME)).unwrap();
        // header + 3 metrics x 12 months x 2 years
        assert_eq!(series.lines().count(), 1 + 3 * 12 * 2);
        assert!(series.contains("매출,1,4월,2024회계연도,150.00"));

        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(constants::DASHBOARD_JSON_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(json["years"]["current"], 2024);
        assert_eq!(json["comparisons"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_sweep_covers_every_selection() {
        let dir = tempfile::tempdir().unwrap();
        let records = example_records();
        let views: Vec<_> = FilterSelection::all_combinations()
            .iter()
            .map(|s| build_view(&records, s, YEARS, Locale::En))
            .collect();
        write_sweep(&mut std::io::sink(), dir.path(), &views).unwrap();

        let totals = std::fs::read_to_string(dir.path().join(constants::TOTALS_FILENAME)).unwrap();
        assert_eq!(totals.lines().count(), 1 + 12 * 3);
    }

    #[test]
    fn test_json_mode_output_is_only_json() {
        let dir = tempfile::tempdir().unwrap();
        let view = build_view(&example_records(), &general_new(), YEARS, Locale::En);
        let mut out = Vec::new();
        let mut log = Vec::new();
        emit_report(&mut out, &mut log, dir.path(), &view, true).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["selection_label"], "General / New");
        assert!(String::from_utf8(log).unwrap().contains("Generated:"));
    }

    #[test]
    fn test_json_sweep_output_is_only_json() {
        let dir = tempfile::tempdir().unwrap();
        let records = example_records();
        let views: Vec<_> = FilterSelection::all_combinations()
            .iter()
            .map(|s| build_view(&records, s, YEARS, Locale::En))
            .collect();
        let mut out = Vec::new();
        emit_sweep(&mut out, &mut std::io::sink(), dir.path(), &views, true).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 12);
    }

    #[test]
    fn test_table_mode_prints_summary() {
        let dir = tempfile::tempdir().unwrap();
        let view = build_view(&example_records(), &general_new(), YEARS, Locale::En);
        let mut out = Vec::new();
        emit_report(&mut out, &mut std::io::sink(), dir.path(), &view, false).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("TOTALS:"));
        assert!(!text.contains("Generated:"));
    }
}
