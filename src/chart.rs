use std::fmt;

use anyhow::Result;
use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cli::ChartArgs,
    data::{CellValue, Record},
    export, io_utils, table,
};

pub const PIE_SLICE_LIMIT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Scatter,
}

impl ChartKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Scatter => "scatter",
        }
    }

    /// Human label stored with saved analyses.
    pub fn label(self) -> &'static str {
        match self {
            ChartKind::Bar => "Bar Chart",
            ChartKind::Line => "Line Chart",
            ChartKind::Pie => "Pie Chart",
            ChartKind::Scatter => "Scatter Plot",
        }
    }

    fn entry_limit(self) -> Option<usize> {
        match self {
            ChartKind::Pie => Some(PIE_SLICE_LIMIT),
            ChartKind::Bar | ChartKind::Line | ChartKind::Scatter => None,
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error(
        "Chart generation needs an X column, a Y column, and a chart kind (missing: {})",
        .missing.join(", ")
    )]
    SelectionIncomplete { missing: Vec<&'static str> },
    #[error("Column '{0}' not found in file")]
    UnknownColumn(String),
}

/// What the user picked so far. Generation is only possible once all three
/// parts are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSelection {
    pub x: Option<String>,
    pub y: Option<String>,
    pub kind: Option<ChartKind>,
}

impl ChartSelection {
    /// First column as X, second as Y, bar chart.
    pub fn with_defaults(columns: &[String]) -> Self {
        Self {
            x: columns.first().cloned(),
            y: columns.get(1).cloned(),
            kind: (!columns.is_empty()).then_some(ChartKind::Bar),
        }
    }

    /// Fills unset parts from the defaults for `columns`.
    pub fn or_defaults(self, columns: &[String]) -> Self {
        let defaults = Self::with_defaults(columns);
        Self {
            x: self.x.or(defaults.x),
            y: self.y.or(defaults.y),
            kind: self.kind.or(defaults.kind),
        }
    }

    pub fn complete(&self) -> Result<(&str, &str, ChartKind), SelectionError> {
        match (&self.x, &self.y, self.kind) {
            (Some(x), Some(y), Some(kind)) => Ok((x.as_str(), y.as_str(), kind)),
            (x, y, kind) => {
                let mut missing = Vec::new();
                if x.is_none() {
                    missing.push("x");
                }
                if y.is_none() {
                    missing.push("y");
                }
                if kind.is_none() {
                    missing.push("kind");
                }
                Err(SelectionError::SelectionIncomplete { missing })
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete().is_ok()
    }
}

/// Ordered view over the records that feed one chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries<'a> {
    pub kind: ChartKind,
    pub x_column: String,
    pub y_column: String,
    pub entries: Vec<&'a Record>,
}

impl<'a> ChartSeries<'a> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(x, y)` pairs in series order.
    pub fn points(&self) -> impl Iterator<Item = (&'a CellValue, &'a CellValue)> + '_ {
        self.entries
            .iter()
            .copied()
            .map(move |record| (record.get(&self.x_column), record.get(&self.y_column)))
    }

    pub fn render_rows(&self) -> Vec<Vec<String>> {
        self.points()
            .map(|(x, y)| vec![x.as_display(), y.as_display()])
            .collect()
    }
}

/// Maps records to the series of a chart. Never sorts, buckets, or mutates.
/// Pie charts keep the first [`PIE_SLICE_LIMIT`] entries.
pub fn map_series<'a>(
    records: &'a [Record],
    x_column: &str,
    y_column: &str,
    kind: ChartKind,
) -> ChartSeries<'a> {
    let filtered = records
        .iter()
        .filter(|record| record.get(x_column).is_defined() && record.get(y_column).is_defined());
    let entries = match kind.entry_limit() {
        Some(limit) => filtered.take(limit).collect(),
        None => filtered.collect(),
    };
    ChartSeries {
        kind,
        x_column: x_column.to_string(),
        y_column: y_column.to_string(),
        entries,
    }
}

/// Checks a complete selection against the dataset columns and maps it.
pub fn map_selection<'a>(
    columns: &[String],
    records: &'a [Record],
    selection: &ChartSelection,
) -> Result<ChartSeries<'a>, SelectionError> {
    let (x, y, kind) = selection.complete()?;
    for column in [x, y] {
        if !columns.iter().any(|candidate| candidate == column) {
            return Err(SelectionError::UnknownColumn(column.to_string()));
        }
    }
    Ok(map_series(records, x, y, kind))
}

pub fn execute(args: &ChartArgs) -> Result<()> {
    let dataset = io_utils::load_dataset(&args.input.input, args.input.mime.as_deref())?;
    let selection = ChartSelection {
        x: args.x.clone(),
        y: args.y.clone(),
        kind: args.kind,
    }
    .or_defaults(&dataset.columns);
    debug!("Chart selection: {selection:?}");
    let series = map_selection(&dataset.columns, &dataset.records, &selection)?;

    if !args.quiet {
        let headers = vec![series.x_column.clone(), series.y_column.clone()];
        table::print_table(&headers, &series.render_rows());
    }
    for format in &args.export {
        let path =
            export::export_series(&series, *format, args.csv_style(), args.out_dir.as_deref())?;
        info!("Exported {} chart to {:?}", format, path);
    }
    info!(
        "Mapped {} of {} row(s) into a {} series of '{}' vs '{}'",
        series.len(),
        dataset.row_count(),
        series.kind,
        series.x_column,
        series.y_column
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: CellValue, y: CellValue) -> Record {
        vec![("x", x), ("y", y)].into_iter().collect()
    }

    #[test]
    fn filters_records_with_absent_values() {
        let records = vec![
            record(1.0.into(), CellValue::Absent),
            record(2.0.into(), 5.0.into()),
        ];
        let series = map_series(&records, "x", "y", ChartKind::Bar);
        assert_eq!(series.len(), 1);
        let points = series.points().collect::<Vec<_>>();
        assert_eq!(points, vec![(&CellValue::Number(2.0), &CellValue::Number(5.0))]);
    }

    #[test]
    fn missing_column_counts_as_absent() {
        let records = vec![record(1.0.into(), 2.0.into())];
        assert!(map_series(&records, "x", "nope", ChartKind::Line).is_empty());
    }

    #[test]
    fn pie_series_is_capped_at_twelve_in_order() {
        let records = (0..20)
            .map(|i| record(format!("slice {i}").into(), (i as f64).into()))
            .collect::<Vec<_>>();
        let series = map_series(&records, "x", "y", ChartKind::Pie);
        assert_eq!(series.len(), PIE_SLICE_LIMIT);
        for (idx, entry) in series.entries.iter().enumerate() {
            assert!(std::ptr::eq(*entry, &records[idx]));
        }
    }

    #[test]
    fn other_kinds_keep_every_entry() {
        let records = (0..20)
            .map(|i| record((i as f64).into(), (i as f64).into()))
            .collect::<Vec<_>>();
        for kind in [ChartKind::Bar, ChartKind::Line, ChartKind::Scatter] {
            assert_eq!(map_series(&records, "x", "y", kind).len(), 20);
        }
    }

    #[test]
    fn pie_cap_applies_after_filtering() {
        let mut records = vec![record(CellValue::Absent, 1.0.into()); 5];
        records.extend((0..15).map(|i| record((i as f64).into(), 1.0.into())));
        let series = map_series(&records, "x", "y", ChartKind::Pie);
        assert_eq!(series.len(), PIE_SLICE_LIMIT);
        assert_eq!(series.points().next().unwrap().0, &CellValue::Number(0.0));
    }

    #[test]
    fn incomplete_selection_reports_missing_parts() {
        let selection = ChartSelection {
            x: Some("a".to_string()),
            y: None,
            kind: None,
        };
        assert_eq!(
            selection.complete().unwrap_err(),
            SelectionError::SelectionIncomplete {
                missing: vec!["y", "kind"]
            }
        );
        assert!(!selection.is_complete());
    }

    #[test]
    fn defaults_pick_first_two_columns_and_bar() {
        let columns = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let selection = ChartSelection {
            kind: Some(ChartKind::Pie),
            ..Default::default()
        }
        .or_defaults(&columns);
        assert_eq!(selection.x.as_deref(), Some("a"));
        assert_eq!(selection.y.as_deref(), Some("b"));
        assert_eq!(selection.kind, Some(ChartKind::Pie));

        let single = ChartSelection::with_defaults(&columns[..1]);
        assert!(single.y.is_none());
    }

    #[test]
    fn map_selection_rejects_unknown_columns() {
        let columns = vec!["x".to_string(), "y".to_string()];
        let selection = ChartSelection {
            x: Some("x".to_string()),
            y: Some("z".to_string()),
            kind: Some(ChartKind::Bar),
        };
        assert_eq!(
            map_selection(&columns, &[], &selection).unwrap_err(),
            SelectionError::UnknownColumn("z".to_string())
        );
    }
}
