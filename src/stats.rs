use std::{collections::HashSet, sync::Arc};

use anyhow::{Result, anyhow};
use log::info;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::{
    cli::{OutputFormat, StatsArgs},
    data::{CellValue, ColumnIndex, Record},
    io_utils, table,
};

pub fn execute(args: &StatsArgs) -> Result<()> {
    let dataset = io_utils::load_dataset(&args.input.input, args.input.mime.as_deref())?;
    let columns = resolve_columns(&dataset.columns, &args.columns)?;
    let report = compute_column_stats(&columns, &dataset.records);

    match args.format {
        OutputFormat::Table => {
            table::print_table(&report_headers(), &report.render_rows());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    info!(
        "Computed column statistics for {} column(s) over {} row(s)",
        report.len(),
        dataset.row_count()
    );
    Ok(())
}

pub fn report_headers() -> Vec<String> {
    [
        "column", "type", "numeric", "distinct", "min", "max", "sum", "average",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect()
}

fn resolve_columns(available: &[String], specified: &[String]) -> Result<Vec<String>> {
    if specified.is_empty() {
        return Ok(available.to_vec());
    }
    specified
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|column| *column == name)
                .cloned()
                .ok_or_else(|| anyhow!("Column '{name}' not found in file"))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    Numeric,
    Textual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStatistics {
    pub inferred_type: InferredType,
    pub total_numeric_count: usize,
    pub distinct_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: Option<f64>,
    pub average: Option<f64>,
}

/// Statistics for each requested column, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnStatsReport {
    entries: Vec<(String, ColumnStatistics)>,
}

impl ColumnStatsReport {
    pub fn get(&self, column: &str) -> Option<&ColumnStatistics> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, stats)| stats)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnStatistics)> {
        self.entries.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render_rows(&self) -> Vec<Vec<String>> {
        self.entries
            .iter()
            .map(|(name, stats)| {
                vec![
                    name.clone(),
                    match stats.inferred_type {
                        InferredType::Numeric => "numeric".to_string(),
                        InferredType::Textual => "textual".to_string(),
                    },
                    stats.total_numeric_count.to_string(),
                    stats.distinct_count.to_string(),
                    format_metric(stats.min),
                    format_metric(stats.max),
                    format_metric(stats.sum),
                    format_metric(stats.average),
                ]
            })
            .collect()
    }
}

impl Serialize for ColumnStatsReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, stats) in &self.entries {
            map.serialize_entry(name, stats)?;
        }
        map.end()
    }
}

/// Computes the statistics entry of every column in `columns`. Pure: the
/// same inputs always produce the same report.
pub fn compute_column_stats(columns: &[String], records: &[Record]) -> ColumnStatsReport {
    let mut accumulators = columns
        .iter()
        .map(|_| ColumnAccumulator::default())
        .collect::<Vec<_>>();
    let mut layout: Option<ColumnLayout> = None;
    for record in records {
        let active = match layout.take() {
            Some(current) if record.shares_index(&current.index) => layout.insert(current),
            _ => layout.insert(ColumnLayout::resolve(record.index(), columns)),
        };
        for (accumulator, slot) in accumulators.iter_mut().zip(&active.slots) {
            if let Some(position) = slot {
                accumulator.add_value(record.value_at(*position));
            }
        }
    }
    let entries = columns
        .iter()
        .cloned()
        .zip(accumulators.into_iter().map(ColumnAccumulator::finish))
        .collect();
    ColumnStatsReport { entries }
}

/// Record positions of the requested columns under one column index.
struct ColumnLayout {
    index: Arc<ColumnIndex>,
    slots: Vec<Option<usize>>,
}

impl ColumnLayout {
    fn resolve(index: &Arc<ColumnIndex>, columns: &[String]) -> Self {
        Self {
            index: Arc::clone(index),
            slots: columns.iter().map(|column| index.position(column)).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct ColumnAccumulator {
    numeric_count: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    distinct: HashSet<String>,
}

impl ColumnAccumulator {
    fn add_value(&mut self, value: &CellValue) {
        let Some(key) = value.distinct_key() else {
            return;
        };
        self.distinct.insert(key);
        let Some(numeric) = numeric_value(value) else {
            return;
        };
        self.numeric_count += 1;
        self.sum += numeric;
        self.min = Some(self.min.map_or(numeric, |current| current.min(numeric)));
        self.max = Some(self.max.map_or(numeric, |current| current.max(numeric)));
    }

    fn finish(self) -> ColumnStatistics {
        let has_numeric = self.numeric_count > 0;
        let sum = has_numeric.then_some(self.sum);
        ColumnStatistics {
            inferred_type: if has_numeric {
                InferredType::Numeric
            } else {
                InferredType::Textual
            },
            total_numeric_count: self.numeric_count,
            distinct_count: self.distinct.len(),
            min: self.min,
            max: self.max,
            sum,
            average: sum.map(|total| total / self.numeric_count as f64),
        }
    }
}

/// The numeric reading of a cell, if it has one. Text goes through the
/// lenient prefix parse, so `"42"` and `"12kg"` are numeric and `"x"` is not.
pub fn numeric_value(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Absent => None,
        CellValue::Number(n) => n.is_finite().then_some(*n),
        CellValue::Text(s) => parse_lenient_number(s),
    }
}

/// Parses the longest decimal-number prefix of `raw` after leading
/// whitespace, the way script engines' `parseFloat` does. Only finite
/// results count.
pub fn parse_lenient_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    let bytes = trimmed.as_bytes();
    let is_digit = |idx: usize| bytes.get(idx).is_some_and(u8::is_ascii_digit);

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let mut digits = 0usize;
    while is_digit(end) {
        end += 1;
        digits += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        let mut fraction_end = end + 1;
        while is_digit(fraction_end) {
            fraction_end += 1;
        }
        let fraction_digits = fraction_end - end - 1;
        if digits + fraction_digits > 0 {
            digits += fraction_digits;
            end = fraction_end;
        }
    }
    if digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent_end = end + 1;
        if matches!(bytes.get(exponent_end), Some(b'+' | b'-')) {
            exponent_end += 1;
        }
        let exponent_start = exponent_end;
        while is_digit(exponent_end) {
            exponent_end += 1;
        }
        if exponent_end > exponent_start {
            end = exponent_end;
        }
    }
    let value = trimmed.get(..end)?.parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

fn format_metric(metric: Option<f64>) -> String {
    metric.map(format_metric_value).unwrap_or_default()
}

fn format_metric_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: Vec<CellValue>) -> (Vec<String>, Vec<Record>) {
        let records = values
            .into_iter()
            .map(|value| std::iter::once(("v", value)).collect::<Record>())
            .collect();
        (vec!["v".to_string()], records)
    }

    #[test]
    fn records_with_different_layouts_are_read_by_name() {
        let grid = crate::decode::Grid::new(vec![
            vec!["a".into(), "b".into()],
            vec![1.0.into(), 10.0.into()],
            vec![2.0.into(), 20.0.into()],
        ]);
        let mut dataset = crate::normalize::Dataset::from_grid(&grid);
        let reordered = vec![("b", CellValue::from(30.0)), ("a", CellValue::from(3.0))];
        dataset.records.push(reordered.into_iter().collect());
        dataset.records.push(Record::new());

        let columns = vec!["b".to_string(), "a".to_string(), "missing".to_string()];
        let report = compute_column_stats(&columns, &dataset.records);
        let names = report.iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, ["b", "a", "missing"]);
        assert_eq!(report.get("a").unwrap().sum, Some(6.0));
        assert_eq!(report.get("b").unwrap().sum, Some(60.0));
        assert_eq!(report.get("missing").unwrap().total_numeric_count, 0);
    }

    #[test]
    fn wide_sheet_stats_cover_every_column() {
        let width = 1_500;
        let header = (0..width)
            .map(|i| CellValue::from(format!("c{i}")))
            .collect::<Vec<_>>();
        let rows = (0..4).map(|r| {
            (0..width)
                .map(|c| CellValue::Number((r * c) as f64))
                .collect::<Vec<_>>()
        });
        let grid = crate::decode::Grid::new(std::iter::once(header).chain(rows).collect());
        let dataset = crate::normalize::Dataset::from_grid(&grid);

        let report = compute_column_stats(&dataset.columns, &dataset.records);
        assert_eq!(report.len(), width);
        let last = report.get("c1499").unwrap();
        assert_eq!(last.total_numeric_count, 4);
        assert_eq!(last.sum, Some(1499.0 * 6.0));
    }

    #[test]
    fn lenient_parse_accepts_numeric_prefixes() {
        assert_eq!(parse_lenient_number("42"), Some(42.0));
        assert_eq!(parse_lenient_number("  -3.5e2xyz"), Some(-350.0));
        assert_eq!(parse_lenient_number("12kg"), Some(12.0));
        assert_eq!(parse_lenient_number(".5"), Some(0.5));
        assert_eq!(parse_lenient_number("7."), Some(7.0));
        assert_eq!(parse_lenient_number("1e"), Some(1.0));
    }

    #[test]
    fn lenient_parse_rejects_non_numbers() {
        assert_eq!(parse_lenient_number("x"), None);
        assert_eq!(parse_lenient_number(""), None);
        assert_eq!(parse_lenient_number("."), None);
        assert_eq!(parse_lenient_number("-"), None);
        assert_eq!(parse_lenient_number("Infinity"), None);
        assert_eq!(parse_lenient_number("1e999"), None);
        assert_eq!(parse_lenient_number("TRUE"), None);
    }

    #[test]
    fn mixed_column_is_numeric_when_any_value_parses() {
        let (columns, records) = column(vec!["1".into(), "2".into(), "x".into()]);
        let report = compute_column_stats(&columns, &records);
        let stats = report.get("v").unwrap();
        assert_eq!(stats.inferred_type, InferredType::Numeric);
        assert_eq!(stats.total_numeric_count, 2);
        assert_eq!(stats.distinct_count, 3);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(2.0));
        assert_eq!(stats.sum, Some(3.0));
        assert_eq!(stats.average, Some(1.5));
    }

    #[test]
    fn numeric_column_average() {
        let (columns, records) = column(vec![10.0.into(), 20.0.into(), 30.0.into()]);
        let report = compute_column_stats(&columns, &records);
        let stats = report.get("v").unwrap();
        assert_eq!(stats.sum, Some(60.0));
        assert_eq!(stats.average, Some(20.0));
        assert_eq!(stats.min, Some(10.0));
        assert_eq!(stats.max, Some(30.0));
    }

    #[test]
    fn textual_column_has_no_numeric_fields() {
        let (columns, records) =
            column(vec!["apple".into(), "pear".into(), "apple".into(), CellValue::Absent]);
        let stats = compute_column_stats(&columns, &records)
            .get("v")
            .cloned()
            .unwrap();
        assert_eq!(stats.inferred_type, InferredType::Textual);
        assert_eq!(stats.total_numeric_count, 0);
        assert_eq!(stats.distinct_count, 2);
        assert_eq!(stats.min, None);
        assert_eq!(stats.sum, None);
        assert_eq!(stats.average, None);
    }

    #[test]
    fn absent_values_are_excluded_from_all_counts() {
        let (columns, records) = column(vec![CellValue::Absent, CellValue::Absent]);
        let stats = compute_column_stats(&columns, &records);
        let stats = stats.get("v").unwrap();
        assert_eq!(stats.distinct_count, 0);
        assert_eq!(stats.inferred_type, InferredType::Textual);
    }

    #[test]
    fn distinct_count_uses_original_representation() {
        let (columns, records) = column(vec![42.0.into(), "42".into(), "42.0".into()]);
        let report = compute_column_stats(&columns, &records);
        let stats = report.get("v").unwrap();
        assert_eq!(stats.distinct_count, 3);
        assert_eq!(stats.total_numeric_count, 3);
    }

    #[test]
    fn report_serializes_in_column_order_with_nulls() {
        let records = vec![
            vec![("name", CellValue::from("a")), ("qty", CellValue::Number(2.0))]
                .into_iter()
                .collect::<Record>(),
        ];
        let columns = vec!["qty".to_string(), "name".to_string()];
        let json = serde_json::to_string(&compute_column_stats(&columns, &records)).unwrap();
        assert!(json.starts_with(r#"{"qty":{"inferredType":"numeric""#));
        assert!(json.contains(
            r#""name":{"inferredType":"textual","totalNumericCount":0,"distinctCount":1,"min":null"#
        ));
    }

    #[test]
    fn render_rows_formats_metrics() {
        let (columns, records) = column(vec![1.0.into(), 2.0.into()]);
        let rows = compute_column_stats(&columns, &records).render_rows();
        assert_eq!(rows[0], vec!["v", "numeric", "2", "2", "1", "2", "3", "1.5000"]);
    }
}
