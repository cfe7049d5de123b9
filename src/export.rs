//! Chart series export.
//!
//! CSV and JSON are encoded here. PNG and PDF need a [`Rasterizer`]; none is
//! bundled, so those formats fail with [`ExportError::RasterizerUnavailable`]
//! unless a caller supplies one.
//!
//! The default CSV output is the raw `x,y` form without quoting, so a value
//! holding a comma shifts the columns. [`CsvStyle::Quoted`] writes RFC 4180
//! quoting instead and is opt-in.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::{
    chart::{ChartKind, ChartSeries},
    data::Record,
    io_utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[value(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Png,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Png => "png",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvStyle {
    #[default]
    Raw,
    Quoted,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No rasterizer is available to render {0} output")]
    RasterizerUnavailable(ExportFormat),
    #[error("Rasterizer failed: {0}")]
    Rasterizer(String),
    #[error("Encoding CSV export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Encoding JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Writing export failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders a series to an image or document. Implemented outside this crate.
pub trait Rasterizer {
    fn rasterize(
        &self,
        series: &ChartSeries<'_>,
        format: ExportFormat,
    ) -> Result<Vec<u8>, ExportError>;
}

/// `chart-<kind>-<x>-vs-<y>.<ext>`
pub fn export_file_name(
    kind: ChartKind,
    x_column: &str,
    y_column: &str,
    format: ExportFormat,
) -> String {
    format!(
        "chart-{kind}-{x_column}-vs-{y_column}.{}",
        format.extension()
    )
}

/// Header line followed by one line per entry whose values are both defined.
/// Lines are joined with `\n` and there is no trailing newline.
pub fn encode_csv(series: &ChartSeries<'_>, style: CsvStyle) -> Result<String, ExportError> {
    let rows = series
        .points()
        .filter(|(x, y)| x.is_defined() && y.is_defined())
        .map(|(x, y)| [x.as_display(), y.as_display()]);
    match style {
        CsvStyle::Raw => {
            let mut lines = vec![format!("{},{}", series.x_column, series.y_column)];
            lines.extend(rows.map(|[x, y]| format!("{x},{y}")));
            Ok(lines.join("\n"))
        }
        CsvStyle::Quoted => {
            let mut writer = csv::WriterBuilder::new()
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(Vec::new());
            writer.write_record([series.x_column.as_str(), series.y_column.as_str()])?;
            for row in rows {
                writer.write_record(&row)?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|err| ExportError::Io(err.into_error()))?;
            let mut text = String::from_utf8_lossy(&bytes).into_owned();
            if text.ends_with('\n') {
                text.pop();
            }
            Ok(text)
        }
    }
}

#[derive(Serialize)]
struct ChartExport<'s> {
    #[serde(rename = "type")]
    kind: ChartKind,
    x: &'s str,
    y: &'s str,
    data: &'s [&'s Record],
}

/// `{type, x, y, data}` pretty-printed with two-space indentation. `data`
/// holds the full source record of each series entry.
pub fn encode_json(series: &ChartSeries<'_>) -> Result<String, ExportError> {
    let payload = ChartExport {
        kind: series.kind,
        x: &series.x_column,
        y: &series.y_column,
        data: &series.entries,
    };
    Ok(serde_json::to_string_pretty(&payload)?)
}

pub fn encode(
    series: &ChartSeries<'_>,
    format: ExportFormat,
    style: CsvStyle,
    rasterizer: Option<&dyn Rasterizer>,
) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Csv => Ok(encode_csv(series, style)?.into_bytes()),
        ExportFormat::Json => Ok(encode_json(series)?.into_bytes()),
        ExportFormat::Png | ExportFormat::Pdf => rasterizer
            .ok_or(ExportError::RasterizerUnavailable(format))?
            .rasterize(series, format),
    }
}

/// Replaces characters that cannot appear in a file name on common platforms.
fn safe_file_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let pattern = UNSAFE.get_or_init(|| {
        Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("file name pattern compiles")
    });
    pattern.replace_all(name, "_").into_owned()
}

/// Encodes the series and writes it under `out_dir` (or the working
/// directory) using the standard export file name.
pub fn export_series(
    series: &ChartSeries<'_>,
    format: ExportFormat,
    style: CsvStyle,
    out_dir: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    export_series_with(series, format, style, out_dir, None)
}

pub fn export_series_with(
    series: &ChartSeries<'_>,
    format: ExportFormat,
    style: CsvStyle,
    out_dir: Option<&Path>,
    rasterizer: Option<&dyn Rasterizer>,
) -> anyhow::Result<PathBuf> {
    let bytes = encode(series, format, style, rasterizer)?;
    let name = safe_file_name(&export_file_name(
        series.kind,
        &series.x_column,
        &series.y_column,
        format,
    ));
    let path = io_utils::output_path(out_dir, &name);
    io_utils::write_bytes(&path, &bytes)?;
    Ok(path)
}
