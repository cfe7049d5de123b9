use std::fmt;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_CSV: &str = "text/csv";

/// Documented upload guidance. Larger files are accepted with a warning.
pub const SOFT_SIZE_LIMIT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error(
        "Unsupported file type for '{name}'. Please upload a valid Excel (.xlsx, .xls) or CSV file"
    )]
    UnsupportedFileType { name: String, mime: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Xlsx,
    Xls,
    Csv,
}

impl FileKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            FileKind::Xlsx => MIME_XLSX,
            FileKind::Xls => MIME_XLS,
            FileKind::Csv => MIME_CSV,
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" => Some(FileKind::Xlsx),
            "xls" => Some(FileKind::Xls),
            "csv" => Some(FileKind::Csv),
            _ => None,
        }
    }

    fn from_mime(mime: &str) -> Option<Self> {
        // Browsers append parameters such as `;charset=utf-8`.
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            MIME_XLSX => Some(FileKind::Xlsx),
            MIME_XLS => Some(FileKind::Xls),
            MIME_CSV => Some(FileKind::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileKind::Xlsx => "xlsx",
            FileKind::Xls => "xls",
            FileKind::Csv => "csv",
        };
        f.write_str(label)
    }
}

/// Classifies a file by name and optional MIME type. The extension wins when
/// both are recognised.
pub fn detect_file_kind(name: &str, mime: Option<&str>) -> Result<FileKind, IntakeError> {
    let by_extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(FileKind::from_extension);
    by_extension
        .or_else(|| mime.and_then(FileKind::from_mime))
        .ok_or_else(|| IntakeError::UnsupportedFileType {
            name: name.to_string(),
            mime: mime.map(str::to_string),
        })
}

/// Logs a warning when `size` exceeds the soft upload limit. Never rejects.
pub fn check_soft_size(name: &str, size: u64) -> bool {
    let within = size <= SOFT_SIZE_LIMIT_BYTES;
    if !within {
        warn!(
            "'{name}' is {size} bytes, above the recommended {} byte limit",
            SOFT_SIZE_LIMIT_BYTES
        );
    }
    within
}
