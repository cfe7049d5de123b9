use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::{
    decode::{self, DecodeError, DecodedSheet},
    intake::{self, FileKind},
    normalize::Dataset,
};

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

/// A file that passed the type gate, with its bytes in memory.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub name: String,
    pub kind: FileKind,
    pub bytes: Vec<u8>,
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

pub fn read_input(path: &Path, mime: Option<&str>) -> Result<LoadedInput> {
    if is_dash(path) && mime.is_none() {
        return Err(anyhow!("Reading from stdin requires --mime to identify the file type"));
    }
    let name = file_name(path);
    let kind = intake::detect_file_kind(&name, mime)?;
    let bytes = if is_dash(path) {
        let mut buffer = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .context("Reading spreadsheet bytes from stdin")?;
        buffer
    } else {
        fs::read(path).with_context(|| format!("Opening input file {path:?}"))?
    };
    intake::check_soft_size(&name, bytes.len() as u64);
    Ok(LoadedInput { name, kind, bytes })
}

/// Converts a decode outcome into a dataset, treating an empty sheet as an
/// empty dataset.
pub fn dataset_from_decode(
    name: &str,
    outcome: Result<DecodedSheet, DecodeError>,
) -> Result<Dataset> {
    match outcome {
        Ok(sheet) => {
            let dataset = Dataset::from_grid(&sheet.grid);
            info!(
                "Loaded {} row(s) across {} column(s) from sheet '{}' of '{name}'",
                dataset.row_count(),
                dataset.column_count(),
                sheet.sheet_name
            );
            Ok(dataset)
        }
        Err(DecodeError::EmptySheet) => {
            warn!("'{name}' has an empty first sheet; continuing with no columns");
            Ok(Dataset::empty())
        }
        Err(err) => Err(err).with_context(|| format!("Failed to analyze '{name}'")),
    }
}

pub fn load_dataset(path: &Path, mime: Option<&str>) -> Result<Dataset> {
    let input = read_input(path, mime)?;
    let outcome = decode::decode_workbook(&input.bytes, Some(input.kind));
    dataset_from_decode(&input.name, outcome)
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    file.write_all(bytes)
        .with_context(|| format!("Writing output file {path:?}"))?;
    file.flush()?;
    Ok(())
}

pub fn output_path(dir: Option<&Path>, name: &str) -> PathBuf {
    match dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
