//! Workbook decoding: raw bytes to the cell grid of the first sheet.
//!
//! The container format is sniffed from the bytes themselves: a ZIP header
//! means `.xlsx`, an OLE compound document header means legacy `.xls`, and
//! anything else must be valid UTF-8 text to be read as CSV. The declared
//! [`FileKind`] is only used to report mismatches. Only the first sheet of a
//! workbook is read; other sheets are discarded.
//!
//! Decoding a large workbook can take a while, so [`decode_in_background`]
//! runs it on a worker thread tagged with a [`DecodeTicket`]. When a newer
//! decode starts before an older one finishes, the older result is dropped.

use std::io::{Cursor, Read, Seek};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use calamine::{Data, Range, Reader, Xls, Xlsx};
use encoding_rs::UTF_8;
use log::{debug, warn};
use thiserror::Error;

use crate::{data::CellValue, intake::FileKind};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
/// Name given to the single sheet of a CSV file.
pub const CSV_SHEET_NAME: &str = "Sheet1";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("File content is not a recognised spreadsheet (xlsx, xls, or UTF-8 csv)")]
    Unrecognized,
    #[error("Failed to read {format} content: {message}")]
    Malformed { format: FileKind, message: String },
    #[error("The first sheet contains no rows")]
    EmptySheet,
}

/// Rows of cells aligned by column index; row 0 holds the header labels.
/// Rows may be shorter than the header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grid {
    rows: Vec<Vec<CellValue>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn header(&self) -> &[CellValue] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn data_rows(&self) -> &[Vec<CellValue>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSheet {
    pub sheet_name: String,
    pub format: FileKind,
    pub grid: Grid,
}

/// Decodes `bytes` into the grid of the first sheet.
pub fn decode_workbook(
    bytes: &[u8],
    declared: Option<FileKind>,
) -> Result<DecodedSheet, DecodeError> {
    let format = sniff_format(bytes).ok_or(DecodeError::Unrecognized)?;
    if let Some(declared) = declared
        && declared != format
    {
        warn!("Content looks like {format} although the file was declared as {declared}");
    }
    let (sheet_name, grid) = match format {
        FileKind::Xlsx => {
            let mut workbook: Xlsx<_> =
                Xlsx::new(Cursor::new(bytes)).map_err(|err| malformed(format, err))?;
            let (name, range) = first_sheet(&mut workbook).map_err(|err| malformed(format, err))?;
            (name, grid_from_range(&range))
        }
        FileKind::Xls => {
            let mut workbook: Xls<_> =
                Xls::new(Cursor::new(bytes)).map_err(|err| malformed(format, err))?;
            let (name, range) = first_sheet(&mut workbook).map_err(|err| malformed(format, err))?;
            (name, grid_from_range(&range))
        }
        FileKind::Csv => (CSV_SHEET_NAME.to_string(), decode_csv(bytes)?),
    };
    if grid.is_empty() {
        return Err(DecodeError::EmptySheet);
    }
    debug!(
        "Decoded sheet '{sheet_name}' ({format}) with {} row(s)",
        grid.row_count()
    );
    Ok(DecodedSheet {
        sheet_name,
        format,
        grid,
    })
}

fn malformed(format: FileKind, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Malformed {
        format,
        message: err.to_string(),
    }
}

fn sniff_format(bytes: &[u8]) -> Option<FileKind> {
    if bytes.starts_with(ZIP_MAGIC) {
        return Some(FileKind::Xlsx);
    }
    if bytes.starts_with(CFB_MAGIC) {
        return Some(FileKind::Xls);
    }
    if bytes.contains(&0) {
        return None;
    }
    let (_, _, had_errors) = UTF_8.decode(bytes);
    (!had_errors).then_some(FileKind::Csv)
}

/// A workbook without sheets yields an empty range, which surfaces as
/// [`DecodeError::EmptySheet`].
fn first_sheet<RS, R>(workbook: &mut R) -> Result<(String, Range<Data>), R::Error>
where
    RS: Read + Seek,
    R: Reader<RS>,
{
    let Some(name) = workbook.sheet_names().first().cloned() else {
        return Ok((String::new(), Range::empty()));
    };
    let range = workbook.worksheet_range(&name)?;
    Ok((name, range))
}

fn grid_from_range(range: &Range<Data>) -> Grid {
    let rows = range
        .rows()
        .map(|row| {
            let mut cells = row.iter().map(cell_from_data).collect::<Vec<_>>();
            while cells.last().is_some_and(CellValue::is_absent) {
                cells.pop();
            }
            cells
        })
        .collect();
    Grid::new(rows)
}

fn cell_from_data(value: &Data) -> CellValue {
    match value {
        Data::Empty => CellValue::Absent,
        Data::Int(v) => CellValue::Number(*v as f64),
        Data::Float(v) => CellValue::Number(*v),
        Data::DateTime(v) => CellValue::Number(v.as_f64()),
        Data::String(v) => CellValue::Text(v.clone()),
        Data::Bool(v) => CellValue::Text(if *v { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTimeIso(v) | Data::DurationIso(v) => CellValue::Text(v.clone()),
        Data::Error(err) => CellValue::Text(err.to_string()),
    }
}

fn decode_csv(bytes: &[u8]) -> Result<Grid, DecodeError> {
    let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
    if had_errors {
        return Err(DecodeError::Unrecognized);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|err| DecodeError::Malformed {
            format: FileKind::Csv,
            message: format!("row {}: {err}", idx + 1),
        })?;
        rows.push(record.iter().map(cell_from_csv_field).collect());
    }
    Ok(Grid::new(rows))
}

fn cell_from_csv_field(field: &str) -> CellValue {
    if field.is_empty() {
        return CellValue::Absent;
    }
    match field.trim().parse::<f64>() {
        Ok(number) if number.is_finite() => CellValue::Number(number),
        _ => CellValue::Text(field.to_string()),
    }
}

/// Generation counter shared by all decodes of one session.
#[derive(Debug, Clone, Default)]
pub struct DecodeGeneration {
    current: Arc<AtomicU64>,
}

impl DecodeGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request; every earlier ticket becomes stale.
    pub fn begin(&self) -> DecodeTicket {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        DecodeTicket {
            generation,
            current: Arc::clone(&self.current),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodeTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl DecodeTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// Decodes on a worker thread. The handle yields `None` when a newer request
/// was started before this one completed.
pub fn decode_in_background(
    bytes: Vec<u8>,
    declared: Option<FileKind>,
    ticket: DecodeTicket,
) -> JoinHandle<Option<Result<DecodedSheet, DecodeError>>> {
    thread::spawn(move || {
        let result = decode_workbook(&bytes, declared);
        if ticket.is_current() {
            Some(result)
        } else {
            warn!(
                "Discarding decode result for superseded request #{}",
                ticket.generation()
            );
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_fields_become_typed_cells() {
        let sheet = decode_workbook(b"name,score\nAda,42\nBob,\n", Some(FileKind::Csv)).unwrap();
        assert_eq!(sheet.sheet_name, CSV_SHEET_NAME);
        assert_eq!(sheet.format, FileKind::Csv);
        assert_eq!(sheet.grid.row_count(), 3);
        assert_eq!(
            sheet.grid.data_rows()[0],
            vec![CellValue::from("Ada"), CellValue::Number(42.0)]
        );
        assert_eq!(
            sheet.grid.data_rows()[1],
            vec![CellValue::from("Bob"), CellValue::Absent]
        );
    }

    #[test]
    fn workbook_decodes_only_its_first_sheet() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let first = workbook.add_worksheet();
        first.set_name("Totals").unwrap();
        first.write_string(0, 0, "first").unwrap();
        first.write_number(1, 0, 1.0).unwrap();
        let second = workbook.add_worksheet();
        second.set_name("Scratch").unwrap();
        second.write_string(0, 0, "second").unwrap();
        second.write_number(1, 0, 2.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = decode_workbook(&bytes, Some(FileKind::Xlsx)).unwrap();
        assert_eq!(sheet.format, FileKind::Xlsx);
        assert_eq!(sheet.sheet_name, "Totals");
        assert_eq!(sheet.grid.header().to_vec(), vec![CellValue::from("first")]);
        assert_eq!(sheet.grid.data_rows().to_vec(), vec![vec![CellValue::Number(1.0)]]);
        let second_seen = sheet
            .grid
            .data_rows()
            .iter()
            .flatten()
            .chain(sheet.grid.header())
            .any(|cell| *cell == CellValue::from("second"));
        assert!(!second_seen);
    }

    #[test]
    fn csv_accepts_jagged_rows_and_bom() {
        let sheet = decode_workbook("\u{feff}a,b,c\n1\n".as_bytes(), None).unwrap();
        assert_eq!(sheet.grid.header().len(), 3);
        assert_eq!(sheet.grid.header()[0], CellValue::from("a"));
        assert_eq!(sheet.grid.data_rows()[0], vec![CellValue::Number(1.0)]);
    }

    #[test]
    fn non_finite_csv_text_stays_text() {
        assert_eq!(cell_from_csv_field("inf"), CellValue::from("inf"));
        assert_eq!(cell_from_csv_field("NaN"), CellValue::from("NaN"));
        assert_eq!(cell_from_csv_field(" 7 "), CellValue::Number(7.0));
    }

    #[test]
    fn empty_input_is_an_empty_sheet() {
        assert!(matches!(
            decode_workbook(b"", Some(FileKind::Csv)),
            Err(DecodeError::EmptySheet)
        ));
    }

    #[test]
    fn binary_garbage_is_unrecognized() {
        let bytes = [0x00, 0x01, 0xFF, 0xFE, 0x10];
        assert!(matches!(
            decode_workbook(&bytes, Some(FileKind::Xlsx)),
            Err(DecodeError::Unrecognized)
        ));
    }

    #[test]
    fn truncated_zip_is_malformed_xlsx() {
        let bytes = b"PK\x03\x04not really a zip archive";
        assert!(matches!(
            decode_workbook(bytes, Some(FileKind::Xlsx)),
            Err(DecodeError::Malformed {
                format: FileKind::Xlsx,
                ..
            })
        ));
    }

    #[test]
    fn superseded_background_decode_is_discarded() {
        let generation = DecodeGeneration::new();
        let first = generation.begin();
        let second = generation.begin();
        assert!(!first.is_current());
        assert!(second.is_current());

        let stale = decode_in_background(b"a\n1\n".to_vec(), None, first)
            .join()
            .unwrap();
        assert!(stale.is_none());

        let fresh = decode_in_background(b"a\n1\n".to_vec(), None, second)
            .join()
            .unwrap();
        assert!(matches!(fresh, Some(Ok(_))));
    }
}
