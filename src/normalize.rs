use std::sync::Arc;

use serde::Serialize;

use crate::{
    data::{CellValue, ColumnIndex, Record},
    decode::Grid,
};

/// Identifier used for header cells that hold no value.
const EMPTY_HEADER: &str = "__EMPTY";

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    /// The dataset used downstream when the decoded sheet had no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Row 0 names the columns. Short rows read as absent past their end and
    /// cells past the header width are ignored. A repeated name keeps its
    /// first position; the last cell with that name holds the value.
    pub fn from_grid(grid: &Grid) -> Self {
        let identifiers = header_identifiers(grid.header());
        let index = Arc::new(ColumnIndex::new(identifiers.iter().cloned()));
        let slots = identifiers
            .iter()
            .filter_map(|identifier| index.position(identifier))
            .collect::<Vec<_>>();
        let records = grid
            .data_rows()
            .iter()
            .map(|row| build_record(&index, &slots, row))
            .collect();
        Self {
            columns: index.names().to_vec(),
            records,
        }
    }

    /// Builds a dataset from rows that already carry their keys. Keys are
    /// trimmed, and the column order is the key order of the first record.
    pub fn from_keyed_rows<I, K>(rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<(K, CellValue)>>,
        K: AsRef<str>,
    {
        let records = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(key, value)| (key.as_ref().trim().to_string(), value))
                    .collect::<Record>()
            })
            .collect::<Vec<_>>();
        let columns = records
            .first()
            .map(|record| record.keys().map(str::to_string).collect())
            .unwrap_or_default();
        Self { columns, records }
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    /// The first `limit` records, used for previews and stored samples.
    pub fn sample(&self, limit: usize) -> &[Record] {
        &self.records[..self.records.len().min(limit)]
    }
}

/// Column identifier for each header index, duplicates included.
pub fn header_identifiers(header: &[CellValue]) -> Vec<String> {
    let mut empty_seen = 0usize;
    header
        .iter()
        .map(|cell| match cell {
            CellValue::Absent => {
                let name = if empty_seen == 0 {
                    EMPTY_HEADER.to_string()
                } else {
                    format!("{EMPTY_HEADER}_{empty_seen}")
                };
                empty_seen += 1;
                name
            }
            other => other.as_display().trim().to_string(),
        })
        .collect()
}

/// `slots[i]` is the record position header cell `i` writes to.
fn build_record(index: &Arc<ColumnIndex>, slots: &[usize], row: &[CellValue]) -> Record {
    let mut values = vec![CellValue::Absent; index.len()];
    for (cell, slot) in row.iter().zip(slots) {
        values[*slot] = cell.clone();
    }
    Record::from_values(Arc::clone(index), values)
}
