//! Cell values and keyed records.
//!
//! A [`CellValue`] is one of absent, text, or number. Absent is distinct from
//! an empty string or zero: it is what a short row, an empty workbook cell, or
//! an empty CSV field decodes to.
//!
//! A [`Record`] holds one data row by position against a shared
//! [`ColumnIndex`], so lookups by column name stay constant time however wide
//! the sheet is. Keys keep the position of their first insertion; inserting
//! an existing key again overwrites the value in place (last write wins).

use std::{collections::HashMap, fmt, sync::Arc};

use itertools::Itertools;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Largest integer magnitude an `f64` represents exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Absent,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, CellValue::Absent)
    }

    pub fn is_defined(&self) -> bool {
        !self.is_absent()
    }

    pub fn as_display(&self) -> String {
        match self {
            CellValue::Absent => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
        }
    }

    /// Identity used for distinct-value counting. Numbers and text never
    /// collide, so `42` and `"42"` count as two values.
    pub fn distinct_key(&self) -> Option<String> {
        match self {
            CellValue::Absent => None,
            CellValue::Text(s) => Some(format!("t:{s}")),
            CellValue::Number(n) => Some(format!("n:{}", format_number(*n))),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl Serialize for CellValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CellValue::Absent => serializer.serialize_none(),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Number(n) => match integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
        }
    }
}

fn integral(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
        Some(value as i64)
    } else {
        None
    }
}

/// Renders a number the way spreadsheet front ends print it: integral values
/// without a fractional part, everything else in shortest round-trip form.
pub fn format_number(value: f64) -> String {
    match integral(value) {
        Some(i) => i.to_string(),
        None if value.is_nan() => "NaN".to_string(),
        None if value.is_infinite() => {
            if value > 0.0 {
                "Infinity".to_string()
            } else {
                "-Infinity".to_string()
            }
        }
        None => value.to_string(),
    }
}

/// Column identifiers in order, with a lookup from name to position.
/// Records decoded from one sheet share a single index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Repeated names keep the position of their first occurrence.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::default();
        for name in names.into_iter().map(Into::into).unique() {
            index.push(name);
        }
        index
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn push(&mut self, name: String) -> usize {
        let position = self.names.len();
        self.positions.insert(name.clone(), position);
        self.names.push(name);
        position
    }
}

static ABSENT: CellValue = CellValue::Absent;

/// Values laid out by position against a [`ColumnIndex`].
#[derive(Debug, Clone, Default)]
pub struct Record {
    index: Arc<ColumnIndex>,
    values: Vec<CellValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record over `index`; `values` is padded with absent cells or cut
    /// to the index width.
    pub fn from_values(index: Arc<ColumnIndex>, mut values: Vec<CellValue>) -> Self {
        values.resize(index.len(), CellValue::Absent);
        Self { index, values }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: CellValue) {
        let key = key.into();
        match self.index.position(&key) {
            Some(position) => self.values[position] = value,
            None => {
                Arc::make_mut(&mut self.index).push(key);
                self.values.push(value);
            }
        }
    }

    /// Returns the value under `column`; a missing key reads as absent.
    pub fn get(&self, column: &str) -> &CellValue {
        self.index
            .position(column)
            .map_or(&ABSENT, |position| self.value_at(position))
    }

    pub fn value_at(&self, position: usize) -> &CellValue {
        self.values.get(position).unwrap_or(&ABSENT)
    }

    pub fn index(&self) -> &Arc<ColumnIndex> {
        &self.index
    }

    pub fn shares_index(&self, index: &Arc<ColumnIndex>) -> bool {
        Arc::ptr_eq(&self.index, index)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.index.position(column).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.names().iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.keys().zip(&self.values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
            && (self.shares_index(&other.index) || self.index.names == other.index.names)
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, CellValue)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_drops_integral_fraction() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn distinct_key_separates_numbers_from_text() {
        let number = CellValue::Number(42.0).distinct_key();
        let text = CellValue::from("42").distinct_key();
        assert_ne!(number, text);
        assert_eq!(CellValue::Absent.distinct_key(), None);
    }

    #[test]
    fn record_insert_keeps_first_position_and_last_value() {
        let mut record = Record::new();
        record.insert("a", CellValue::from("first"));
        record.insert("b", CellValue::Number(1.0));
        record.insert("a", CellValue::from("second"));

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.get("a"), &CellValue::from("second"));
        assert!(record.get("missing").is_absent());
    }

    #[test]
    fn records_over_one_index_share_it() {
        let index = Arc::new(ColumnIndex::new(["id", "name", "id"]));
        assert_eq!(index.names(), ["id", "name"]);

        let short = Record::from_values(Arc::clone(&index), vec![CellValue::Number(1.0)]);
        let long = Record::from_values(
            Arc::clone(&index),
            vec![CellValue::Number(2.0), "Bo".into(), "extra".into()],
        );
        assert!(short.shares_index(&index) && long.shares_index(&index));
        assert_eq!(short.len(), 2);
        assert!(short.get("name").is_absent());
        assert_eq!(long.len(), 2);
        assert_eq!(long.get("name"), &CellValue::from("Bo"));
        assert_eq!(long.value_at(5), &CellValue::Absent);
    }

    #[test]
    fn inserting_a_new_key_detaches_from_the_shared_index() {
        let index = Arc::new(ColumnIndex::new(["a"]));
        let mut record = Record::from_values(Arc::clone(&index), vec![CellValue::Number(1.0)]);
        record.insert("b", CellValue::Number(2.0));
        assert!(!record.shares_index(&index));
        assert_eq!(index.len(), 1);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn record_serializes_in_insertion_order() {
        let record: Record = vec![
            ("z", CellValue::Number(2.0)),
            ("a", CellValue::Absent),
            ("m", CellValue::Number(0.25)),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"z":2,"a":null,"m":0.25}"#);
    }
}
