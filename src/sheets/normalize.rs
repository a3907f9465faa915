//! Header-driven grid normalization.
//!
//! A Sheets `values` range arrives as rows of untyped cells with the field
//! names in the first row. [`normalize`] turns that grid into ordered
//! [`Record`]s; typing the records is left to the catalog.

use serde_json::Value;

/// A single spreadsheet cell as delivered by the API.
pub type Cell = Value;

/// A record field: either a cell from the row, or an explicit marker for a
/// column the row was too short to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Missing,
    Value(Cell),
}

impl Field {
    pub fn as_value(&self) -> Option<&Cell> {
        match self {
            Field::Missing => None,
            Field::Value(v) => Some(v),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }
}

/// One normalized row: field names in header order.
///
/// Assigning a name that already exists replaces its value but keeps its
/// original position, so a duplicated header resolves to the later column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Field)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Stringify a header cell: strings verbatim, everything else as JSON text.
fn header_name(cell: &Cell) -> String {
    match cell {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Convert a raw grid into records keyed by the trimmed header row.
///
/// - no rows: no records
/// - a lone row: passed through as one record keyed by column position, since
///   there is no data row to attach the headers to
/// - otherwise: one record per data row; short rows get [`Field::Missing`]
///   for the absent trailing columns, surplus cells are dropped
pub fn normalize(grid: &[Vec<Cell>]) -> Vec<Record> {
    match grid {
        [] => Vec::new(),
        [only] => {
            let mut record = Record::new();
            for (idx, cell) in only.iter().enumerate() {
                record.set(idx.to_string(), Field::Value(cell.clone()));
            }
            vec![record]
        }
        [header, rows @ ..] => {
            let headers: Vec<String> = header.iter().map(header_name).collect();
            rows.iter()
                .map(|row| {
                    let mut record = Record::new();
                    for (idx, name) in headers.iter().enumerate() {
                        let field = match row.get(idx) {
                            Some(cell) => Field::Value(cell.clone()),
                            None => Field::Missing,
                        };
                        record.set(name.clone(), field);
                    }
                    record
                })
                .collect()
        }
    }
}
