//! Catalog store: the typed items from the latest ingestion, the ingestion
//! status and the search query, plus the filtered projection over them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sheets::{Field, Record};

/// A purchasable item.
///
/// Fields other than the id and name columns are kept in `extra` with short
/// rows' absent columns as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// Which record fields become `id` and `name`.
#[derive(Debug, Clone)]
pub struct Columns {
    pub id: String,
    pub name: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            id: "Id".to_string(),
            name: "GroceryItem".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IngestionStatus {
    #[default]
    Idle,
    Loading,
    Error(String),
}

impl IngestionStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, IngestionStatus::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            IngestionStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct CatalogStore {
    items: Vec<CatalogEntry>,
    status: IngestionStatus,
    search_query: String,
    last_synced: Option<DateTime<Utc>>,
}

/// Text of an id/name field. Absent or null becomes empty; non-string
/// scalars use their JSON text.
fn field_text(field: Option<&Field>) -> String {
    match field.and_then(Field::as_value) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn to_entry(record: &Record, columns: &Columns) -> CatalogEntry {
    let id = field_text(record.get(&columns.id));
    let name = field_text(record.get(&columns.name));

    let extra = record
        .iter()
        .filter(|(n, _)| *n != columns.id && *n != columns.name)
        .map(|(n, f)| (n.to_string(), f.as_value().cloned().unwrap_or(Value::Null)))
        .collect();

    CatalogEntry { id, name, extra }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CatalogEntry] {
        &self.items
    }

    pub fn status(&self) -> &IngestionStatus {
        &self.status
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    /// Replace the whole catalog with `records`, one entry per record in
    /// order. Records without an id or name are kept with empty strings.
    pub fn replace_items(&mut self, records: &[Record], columns: &Columns) {
        self.items = records.iter().map(|r| to_entry(r, columns)).collect();
        self.status = IngestionStatus::Idle;

        let unnamed = self
            .items
            .iter()
            .filter(|e| e.id.is_empty() || e.name.is_empty())
            .count();
        if unnamed > 0 {
            tracing::debug!(count = unnamed, "Catalog entries missing id or name, defaulted to empty");
        }
    }

    pub fn set_status(&mut self, status: IngestionStatus) {
        self.status = status;
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn clear_search_query(&mut self) {
        self.search_query.clear();
    }

    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.last_synced = Some(at);
    }

    pub fn find(&self, id: &str) -> Option<&CatalogEntry> {
        self.items.iter().find(|e| e.id == id)
    }

    /// Items whose name contains the search query, case-insensitively.
    /// A blank query returns every item.
    pub fn filtered_view(&self) -> Vec<&CatalogEntry> {
        let query = self.search_query.trim().to_lowercase();
        if query.is_empty() {
            return self.items.iter().collect();
        }
        self.items
            .iter()
            .filter(|e| e.name.to_lowercase().contains(&query))
            .collect()
    }
}
