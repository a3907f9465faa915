//! In-memory state: the catalog, the shopping list and the user's identity.
//!
//! The three stores are independent. The list holds copies of catalog items
//! joined back to the catalog by id only, so replacing the catalog never
//! touches the list.
//!
//! Only the list and the identity are persisted, as one [`PersistedState`]
//! blob.

mod catalog;
mod identity;
mod list;

pub use catalog::{CatalogEntry, CatalogStore, Columns, IngestionStatus};
pub use identity::IdentityStore;
pub use list::{generate_share_text, share_message, ListEntry, ListStore, SHARE_HEADING, SHARE_TITLE};

use serde::{Deserialize, Serialize};

/// Version written into every persisted blob.
pub const PERSISTED_STATE_VERSION: u32 = 1;

/// Serializable snapshot of the persisted stores.
///
/// `#[serde(default)]` lets older blobs missing a field still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub version: u32,
    pub list: Vec<ListEntry>,
    pub identity: IdentityStore,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: PERSISTED_STATE_VERSION,
            list: Vec::new(),
            identity: IdentityStore::default(),
        }
    }
}

impl PersistedState {
    pub fn capture(list: &ListStore, identity: &IdentityStore) -> Self {
        Self {
            version: PERSISTED_STATE_VERSION,
            list: list.entries().to_vec(),
            identity: identity.clone(),
        }
    }
}

/// A catalog row as shown to the user: the entry plus its quantity on the
/// list, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogRow<'a> {
    pub entry: &'a CatalogEntry,
    pub in_list: Option<u32>,
}

/// The filtered catalog annotated with list quantities.
pub fn catalog_rows<'a>(catalog: &'a CatalogStore, list: &ListStore) -> Vec<CatalogRow<'a>> {
    catalog
        .filtered_view()
        .into_iter()
        .map(|entry| CatalogRow {
            entry,
            in_list: list.quantity_of(&entry.id),
        })
        .collect()
}

/// List entries whose id no longer appears in the catalog.
pub fn orphaned_entries<'a>(catalog: &CatalogStore, list: &'a ListStore) -> Vec<&'a ListEntry> {
    list.entries()
        .iter()
        .filter(|e| catalog.find(&e.id).is_none())
        .collect()
}
