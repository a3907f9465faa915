//! The shopping list: catalog items with quantities, merged by id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::catalog::CatalogEntry;

/// Heading placed above the share text in the share payload.
pub const SHARE_HEADING: &str = "List of things we need at store:";

/// Title offered to the share target alongside the payload.
pub const SHARE_TITLE: &str = "My Grocery List";

/// A catalog item on the list. `quantity` is always at least 1.
///
/// Entries are copies of the catalog item taken when first added, so they
/// outlive the item disappearing from a later catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
    pub quantity: u32,
}

impl ListEntry {
    fn from_catalog(item: &CatalogEntry) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            extra: item.extra.clone(),
            quantity: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListStore {
    entries: Vec<ListEntry>,
}

impl ListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, folding duplicate ids into the first
    /// occurrence and lifting zero quantities to 1.
    pub fn from_entries(entries: Vec<ListEntry>) -> Self {
        let mut store = Self::new();
        for mut entry in entries {
            entry.quantity = entry.quantity.max(1);
            match store.entry_mut(&entry.id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(entry.quantity)
                }
                None => store.entries.push(entry),
            }
        }
        store
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut ListEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Add one of `item`. A repeat add bumps the existing entry in place.
    pub fn add_to_list(&mut self, item: &CatalogEntry) {
        match self.entry_mut(&item.id) {
            Some(entry) => entry.quantity = entry.quantity.saturating_add(1),
            None => self.entries.push(ListEntry::from_catalog(item)),
        }
    }

    pub fn increment_quantity(&mut self, id: &str) {
        if let Some(entry) = self.entry_mut(id) {
            entry.quantity = entry.quantity.saturating_add(1);
        }
    }

    /// Never goes below 1; removal is a separate operation.
    pub fn decrement_quantity(&mut self, id: &str) {
        if let Some(entry) = self.entry_mut(id) {
            entry.quantity = entry.quantity.saturating_sub(1).max(1);
        }
    }

    pub fn remove_from_list(&mut self, id: &str) {
        self.entries.retain(|e| e.id != id);
    }

    pub fn clear_list(&mut self) {
        self.entries.clear();
    }

    /// Distinct items on the list, regardless of quantity.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn quantity_of(&self, id: &str) -> Option<u32> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.quantity)
    }
}

/// Numbered list lines, `"<n>.) <name> — <quantity>"`, one per entry.
pub fn generate_share_text(entries: &[ListEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(idx, e)| format!("{}.) {} — {}", idx + 1, e.name, e.quantity))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The full payload handed to the share target.
pub fn share_message(entries: &[ListEntry]) -> String {
    format!("{}\n\n{}", SHARE_HEADING, generate_share_text(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn milk() -> CatalogEntry {
        CatalogEntry::new("1", "Milk")
    }

    fn eggs() -> CatalogEntry {
        CatalogEntry::new("2", "Eggs")
    }

    #[test]
    fn test_add_twice_merges() {
        let mut list = ListStore::new();
        list.add_to_list(&milk());
        list.add_to_list(&milk());
        assert_eq!(list.count(), 1);
        assert_eq!(list.entries()[0].quantity, 2);
        assert_eq!(generate_share_text(list.entries()), "1.) Milk — 2");
    }

    #[test]
    fn test_merge_is_by_id_not_name() {
        let mut list = ListStore::new();
        list.add_to_list(&CatalogEntry::new("1", "Milk"));
        list.add_to_list(&CatalogEntry::new("1", "Whole Milk"));
        list.add_to_list(&CatalogEntry::new("3", "Milk"));
        assert_eq!(list.count(), 2);
        assert_eq!(list.entries()[0].name, "Milk");
        assert_eq!(list.quantity_of("1"), Some(2));
        assert_eq!(list.quantity_of("3"), Some(1));
    }

    #[test]
    fn test_repeat_add_keeps_position() {
        let mut list = ListStore::new();
        list.add_to_list(&milk());
        list.add_to_list(&eggs());
        list.add_to_list(&milk());
        let ids: Vec<_> = list.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_increment_and_decrement() {
        let mut list = ListStore::new();
        list.add_to_list(&milk());
        list.increment_quantity("1");
        list.increment_quantity("1");
        assert_eq!(list.quantity_of("1"), Some(3));
        list.decrement_quantity("1");
        assert_eq!(list.quantity_of("1"), Some(2));
    }

    #[test]
    fn test_decrement_stops_at_one() {
        let mut list = ListStore::new();
        list.add_to_list(&milk());
        list.decrement_quantity("1");
        list.decrement_quantity("1");
        assert_eq!(list.quantity_of("1"), Some(1));
        assert_eq!(list.count(), 1);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let mut list = ListStore::new();
        list.add_to_list(&milk());
        let before = list.clone();
        list.increment_quantity("missing-id");
        list.decrement_quantity("missing-id");
        list.remove_from_list("missing-id");
        assert_eq!(list, before);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut list = ListStore::new();
        list.add_to_list(&milk());
        list.add_to_list(&eggs());
        list.remove_from_list("1");
        assert_eq!(list.count(), 1);
        assert_eq!(list.entries()[0].id, "2");
        list.clear_list();
        assert_eq!(list.count(), 0);
        list.clear_list();
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn test_count_ignores_quantities() {
        let mut list = ListStore::new();
        for _ in 0..5 {
            list.add_to_list(&milk());
        }
        list.add_to_list(&eggs());
        assert_eq!(list.count(), 2);
    }

    #[test]
    fn test_share_text_order_and_format() {
        let mut list = ListStore::new();
        list.add_to_list(&eggs());
        list.add_to_list(&milk());
        list.increment_quantity("1");
        assert_eq!(generate_share_text(list.entries()), "1.) Eggs — 1\n2.) Milk — 2");
    }

    #[test]
    fn test_share_text_empty() {
        assert_eq!(generate_share_text(&[]), "");
    }

    #[test]
    fn test_share_message_embeds_preview_text() {
        let mut list = ListStore::new();
        list.add_to_list(&milk());
        let preview = generate_share_text(list.entries());
        let message = share_message(list.entries());
        assert_eq!(message, format!("List of things we need at store:\n\n{preview}"));
        assert_eq!(generate_share_text(list.entries()), preview);
    }

    #[test]
    fn test_from_entries_folds_duplicates() {
        let entry = |id: &str, quantity| ListEntry {
            id: id.to_string(),
            name: format!("item {id}"),
            extra: Map::new(),
            quantity,
        };
        let list = ListStore::from_entries(vec![entry("1", 2), entry("2", 0), entry("1", 3)]);
        assert_eq!(list.count(), 2);
        assert_eq!(list.quantity_of("1"), Some(5));
        assert_eq!(list.quantity_of("2"), Some(1));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Inc(u8),
        Dec(u8),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6).prop_map(Op::Add),
            (0u8..6).prop_map(Op::Inc),
            (0u8..6).prop_map(Op::Dec),
            (0u8..6).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_quantities_stay_positive_and_ids_unique(ops in proptest::collection::vec(op_strategy(), 0..60)) {
            let mut list = ListStore::new();
            for op in ops {
                match op {
                    Op::Add(n) => list.add_to_list(&CatalogEntry::new(n.to_string(), format!("item {n}"))),
                    Op::Inc(n) => list.increment_quantity(&n.to_string()),
                    Op::Dec(n) => list.decrement_quantity(&n.to_string()),
                    Op::Remove(n) => list.remove_from_list(&n.to_string()),
                }
            }

            let mut ids: Vec<&str> = list.entries().iter().map(|e| e.id.as_str()).collect();
            prop_assert!(list.entries().iter().all(|e| e.quantity >= 1));
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), list.count());
        }

        #[test]
        fn prop_decrement_never_below_one(start in 1u32..20, decrements in 0usize..40) {
            let mut list = ListStore::new();
            list.add_to_list(&CatalogEntry::new("x", "X"));
            for _ in 1..start {
                list.increment_quantity("x");
            }
            for _ in 0..decrements {
                list.decrement_quantity("x");
            }
            prop_assert_eq!(list.quantity_of("x"), Some(start.saturating_sub(decrements as u32).max(1)));
        }
    }
}
