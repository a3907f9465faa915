//! The user's display name, persisted alongside the list.

use serde::{Deserialize, Serialize};

/// The user's display name. Absent until first set.
///
/// Blank names are not rejected here; callers are expected to refuse them
/// before calling [`IdentityStore::set_name`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityStore {
    #[serde(default)]
    display_name: Option<String>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&mut self, name: &str) {
        self.display_name = Some(name.trim().to_string());
    }

    pub fn name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn has_name(&self) -> bool {
        self.display_name.is_some()
    }
}
