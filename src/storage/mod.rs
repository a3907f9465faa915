//! SQLite-backed persistence.
//!
//! The database is a plain key-value blob store. The app keeps its persisted
//! state as a single JSON blob; the catalog is always re-fetched and never
//! stored.

mod blobs;
mod schema;
mod types;

pub use schema::Database;
pub use types::DatabaseError;
