//! grocer: a grocery list assembled from a shared spreadsheet catalog.
//!
//! - [`sheets`] - fetching the raw grid and normalizing it into records
//! - [`state`] - the catalog, list and identity stores and their derived views
//! - [`storage`] - the SQLite blob store holding the persisted list and name
//! - [`app`] - ties the stores to ingestion and persistence
//! - [`config`] - `config.toml` parsing

pub mod app;
pub mod config;
pub mod sheets;
pub mod state;
pub mod storage;
pub mod util;
