//! Catalog ingestion from a spreadsheet range.
//!
//! - [`client`] - the [`GridSource`] seam and the reqwest-backed [`SheetsClient`]
//! - [`normalize`] - header-driven conversion of the raw grid into [`Record`]s
//!
//! [`ingest`] glues the two together; the app spawns it and applies the result
//! to the catalog.

mod client;
mod normalize;

pub use client::{GridSource, IngestionError, SheetsClient, API_KEY_ENV};
pub use normalize::{normalize, Cell, Field, Record};

/// Fetch the raw grid from `source` and normalize it.
pub async fn ingest<S: GridSource>(source: &S) -> Result<Vec<Record>, IngestionError> {
    let grid = source.fetch_grid().await?;
    let records = normalize(&grid);
    tracing::debug!(rows = grid.len(), records = records.len(), "Normalized sheet grid");
    Ok(records)
}
