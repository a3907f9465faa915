use crate::sheets::{self, GridSource, IngestionError, Record};
use crate::state::{
    CatalogEntry, CatalogStore, Columns, IdentityStore, IngestionStatus, ListStore,
    PersistedState,
};
use crate::storage::Database;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Key of the persisted list + identity blob.
pub const STATE_KEY: &str = "grocer.state";

/// Events from background tasks
pub enum AppEvent {
    /// A catalog ingestion finished.
    ///
    /// Fields:
    /// - `generation`: The ingestion generation when this fetch was spawned
    /// - `result`: The normalized records, or the error that stopped the fetch
    CatalogLoaded {
        generation: u64,
        result: Result<Vec<Record>, IngestionError>,
    },
}

// ============================================================================
// App
// ============================================================================

/// Application state: the three stores plus the plumbing that feeds and
/// persists them.
///
/// The stores are read through accessors. Every list and identity mutation
/// goes through an `App` method that saves afterwards:
///
/// ```compile_fail
/// # async fn bypass(app: &mut grocer::app::App) {
/// app.list.clear_list();
/// # }
/// ```
pub struct App {
    catalog: CatalogStore,
    list: ListStore,
    identity: IdentityStore,

    db: Database,
    columns: Columns,

    /// Set once persisted state has been loaded. Until then mutations are
    /// kept in memory only, so startup defaults can't overwrite saved state.
    hydrated: bool,

    /// Generation counter for catalog ingestion.
    ///
    /// Each ingestion carries the generation it was started with; a result
    /// is applied only if it still matches, so a slow stale fetch can't
    /// overwrite a newer catalog.
    ingestion_generation: u64,

    /// Handle to the in-flight ingestion task, aborted when a new one starts.
    ingestion_handle: Option<JoinHandle<()>>,
}

impl App {
    pub fn new(db: Database, columns: Columns) -> Self {
        Self {
            catalog: CatalogStore::new(),
            list: ListStore::new(),
            identity: IdentityStore::new(),
            db,
            columns,
            hydrated: false,
            ingestion_generation: 0,
            ingestion_handle: None,
        }
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn list(&self) -> &ListStore {
        &self.list
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn ingestion_generation(&self) -> u64 {
        self.ingestion_generation
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Restore the persisted list and identity. Runs once; later calls are
    /// no-ops.
    ///
    /// A blob that no longer parses is logged and discarded rather than
    /// failing startup. A database error leaves the app unhydrated.
    pub async fn hydrate(&mut self) -> Result<()> {
        if self.hydrated {
            return Ok(());
        }

        let blob = self
            .db
            .load_blob(STATE_KEY)
            .await
            .context("Failed to load persisted state")?;

        if let Some(blob) = blob {
            match serde_json::from_str::<PersistedState>(&blob) {
                Ok(state) => {
                    tracing::debug!(
                        version = state.version,
                        entries = state.list.len(),
                        has_name = state.identity.has_name(),
                        "Restored persisted state"
                    );
                    self.list = ListStore::from_entries(state.list);
                    self.identity = state.identity;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Persisted state is unreadable, starting fresh");
                }
            }
        }

        self.hydrated = true;
        Ok(())
    }

    /// Write the list and identity back. Failures are logged; the in-memory
    /// mutation stands either way.
    async fn persist(&self) {
        if !self.hydrated {
            tracing::debug!("Skipping state save before hydration");
            return;
        }

        let state = PersistedState::capture(&self.list, &self.identity);
        let blob = match serde_json::to_string(&state) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize state");
                return;
            }
        };

        if let Err(e) = self.db.save_blob(STATE_KEY, &blob).await {
            tracing::warn!(error = %e, "Failed to persist state");
        }
    }

    // ========================================================================
    // List and Identity Mutations
    // ========================================================================

    /// Add one of `item`, whether or not it is in the current catalog.
    pub async fn add_item(&mut self, item: &CatalogEntry) {
        self.list.add_to_list(item);
        self.persist().await;
    }

    /// Add the catalog item with `id`. Returns false when the current catalog
    /// has no such item.
    pub async fn add_by_id(&mut self, id: &str) -> bool {
        let Some(item) = self.catalog.find(id).cloned() else {
            return false;
        };
        self.add_item(&item).await;
        true
    }

    pub async fn increment_quantity(&mut self, id: &str) {
        self.list.increment_quantity(id);
        self.persist().await;
    }

    pub async fn decrement_quantity(&mut self, id: &str) {
        self.list.decrement_quantity(id);
        self.persist().await;
    }

    pub async fn remove_from_list(&mut self, id: &str) {
        self.list.remove_from_list(id);
        self.persist().await;
    }

    pub async fn clear_list(&mut self) {
        self.list.clear_list();
        self.persist().await;
    }

    pub async fn set_name(&mut self, name: &str) {
        self.identity.set_name(name);
        self.persist().await;
    }

    // ========================================================================
    // Search
    // ========================================================================

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.catalog.set_search_query(query);
    }

    pub fn clear_search_query(&mut self) {
        self.catalog.clear_search_query();
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Start a new ingestion generation and mark the catalog as loading.
    pub fn begin_ingestion(&mut self) -> u64 {
        self.ingestion_generation = self.ingestion_generation.wrapping_add(1);
        self.catalog.set_status(IngestionStatus::Loading);
        self.ingestion_generation
    }

    /// Apply an ingestion result if it belongs to the latest generation.
    ///
    /// Success replaces the catalog; failure records the error and keeps the
    /// current items. Returns whether the result was applied.
    pub fn apply_ingestion(
        &mut self,
        generation: u64,
        result: Result<Vec<Record>, IngestionError>,
    ) -> bool {
        if generation != self.ingestion_generation {
            tracing::debug!(
                expected = self.ingestion_generation,
                got = generation,
                "Ignoring stale catalog result (generation mismatch)"
            );
            return false;
        }

        match result {
            Ok(records) => {
                self.catalog.replace_items(&records, &self.columns);
                self.catalog.mark_synced(chrono::Utc::now());
                tracing::info!(items = self.catalog.items().len(), "Catalog refreshed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Catalog refresh failed");
                self.catalog.set_status(IngestionStatus::Error(e.to_string()));
            }
        }
        true
    }

    /// Fetch and apply a catalog inline.
    pub async fn refresh_catalog<S: GridSource>(&mut self, source: &S) -> bool {
        let generation = self.begin_ingestion();
        let result = sheets::ingest(source).await;
        self.apply_ingestion(generation, result)
    }

    /// Spawn a background ingestion that reports via `event_tx`.
    ///
    /// Any ingestion still in flight is aborted; its result would be stale.
    pub fn start_ingestion<S>(&mut self, source: Arc<S>, event_tx: mpsc::Sender<AppEvent>) -> u64
    where
        S: GridSource + Send + Sync + 'static,
    {
        if let Some(handle) = self.ingestion_handle.take() {
            handle.abort();
            tracing::debug!("Aborted previous ingestion task");
        }

        let generation = self.begin_ingestion();
        self.ingestion_handle = Some(tokio::spawn(async move {
            let result = sheets::ingest(source.as_ref()).await;
            if event_tx
                .send(AppEvent::CatalogLoaded { generation, result })
                .await
                .is_err()
            {
                tracing::debug!(generation, "Catalog receiver dropped before result delivery");
            }
        }));
        generation
    }

    /// Apply a background event. Returns whether it changed the catalog.
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::CatalogLoaded { generation, result } => {
                let applied = self.apply_ingestion(generation, result);
                if applied {
                    self.ingestion_handle = None;
                }
                applied
            }
        }
    }

    /// Drain events until the latest ingestion has been applied or the
    /// channel closes.
    pub async fn wait_for_catalog(&mut self, event_rx: &mut mpsc::Receiver<AppEvent>) {
        while self.catalog.status().is_loading() {
            match event_rx.recv().await {
                Some(event) => {
                    self.handle_event(event);
                }
                None => {
                    tracing::warn!("Ingestion channel closed before the catalog loaded");
                    self.catalog
                        .set_status(IngestionStatus::Error("Catalog refresh was cancelled".into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::Cell;
    use serde_json::json;
    use std::future::Future;

    struct FixedGrid(Vec<Vec<Cell>>);

    impl GridSource for FixedGrid {
        fn fetch_grid(
            &self,
        ) -> impl Future<Output = Result<Vec<Vec<Cell>>, IngestionError>> + Send {
            let grid = self.0.clone();
            async move { Ok(grid) }
        }
    }

    struct FailingGrid;

    impl GridSource for FailingGrid {
        fn fetch_grid(
            &self,
        ) -> impl Future<Output = Result<Vec<Vec<Cell>>, IngestionError>> + Send {
            async { Err(IngestionError::HttpStatus(503)) }
        }
    }

    fn groceries() -> FixedGrid {
        FixedGrid(vec![
            vec![json!("Id"), json!("GroceryItem")],
            vec![json!("1"), json!("Milk")],
            vec![json!("2"), json!("Eggs")],
        ])
    }

    async fn test_app() -> App {
        let db = Database::open(":memory:").await.unwrap();
        App::new(db, Columns::default())
    }

    #[tokio::test]
    async fn test_refresh_catalog_populates_items() {
        let mut app = test_app().await;
        assert!(app.refresh_catalog(&groceries()).await);
        assert_eq!(app.catalog().items().len(), 2);
        assert_eq!(app.catalog().status(), &IngestionStatus::Idle);
        assert!(app.catalog().last_synced().is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_items() {
        let mut app = test_app().await;
        app.refresh_catalog(&groceries()).await;
        app.refresh_catalog(&FailingGrid).await;
        assert_eq!(app.catalog().items().len(), 2);
        assert_eq!(app.catalog().status().error(), Some("Sheets API error: status 503"));
    }

    #[tokio::test]
    async fn test_stale_generation_is_ignored() {
        let mut app = test_app().await;
        let first = app.begin_ingestion();
        let second = app.begin_ingestion();

        let newer = sheets::normalize(&groceries().0);
        assert!(app.apply_ingestion(second, Ok(newer)));

        let older = sheets::normalize(&[vec![json!("Id")], vec![json!("9")]]);
        assert!(!app.apply_ingestion(first, Ok(older)));
        assert_eq!(app.catalog().items().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_error_does_not_clobber_status() {
        let mut app = test_app().await;
        let first = app.begin_ingestion();
        let second = app.begin_ingestion();
        assert!(app.apply_ingestion(second, Ok(Vec::new())));
        assert!(!app.apply_ingestion(first, Err(IngestionError::Timeout)));
        assert_eq!(app.catalog().status(), &IngestionStatus::Idle);
    }

    #[tokio::test]
    async fn test_spawned_ingestion_delivers_event() {
        let mut app = test_app().await;
        let (tx, mut rx) = mpsc::channel(4);
        let generation = app.start_ingestion(Arc::new(groceries()), tx);
        assert!(app.catalog().status().is_loading());

        app.wait_for_catalog(&mut rx).await;
        assert_eq!(app.ingestion_generation(), generation);
        assert_eq!(app.catalog().items().len(), 2);
    }

    #[tokio::test]
    async fn test_list_mutations_during_ingestion() {
        let mut app = test_app().await;
        app.hydrate().await.unwrap();
        app.refresh_catalog(&groceries()).await;

        let (tx, mut rx) = mpsc::channel(4);
        app.start_ingestion(Arc::new(groceries()), tx);
        assert!(app.add_by_id("1").await);
        app.increment_quantity("1").await;
        app.wait_for_catalog(&mut rx).await;

        assert_eq!(app.list().quantity_of("1"), Some(2));
    }

    #[tokio::test]
    async fn test_add_by_unknown_id() {
        let mut app = test_app().await;
        app.refresh_catalog(&groceries()).await;
        assert!(!app.add_by_id("42").await);
        assert_eq!(app.list().count(), 0);
    }

    #[tokio::test]
    async fn test_no_save_before_hydration() {
        let db = Database::open(":memory:").await.unwrap();
        let mut app = App::new(db.clone(), Columns::default());
        app.set_name("Ada").await;
        assert_eq!(db.load_blob(STATE_KEY).await.unwrap(), None);

        app.hydrate().await.unwrap();
        app.set_name("Ada").await;
        assert!(db.load_blob(STATE_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_hydrate_restores_saved_state() {
        let db = Database::open(":memory:").await.unwrap();

        let mut app = App::new(db.clone(), Columns::default());
        app.hydrate().await.unwrap();
        app.refresh_catalog(&groceries()).await;
        app.add_by_id("2").await;
        app.add_by_id("2").await;
        app.set_name("  Ada ").await;

        let mut restored = App::new(db, Columns::default());
        restored.hydrate().await.unwrap();
        assert!(restored.is_hydrated());
        assert_eq!(restored.list().quantity_of("2"), Some(2));
        assert_eq!(restored.identity().name(), Some("Ada"));
        assert!(restored.catalog().items().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_blob_starts_fresh() {
        let db = Database::open(":memory:").await.unwrap();
        db.save_blob(STATE_KEY, "not json").await.unwrap();

        let mut app = App::new(db, Columns::default());
        app.hydrate().await.unwrap();
        assert!(app.is_hydrated());
        assert_eq!(app.list().count(), 0);
    }

    #[tokio::test]
    async fn test_add_item_outside_catalog_is_saved() {
        let db = Database::open(":memory:").await.unwrap();
        let mut app = App::new(db.clone(), Columns::default());
        app.hydrate().await.unwrap();
        app.refresh_catalog(&groceries()).await;

        let tea = CatalogEntry::new("9", "Tea");
        assert!(app.catalog().find("9").is_none());
        app.add_item(&tea).await;
        app.add_item(&tea).await;
        assert_eq!(app.list().quantity_of("9"), Some(2));

        let blob = db.load_blob(STATE_KEY).await.unwrap().unwrap();
        let saved: PersistedState = serde_json::from_str(&blob).unwrap();
        assert_eq!(saved.list, app.list().entries());
    }

    #[tokio::test]
    async fn test_search_query_through_app() {
        let mut app = test_app().await;
        app.refresh_catalog(&groceries()).await;

        app.set_search_query("EGG");
        let names: Vec<_> = app.catalog().filtered_view().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["Eggs".to_string()]);

        app.clear_search_query();
        assert_eq!(app.catalog().filtered_view().len(), 2);
    }
}
