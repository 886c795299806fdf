//! Per-row medicine autocomplete.
//!
//! Each prescription row owns its own debounce timer, query text and
//! suggestion list. A keystroke restarts only that row's timer; short queries
//! never reach the server. When the search call fails the row falls back to
//! filtering the locally cached medicine list and is flagged as degraded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::config::ReconcilerConfig;
use crate::error::StoreError;
use crate::models::Medicine;
use crate::query::{Generation, GenerationCounter};
use crate::store::CaseStore;

// ─── Public types ────────────────────────────────────────────────────────────

/// Identifies one autocomplete row (e.g. one medication line on a form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(pub String);

impl From<&str> for RowKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for RowKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestionSettings {
    pub debounce: Duration,
    pub min_query_len: usize,
}

impl From<&ReconcilerConfig> for SuggestionSettings {
    fn from(config: &ReconcilerConfig) -> Self {
        Self {
            debounce: config.suggestion_debounce,
            min_query_len: config.min_query_len,
        }
    }
}

/// What a renderer needs for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub query: String,
    pub suggestions: Vec<Medicine>,
    /// Suggestions came from the local cache because the search failed.
    pub degraded: bool,
    pub selected: Option<Medicine>,
    /// A debounced search is scheduled or in flight.
    pub pending: bool,
}

/// Where medicine suggestions come from.
#[async_trait]
pub trait MedicineCatalog: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Medicine>, StoreError>;
    async fn all(&self) -> Result<Vec<Medicine>, StoreError>;
}

#[async_trait]
impl<S: CaseStore + ?Sized> MedicineCatalog for S {
    async fn search(&self, query: &str) -> Result<Vec<Medicine>, StoreError> {
        self.search_medicines(query).await
    }

    async fn all(&self) -> Result<Vec<Medicine>, StoreError> {
        self.list_medicines().await
    }
}

// ─── Internal types ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RowState {
    query: String,
    suggestions: Vec<Medicine>,
    generation: GenerationCounter,
    timer: Option<JoinHandle<()>>,
    /// Debounce elapsed and the search call is outstanding.
    searching: bool,
    degraded: bool,
    selected: Option<Medicine>,
}

impl RowState {
    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn view(&self) -> RowView {
        RowView {
            query: self.query.clone(),
            suggestions: self.suggestions.clone(),
            degraded: self.degraded,
            selected: self.selected.clone(),
            pending: self.timer.is_some() || self.searching,
        }
    }
}

#[derive(Default)]
struct EngineState {
    rows: HashMap<RowKey, RowState>,
    /// Full medicine list, used when search is unavailable.
    snapshot: Vec<Medicine>,
}

impl EngineState {
    fn refresh_snapshot(&mut self, found: &[Medicine]) {
        for medicine in found {
            match self.snapshot.iter_mut().find(|m| m.id == medicine.id) {
                Some(cached) => *cached = medicine.clone(),
                None => self.snapshot.push(medicine.clone()),
            }
        }
    }

    fn filter_snapshot(&self, query: &str) -> Vec<Medicine> {
        self.snapshot
            .iter()
            .filter(|m| m.matches(query))
            .cloned()
            .collect()
    }
}

struct Shared {
    catalog: Arc<dyn MedicineCatalog>,
    settings: SuggestionSettings,
    state: Mutex<EngineState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn search(&self, key: RowKey, generation: Generation, query: String) {
        {
            let mut state = self.lock();
            let Some(row) = state.rows.get_mut(&key) else {
                return;
            };
            if !row.generation.is_current(generation) {
                return;
            }
            // Past the window: later keystrokes no longer abort this call,
            // its result is dropped by the generation check instead.
            row.timer = None;
            row.searching = true;
        }
        tracing::debug!(row = %key, %generation, "Suggestion debounce elapsed");
        let result = self.catalog.search(&query).await;

        let mut state = self.lock();
        let fallback = match &result {
            Err(_) => state.filter_snapshot(&query),
            Ok(found) => {
                state.refresh_snapshot(found);
                Vec::new()
            }
        };
        let Some(row) = state.rows.get_mut(&key) else {
            tracing::debug!(row = %key, "Row removed before suggestions arrived");
            return;
        };
        if !row.generation.is_current(generation) {
            tracing::debug!(
                row = %key,
                %generation,
                current = %row.generation.current(),
                "Discarding stale suggestions"
            );
            return;
        }
        row.searching = false;
        match result {
            Ok(found) => {
                row.suggestions = found;
                row.degraded = false;
            }
            Err(error) => {
                tracing::warn!(
                    row = %key,
                    error = %error,
                    cached = fallback.len(),
                    "Medicine search failed, using cached list"
                );
                row.suggestions = fallback;
                row.degraded = true;
            }
        }
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Debounced autocomplete for any number of independent rows.
pub struct SuggestionEngine {
    shared: Arc<Shared>,
}

impl SuggestionEngine {
    pub fn new(catalog: Arc<dyn MedicineCatalog>, settings: SuggestionSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog,
                settings,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Seed the offline fallback list.
    pub fn with_snapshot(self, medicines: Vec<Medicine>) -> Self {
        self.shared.lock().snapshot = medicines;
        self
    }

    /// Fetch the full medicine list for offline fallback. Returns its size.
    pub async fn load_snapshot(&self) -> Result<usize, StoreError> {
        let medicines = self.shared.catalog.all().await?;
        let count = medicines.len();
        self.shared.lock().snapshot = medicines;
        tracing::info!(count, "Medicine snapshot loaded");
        Ok(count)
    }

    /// Text in `row` changed. Must be called from within a tokio runtime.
    pub fn on_query_change(&self, row: impl Into<RowKey>, text: &str) {
        let key = row.into();
        let settings = self.shared.settings;
        let mut state = self.shared.lock();
        let entry = state.rows.entry(key.clone()).or_default();

        entry.cancel();
        entry.searching = false;
        let generation = entry.generation.advance();
        entry.query = text.to_string();
        entry.selected = None;

        let query = text.trim().to_string();
        if query.chars().count() < settings.min_query_len {
            entry.suggestions.clear();
            entry.degraded = false;
            return;
        }

        let shared = Arc::clone(&self.shared);
        entry.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(settings.debounce).await;
            shared.search(key, generation, query).await;
        }));
    }

    /// The user picked a suggestion. No further search runs for this row.
    pub fn select(&self, row: impl Into<RowKey>, medicine: Medicine) {
        let mut state = self.shared.lock();
        let entry = state.rows.entry(row.into()).or_default();
        entry.cancel();
        entry.searching = false;
        entry.generation.advance();
        entry.query = medicine.name.clone();
        entry.suggestions.clear();
        entry.degraded = false;
        entry.selected = Some(medicine);
    }

    pub fn remove_row(&self, row: impl Into<RowKey>) {
        if let Some(mut removed) = self.shared.lock().rows.remove(&row.into()) {
            removed.cancel();
        }
    }

    pub fn suggestions(&self, row: impl Into<RowKey>) -> Vec<Medicine> {
        self.shared
            .lock()
            .rows
            .get(&row.into())
            .map(|r| r.suggestions.clone())
            .unwrap_or_default()
    }

    pub fn row(&self, row: impl Into<RowKey>) -> Option<RowView> {
        self.shared.lock().rows.get(&row.into()).map(RowState::view)
    }

    pub fn row_count(&self) -> usize {
        self.shared.lock().rows.len()
    }
}

impl Drop for SuggestionEngine {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        for row in state.rows.values_mut() {
            row.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCaseStore;
    use tokio::sync::oneshot;
    use tokio::time::sleep;
    use uuid::Uuid;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn medicine(name: &str) -> Medicine {
        Medicine {
            id: Uuid::new_v4(),
            name: name.into(),
            stock_on_hand: 20,
            unit: Some("tablet".into()),
        }
    }

    #[derive(Default)]
    struct FakeCatalog {
        medicines: Vec<Medicine>,
        offline: std::sync::atomic::AtomicBool,
        calls: Mutex<Vec<String>>,
        gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    }

    impl FakeCatalog {
        fn with(names: &[&str]) -> Self {
            Self {
                medicines: names.iter().map(|n| medicine(n)).collect(),
                ..Self::default()
            }
        }

        fn go_offline(&self) {
            self.offline
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }

        fn gate(&self, query: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(query.to_string(), rx);
            tx
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MedicineCatalog for FakeCatalog {
        async fn search(&self, query: &str) -> Result<Vec<Medicine>, StoreError> {
            self.calls.lock().unwrap().push(query.to_string());
            let gate = self.gates.lock().unwrap().remove(query);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Network("offline".into()));
            }
            Ok(self
                .medicines
                .iter()
                .filter(|m| m.matches(query))
                .cloned()
                .collect())
        }

        async fn all(&self) -> Result<Vec<Medicine>, StoreError> {
            Ok(self.medicines.clone())
        }
    }

    fn engine(catalog: &Arc<FakeCatalog>) -> SuggestionEngine {
        let catalog: Arc<dyn MedicineCatalog> = catalog.clone();
        SuggestionEngine::new(
            catalog,
            SuggestionSettings {
                debounce: DEBOUNCE,
                min_query_len: 2,
            },
        )
    }

    fn names(medicines: &[Medicine]) -> Vec<&str> {
        medicines.iter().map(|m| m.name.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn typing_within_window_fetches_once_for_final_text() {
        let catalog = Arc::new(FakeCatalog::with(&["Paracetamol", "Ibuprofen"]));
        let engine = engine(&catalog);

        for text in ["p", "pa", "par"] {
            engine.on_query_change("row-1", text);
            sleep(Duration::from_millis(250)).await;
        }
        sleep(Duration::from_millis(100)).await;

        assert_eq!(catalog.calls(), vec!["par".to_string()]);
        assert_eq!(names(&engine.suggestions("row-1")), vec!["Paracetamol"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rows_debounce_independently() {
        let catalog = Arc::new(FakeCatalog::with(&["Amoxicillin", "Ibuprofen"]));
        let engine = engine(&catalog);

        engine.on_query_change("row-1", "amo");
        sleep(Duration::from_millis(100)).await;
        engine.on_query_change("row-2", "ibu");
        sleep(DEBOUNCE * 2).await;

        let mut calls = catalog.calls();
        calls.sort();
        assert_eq!(calls, vec!["amo".to_string(), "ibu".to_string()]);
        assert_eq!(names(&engine.suggestions("row-1")), vec!["Amoxicillin"]);
        assert_eq!(names(&engine.suggestions("row-2")), vec!["Ibuprofen"]);
    }

    #[tokio::test(start_paused = true)]
    async fn short_query_clears_without_fetching() {
        let catalog = Arc::new(FakeCatalog::with(&["Paracetamol"]));
        let engine = engine(&catalog);

        engine.on_query_change("row-1", "para");
        sleep(DEBOUNCE * 2).await;
        assert_eq!(engine.suggestions("row-1").len(), 1);

        engine.on_query_change("row-1", " p ");
        let view = engine.row("row-1").unwrap();
        assert!(view.suggestions.is_empty());
        assert!(!view.pending);

        sleep(DEBOUNCE * 2).await;
        assert_eq!(catalog.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_search_falls_back_to_snapshot() {
        let catalog = Arc::new(FakeCatalog::with(&["Paracetamol", "Ibuprofen"]));
        let engine = engine(&catalog);
        assert_eq!(engine.load_snapshot().await.unwrap(), 2);
        catalog.go_offline();

        engine.on_query_change("row-1", "PARA");
        sleep(DEBOUNCE * 2).await;

        let view = engine.row("row-1").unwrap();
        assert!(view.degraded);
        assert_eq!(names(&view.suggestions), vec!["Paracetamol"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_search_without_snapshot_is_empty_and_degraded() {
        let catalog = Arc::new(FakeCatalog::with(&["Paracetamol"]));
        catalog.go_offline();
        let engine = engine(&catalog);

        engine.on_query_change("row-1", "para");
        sleep(DEBOUNCE * 2).await;

        let view = engine.row("row-1").unwrap();
        assert!(view.degraded);
        assert!(view.suggestions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_cancels_pending_search() {
        let catalog = Arc::new(FakeCatalog::with(&["Paracetamol"]));
        let engine = engine(&catalog);
        let chosen = medicine("Paracetamol 500mg");

        engine.on_query_change("row-1", "para");
        engine.select("row-1", chosen.clone());
        sleep(DEBOUNCE * 2).await;

        assert!(catalog.calls().is_empty());
        let view = engine.row("row-1").unwrap();
        assert_eq!(view.query, "Paracetamol 500mg");
        assert_eq!(view.selected, Some(chosen));
        assert!(view.suggestions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_results_for_old_text_are_dropped() {
        let catalog = Arc::new(FakeCatalog::with(&["Paracetamol", "Pantoprazole"]));
        let release = catalog.gate("pa");
        let engine = engine(&catalog);

        engine.on_query_change("row-1", "pa");
        sleep(DEBOUNCE + Duration::from_millis(10)).await;
        assert_eq!(catalog.calls(), vec!["pa".to_string()]);

        assert!(engine.row("row-1").unwrap().pending);

        engine.on_query_change("row-1", "pant");
        sleep(DEBOUNCE * 2).await;
        assert_eq!(names(&engine.suggestions("row-1")), vec!["Pantoprazole"]);

        // The "pa" call was already past its window, so it still completes.
        release.send(()).unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(catalog.calls(), vec!["pa".to_string(), "pant".to_string()]);
        assert_eq!(names(&engine.suggestions("row-1")), vec!["Pantoprazole"]);
        assert!(!engine.row("row-1").unwrap().pending);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_row_never_fetches() {
        let catalog = Arc::new(FakeCatalog::with(&["Paracetamol"]));
        let engine = engine(&catalog);

        engine.on_query_change("row-1", "para");
        engine.remove_row("row-1");
        sleep(DEBOUNCE * 2).await;

        assert!(catalog.calls().is_empty());
        assert_eq!(engine.row_count(), 0);
        assert!(engine.row("row-1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_engine_cancels_all_rows() {
        let catalog = Arc::new(FakeCatalog::with(&["Paracetamol"]));
        {
            let engine = engine(&catalog);
            engine.on_query_change("row-1", "para");
            engine.on_query_change("row-2", "para");
        }
        sleep(DEBOUNCE * 2).await;
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn case_store_serves_as_catalog() {
        let store = Arc::new(MemoryCaseStore::new());
        store.insert_medicine(medicine("Cetirizine"));
        store.insert_medicine(medicine("Ciprofloxacin"));
        let catalog: Arc<dyn MedicineCatalog> = store.clone();
        let settings = SuggestionSettings::from(&ReconcilerConfig::default());
        let engine = SuggestionEngine::new(catalog, settings);

        assert_eq!(engine.load_snapshot().await.unwrap(), 2);
        engine.on_query_change("row-1", "cip");
        sleep(Duration::from_secs(1)).await;
        assert_eq!(names(&engine.suggestions("row-1")), vec!["Ciprofloxacin"]);
    }
}
