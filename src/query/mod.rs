//! Query orchestrator for filtered, paginated list views.
//!
//! Owns the cursor and the visible rows of one list view, and keeps them
//! correct under rapid input:
//! - filter changes are debounced and bump the generation, so responses for
//!   abandoned filters are dropped when they land;
//! - rows from the previous filters stay visible until the new first page
//!   arrives;
//! - only one page is in flight at a time, so page N+1 is never requested
//!   before page N has resolved;
//! - failures fall back to the rows already on screen where that is safe.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`.

pub mod generation;
pub mod view;

pub use generation::{Generation, GenerationCounter};
pub use view::{FetchOutcome, SkipReason, ViewNotice, ViewSnapshot};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ReconcilerConfig;
use crate::error::{FailureClass, StoreError};
use crate::models::{CaseFilter, CaseRecord, Page};
use crate::store::CaseStore;

// ═══════════════════════════════════════════════════════════
// Seams
// ═══════════════════════════════════════════════════════════

/// Rows with a stable identity. Ids must be unique across a view's pages.
pub trait Identified {
    fn id(&self) -> Uuid;
}

impl Identified for CaseRecord {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Anything that serves filtered pages of `T`.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(
        &self,
        filter: &CaseFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<T>, StoreError>;
}

#[async_trait]
impl<S: CaseStore + ?Sized> PageSource<CaseRecord> for S {
    async fn fetch_page(
        &self,
        filter: &CaseFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<CaseRecord>, StoreError> {
        self.list_cases(filter, page, limit).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySettings {
    pub page_size: u32,
    pub debounce: Duration,
}

impl From<&ReconcilerConfig> for QuerySettings {
    fn from(config: &ReconcilerConfig) -> Self {
        Self {
            page_size: config.page_size,
            debounce: config.list_debounce,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// View state
// ═══════════════════════════════════════════════════════════

struct ViewState<T> {
    generation: GenerationCounter,
    filter: CaseFilter,
    items: Vec<T>,
    ids: HashSet<Uuid>,
    next_page: u32,
    has_more: bool,
    in_flight: Option<u32>,
    /// A first-page load is waiting on the debounce timer.
    scheduled: bool,
    first_page_landed: bool,
    failed_page: Option<u32>,
    /// Rows from an earlier successful load are on screen.
    has_fallback: bool,
    notice: Option<ViewNotice>,
    closed: bool,
}

impl<T: Identified + Clone> ViewState<T> {
    fn new() -> Self {
        Self {
            generation: GenerationCounter::new(),
            filter: CaseFilter::default(),
            items: Vec::new(),
            ids: HashSet::new(),
            next_page: 1,
            has_more: true,
            in_flight: None,
            scheduled: false,
            first_page_landed: false,
            failed_page: None,
            has_fallback: false,
            notice: None,
            closed: false,
        }
    }

    /// Start a new generation for `filter`. Visible rows are kept.
    fn restart(&mut self, filter: CaseFilter) -> Generation {
        let generation = self.generation.advance();
        self.filter = filter;
        self.next_page = 1;
        self.has_more = true;
        self.in_flight = None;
        self.scheduled = true;
        self.first_page_landed = false;
        self.failed_page = None;
        generation
    }

    /// Claim the single in-flight slot for `page` of `generation`.
    fn reserve(&mut self, generation: Generation, page: u32) -> Result<CaseFilter, FetchOutcome> {
        if self.closed {
            return Err(FetchOutcome::Skipped(SkipReason::Closed));
        }
        if !self.generation.is_current(generation) {
            return Err(FetchOutcome::Stale);
        }
        if self.in_flight.is_some() {
            return Err(FetchOutcome::Skipped(SkipReason::InFlight));
        }
        self.in_flight = Some(page);
        self.scheduled = false;
        Ok(self.filter.clone())
    }

    fn apply_page(&mut self, page: u32, mut data: Page<T>, page_size: u32) -> FetchOutcome {
        let has_more = data.has_more(page_size);
        let mut incoming = HashSet::with_capacity(data.data.len());
        let existing = if page == 1 { None } else { Some(&self.ids) };
        let duplicate = data.data.iter().map(Identified::id).find(|id| {
            !incoming.insert(*id) || existing.is_some_and(|ids| ids.contains(id))
        });

        if let Some(duplicate_id) = duplicate {
            tracing::warn!(
                page,
                %duplicate_id,
                generation = %self.generation.current(),
                "Duplicate id across pages, stopping pagination"
            );
            if page == 1 {
                // Rows on screen belong to the previous filters.
                self.items.clear();
                self.ids.clear();
            }
            self.first_page_landed = true;
            self.has_more = false;
            self.notice = Some(ViewNotice::ContractViolation { duplicate_id });
            return FetchOutcome::ContractViolation { duplicate_id };
        }

        if page == 1 {
            self.items.clear();
            self.ids.clear();
            self.first_page_landed = true;
        }
        let received = data.data.len();
        self.ids.extend(incoming);
        self.items.append(&mut data.data);
        self.next_page = page + 1;
        self.has_more = has_more;
        self.has_fallback = true;
        self.failed_page = None;
        self.notice = if self.items.is_empty() {
            Some(ViewNotice::Empty)
        } else {
            None
        };
        FetchOutcome::Applied { page, received }
    }

    fn apply_failure(&mut self, page: u32, error: StoreError) -> FetchOutcome {
        let class = error.class();
        let message = error.to_string();
        let fallback = self.has_fallback && error.allows_fallback();
        match class {
            FailureClass::PermissionDenied => {
                // Never leave stale rows behind an auth failure. The cursor
                // goes back to page 1 so a retry rebuilds the whole list.
                self.items.clear();
                self.ids.clear();
                self.has_fallback = false;
                self.has_more = false;
                self.next_page = 1;
                self.first_page_landed = false;
                self.failed_page = Some(1);
                self.notice = Some(ViewNotice::PermissionDenied { message });
            }
            FailureClass::NotFound if page > 1 => {
                self.has_more = false;
            }
            FailureClass::NotFound => {
                self.items.clear();
                self.ids.clear();
                self.first_page_landed = true;
                self.has_more = false;
                self.notice = Some(if fallback {
                    ViewNotice::Empty
                } else {
                    ViewNotice::NotFound { message }
                });
            }
            FailureClass::Network | FailureClass::Rejected => {
                self.failed_page = Some(page);
                self.notice = Some(if fallback {
                    ViewNotice::StaleData { message }
                } else {
                    ViewNotice::Blocking {
                        message,
                        retryable: true,
                    }
                });
            }
        }
        tracing::warn!(page, ?class, error = %error, "Page fetch failed");
        FetchOutcome::Failed(class)
    }

    fn snapshot(&self) -> ViewSnapshot<T> {
        ViewSnapshot {
            generation: self.generation.current(),
            filter: self.filter.clone(),
            items: self.items.clone(),
            has_more: self.has_more,
            loading: self.in_flight.is_some() || self.scheduled,
            notice: self.notice.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════

struct Shared<T> {
    source: Arc<dyn PageSource<T>>,
    settings: QuerySettings,
    state: Mutex<ViewState<T>>,
}

impl<T: Identified + Clone + Send + 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, ViewState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self, generation: Generation, page: u32, filter: CaseFilter) -> FetchOutcome {
        let result = self
            .source
            .fetch_page(&filter, page, self.settings.page_size)
            .await;

        let mut state = self.lock();
        if state.closed || !state.generation.is_current(generation) {
            tracing::debug!(
                %generation,
                current = %state.generation.current(),
                page,
                "Discarding stale page response"
            );
            return FetchOutcome::Stale;
        }
        state.in_flight = None;
        match result {
            Ok(data) => state.apply_page(page, data, self.settings.page_size),
            Err(error) => state.apply_failure(page, error),
        }
    }

    async fn load_first_page(&self, generation: Generation) -> FetchOutcome {
        let reserved = self.lock().reserve(generation, 1);
        match reserved {
            Ok(filter) => self.run(generation, 1, filter).await,
            Err(outcome) => outcome,
        }
    }
}

/// One list view's query state machine.
pub struct QueryOrchestrator<T> {
    shared: Arc<Shared<T>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Identified + Clone + Send + 'static> QueryOrchestrator<T> {
    pub fn new(source: Arc<dyn PageSource<T>>, settings: QuerySettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                settings,
                state: Mutex::new(ViewState::new()),
            }),
            debounce: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> QuerySettings {
        self.shared.settings
    }

    /// Apply new filters. Resets to page 1 after the debounce window; the
    /// rows on screen stay until that page arrives.
    ///
    /// Must be called from within a tokio runtime.
    pub fn configure(&self, filter: CaseFilter) -> Generation {
        let generation = self.shared.lock().restart(filter);
        tracing::info!(%generation, "List filters changed");
        self.schedule_first_page(generation, self.shared.settings.debounce);
        generation
    }

    /// Re-run page 1 of the current filters now, bypassing the debounce.
    pub async fn refresh(&self) -> FetchOutcome {
        self.cancel_timer();
        let generation = {
            let mut state = self.shared.lock();
            if state.closed {
                return FetchOutcome::Skipped(SkipReason::Closed);
            }
            let filter = state.filter.clone();
            state.restart(filter)
        };
        self.shared.load_first_page(generation).await
    }

    /// Pull the next page (e.g. the "load more" sentinel became visible).
    pub async fn fetch_next_page(&self) -> FetchOutcome {
        let reserved = {
            let mut state = self.shared.lock();
            if state.closed {
                return FetchOutcome::Skipped(SkipReason::Closed);
            }
            if state.in_flight.is_some() {
                return FetchOutcome::Skipped(SkipReason::InFlight);
            }
            if !state.first_page_landed {
                return FetchOutcome::Skipped(SkipReason::AwaitingFirstPage);
            }
            if !state.has_more {
                return FetchOutcome::Skipped(SkipReason::Exhausted);
            }
            let generation = state.generation.current();
            let page = state.next_page;
            state
                .reserve(generation, page)
                .map(|filter| (generation, page, filter))
        };
        match reserved {
            Ok((generation, page, filter)) => self.shared.run(generation, page, filter).await,
            Err(outcome) => outcome,
        }
    }

    /// Re-issue the page that last failed in the current generation.
    pub async fn retry(&self) -> FetchOutcome {
        let reserved = {
            let mut state = self.shared.lock();
            let Some(page) = state.failed_page else {
                return FetchOutcome::Skipped(SkipReason::NothingToRetry);
            };
            let generation = state.generation.current();
            state
                .reserve(generation, page)
                .map(|filter| (generation, page, filter))
        };
        match reserved {
            Ok((generation, page, filter)) => {
                tracing::info!(%generation, page, "Retrying failed page");
                self.shared.run(generation, page, filter).await
            }
            Err(outcome) => outcome,
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot<T> {
        self.shared.lock().snapshot()
    }

    pub fn generation(&self) -> Generation {
        self.shared.lock().generation.current()
    }

    /// Tear the view down: cancel the pending timer and ignore anything
    /// still in flight.
    pub fn close(&self) {
        self.cancel_timer();
        let mut state = self.shared.lock();
        state.closed = true;
        state.scheduled = false;
        state.in_flight = None;
        state.generation.advance();
    }

    fn schedule_first_page(&self, generation: Generation, delay: Duration) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::debug!(%generation, "Debounce elapsed, fetching first page");
            shared.load_first_page(generation).await;
        });
        let previous = self
            .debounce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_timer(&self) {
        if let Some(handle) = self
            .debounce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl<T> Drop for QueryOrchestrator<T> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .debounce
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
