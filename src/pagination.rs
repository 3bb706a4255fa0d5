//! Incremental fetch-on-scroll over a [`SearchBackend`].
//!
//! The controller owns the accumulated result list and a request generation.
//! `reset` bumps the generation, so a response that comes back for an older
//! generation is dropped instead of overwriting newer results. The lock is
//! only held to read or apply state, never across a fetch.

use crate::filters::FilterState;
use crate::models::{PaginationCursor, PropertyListing};
use crate::search::{SearchBackend, SearchError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    LoadingFirstPage,
    LoadingMore,
    Ready,
    Errored,
}

impl LoadStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadStatus::LoadingFirstPage | LoadStatus::LoadingMore)
    }
}

/// What a controller operation did
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The response was applied to the list
    Applied,
    /// A newer reset happened while this fetch was in flight
    Superseded,
    /// Nothing to do in the current state
    Skipped,
    Failed(SearchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    FirstPage,
    NextPage(u32),
}

impl RequestKind {
    fn page(&self) -> u32 {
        match self {
            RequestKind::FirstPage => 1,
            RequestKind::NextPage(page) => *page,
        }
    }

    fn loading_status(&self) -> LoadStatus {
        match self {
            RequestKind::FirstPage => LoadStatus::LoadingFirstPage,
            RequestKind::NextPage(_) => LoadStatus::LoadingMore,
        }
    }
}

/// Consistent view of the controller at one instant
#[derive(Debug, Clone)]
pub struct PaginationSnapshot {
    pub status: LoadStatus,
    pub items: Arc<Vec<PropertyListing>>,
    pub cursor: Option<PaginationCursor>,
    pub error: Option<SearchError>,
    pub generation: u64,
}

impl PaginationSnapshot {
    pub fn has_more(&self) -> bool {
        self.cursor.is_some_and(|c| c.has_more)
    }
}

struct State {
    status: LoadStatus,
    generation: u64,
    filters: FilterState,
    locale: String,
    items: Arc<Vec<PropertyListing>>,
    cursor: Option<PaginationCursor>,
    error: Option<SearchError>,
    failed: Option<RequestKind>,
}

struct Shared<B> {
    backend: B,
    page_size: u32,
    timeout: Duration,
    state: Mutex<State>,
}

/// Paged listing loader. Clones drive the same underlying state.
pub struct PaginationController<B> {
    inner: Arc<Shared<B>>,
}

impl<B> Clone for PaginationController<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SearchBackend> PaginationController<B> {
    pub fn new(backend: B, page_size: u32, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Shared {
                backend,
                page_size: page_size.max(1),
                timeout,
                state: Mutex::new(State {
                    status: LoadStatus::Idle,
                    generation: 0,
                    filters: FilterState::defaults(),
                    locale: String::new(),
                    items: Arc::new(Vec::new()),
                    cursor: None,
                    error: None,
                    failed: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn snapshot(&self) -> PaginationSnapshot {
        let state = self.state();
        PaginationSnapshot {
            status: state.status,
            items: Arc::clone(&state.items),
            cursor: state.cursor,
            error: state.error.clone(),
            generation: state.generation,
        }
    }

    pub fn items(&self) -> Arc<Vec<PropertyListing>> {
        Arc::clone(&self.state().items)
    }

    pub fn status(&self) -> LoadStatus {
        self.state().status
    }

    pub fn cursor(&self) -> Option<PaginationCursor> {
        self.state().cursor
    }

    pub fn has_more(&self) -> bool {
        self.state().cursor.is_some_and(|c| c.has_more)
    }

    pub fn error(&self) -> Option<SearchError> {
        self.state().error.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Start over at page 1 for `filters`, superseding anything in flight.
    /// The previous list and cursor are dropped right away, so a failed
    /// first page never leaves results for other filters on display.
    pub async fn reset(&self, filters: FilterState, locale: &str) -> FetchOutcome {
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.status = LoadStatus::LoadingFirstPage;
            state.items = Arc::new(Vec::new());
            state.cursor = None;
            state.filters = filters.clone();
            state.locale = locale.to_string();
            state.error = None;
            state.failed = None;
            debug!("Reset to generation {}", state.generation);
            state.generation
        };

        self.run(generation, RequestKind::FirstPage, filters, locale.to_string())
            .await
    }

    /// Fetch and append the next page. Skipped unless ready with more to come.
    pub async fn load_next(&self) -> FetchOutcome {
        let (generation, kind, filters, locale) = {
            let mut state = self.state();
            let next_page = match (state.status, state.cursor) {
                (LoadStatus::Ready, Some(cursor)) if cursor.has_more => cursor.current_page + 1,
                _ => return FetchOutcome::Skipped,
            };
            let kind = RequestKind::NextPage(next_page);
            state.status = kind.loading_status();
            (state.generation, kind, state.filters.clone(), state.locale.clone())
        };

        self.run(generation, kind, filters, locale).await
    }

    /// Re-issue the request that failed. Accumulated items stay as they are
    /// until it succeeds.
    pub async fn retry(&self) -> FetchOutcome {
        let (generation, kind, filters, locale) = {
            let mut state = self.state();
            let kind = match (state.status, state.failed) {
                (LoadStatus::Errored, Some(kind)) => kind,
                _ => return FetchOutcome::Skipped,
            };
            state.status = kind.loading_status();
            state.error = None;
            (state.generation, kind, state.filters.clone(), state.locale.clone())
        };

        debug!("Retrying page {}", kind.page());
        self.run(generation, kind, filters, locale).await
    }

    async fn run(
        &self,
        generation: u64,
        kind: RequestKind,
        filters: FilterState,
        locale: String,
    ) -> FetchOutcome {
        let page = kind.page();
        let timeout = self.inner.timeout;
        debug!(
            "Fetching page {} from {} backend (generation {})",
            page,
            self.inner.backend.backend_name(),
            generation
        );

        let fetch = self
            .inner
            .backend
            .fetch_page(&filters, page, self.inner.page_size, &locale);
        let result = match tokio::time::timeout(timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(timeout)),
        };

        let mut state = self.state();
        if state.generation != generation {
            debug!(
                "Discarding page {} for generation {}, now at {}",
                page, generation, state.generation
            );
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(result_page) => {
                let fresh = result_page.items;
                let items = match kind {
                    RequestKind::FirstPage => fresh,
                    RequestKind::NextPage(_) => {
                        let mut merged = Vec::with_capacity(state.items.len() + fresh.len());
                        merged.extend(state.items.iter().cloned());
                        merged.extend(fresh);
                        merged
                    }
                };

                if result_page.skipped > 0 {
                    warn!("Page {} had {} unreadable listings", page, result_page.skipped);
                }
                if result_page.pagination.current_page != page {
                    warn!(
                        "Asked for page {} but backend answered page {}",
                        page, result_page.pagination.current_page
                    );
                }

                state.items = Arc::new(items);
                state.cursor = Some(result_page.pagination);
                state.status = LoadStatus::Ready;
                state.failed = None;
                debug!(
                    "Now holding {} listings (page {}/{})",
                    state.items.len(),
                    result_page.pagination.current_page,
                    result_page.pagination.last_page
                );
                FetchOutcome::Applied
            }
            Err(err) => {
                warn!("Fetching page {} failed: {}", page, err);
                state.status = LoadStatus::Errored;
                state.error = Some(err.clone());
                state.failed = Some(kind);
                FetchOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{FilterKey, FilterValue};
    use crate::models::ResultPage;
    use crate::search::MemoryBackend;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Map;
    use std::collections::HashMap;
    use tokio::sync::oneshot;

    fn listing(id: u64, status: &str) -> PropertyListing {
        PropertyListing {
            id,
            title: format!("Unit {id}"),
            price: "5000".to_string(),
            status: status.to_string(),
            area: None,
            bedroom: None,
            bathroom: None,
            sqt: None,
            property_locations: Vec::new(),
            extra: Map::new(),
        }
    }

    fn catalogue() -> MemoryBackend {
        MemoryBackend::new(
            (1..=25)
                .map(|id| listing(id, if id <= 20 { "rent" } else { "sale" }))
                .collect(),
        )
    }

    fn with_status(status: &str) -> FilterState {
        FilterState::defaults().with_field(FilterKey::Status, FilterValue::from(status))
    }

    fn controller<B: SearchBackend>(backend: B) -> PaginationController<B> {
        PaginationController::new(backend, 10, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn reset_loads_first_page() {
        let pager = controller(catalogue());
        assert_eq!(pager.status(), LoadStatus::Idle);

        assert_eq!(pager.reset(with_status("rent"), "en").await, FetchOutcome::Applied);
        assert_eq!(pager.status(), LoadStatus::Ready);
        assert_eq!(pager.items().len(), 10);
        assert!(pager.has_more());
    }

    #[tokio::test]
    async fn load_next_appends_until_exhausted() {
        let pager = controller(catalogue());
        pager.reset(FilterState::defaults(), "en").await;

        let mut pages = vec![pager.cursor().unwrap().current_page];
        let mut counts = vec![pager.items().len()];
        while pager.has_more() {
            assert_eq!(pager.load_next().await, FetchOutcome::Applied);
            pages.push(pager.cursor().unwrap().current_page);
            counts.push(pager.items().len());
        }

        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(counts, vec![10, 20, 25]);
        assert_eq!(pager.load_next().await, FetchOutcome::Skipped);
        assert_eq!(pager.items().len(), 25);

        let ids: Vec<u64> = pager.items().iter().map(|l| l.id).collect();
        assert_eq!(ids, (1..=25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn load_next_before_reset_is_skipped() {
        let pager = controller(catalogue());
        assert_eq!(pager.load_next().await, FetchOutcome::Skipped);
        assert!(pager.backend().requests().is_empty());
    }

    #[tokio::test]
    async fn appended_list_is_a_new_allocation() {
        let pager = controller(catalogue());
        pager.reset(FilterState::defaults(), "en").await;
        let before = pager.items();

        pager.load_next().await;
        assert_eq!(before.len(), 10);
        assert!(!Arc::ptr_eq(&before, &pager.items()));
    }

    #[tokio::test]
    async fn failure_then_retry_keeps_accumulated_items() {
        let pager = controller(catalogue());
        pager.reset(FilterState::defaults(), "en").await;

        pager
            .backend()
            .fail_next(SearchError::Status { status: 502, message: "Bad Gateway".into() });
        let outcome = pager.load_next().await;
        assert!(matches!(outcome, FetchOutcome::Failed(ref e) if e.status() == Some(502)));
        assert_eq!(pager.status(), LoadStatus::Errored);
        assert_eq!(pager.items().len(), 10);
        assert_eq!(pager.error().and_then(|e| e.status()), Some(502));

        assert_eq!(pager.load_next().await, FetchOutcome::Skipped);
        assert_eq!(pager.retry().await, FetchOutcome::Applied);
        assert_eq!(pager.items().len(), 20);
        assert_eq!(pager.cursor().unwrap().current_page, 2);
        assert!(pager.error().is_none());

        let pages: Vec<u32> = pager.backend().requests().iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn failed_reset_drops_results_for_previous_filters() {
        let pager = controller(catalogue());
        pager.reset(with_status("rent"), "en").await;
        pager.load_next().await;
        assert_eq!(pager.items().len(), 20);

        pager.backend().fail_next(SearchError::Transport("down".into()));
        let outcome = pager.reset(with_status("sale"), "en").await;

        assert_eq!(outcome, FetchOutcome::Failed(SearchError::Transport("down".into())));
        assert_eq!(pager.status(), LoadStatus::Errored);
        assert!(pager.items().is_empty());
        assert!(pager.cursor().is_none());
        assert!(!pager.has_more());

        assert_eq!(pager.retry().await, FetchOutcome::Applied);
        let items = pager.items();
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|l| l.status == "sale"));
    }

    #[tokio::test]
    async fn retry_outside_error_is_skipped() {
        let pager = controller(catalogue());
        pager.reset(FilterState::defaults(), "en").await;
        assert_eq!(pager.retry().await, FetchOutcome::Skipped);
    }

    /// Backend whose answers for a given status are held until released.
    #[derive(Default)]
    struct GatedBackend {
        gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    }

    impl GatedBackend {
        fn hold(&self, status: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(status.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl SearchBackend for GatedBackend {
        async fn fetch_page(
            &self,
            filters: &FilterState,
            page: u32,
            _page_size: u32,
            _locale: &str,
        ) -> Result<ResultPage, SearchError> {
            let status = filters.status().map(|s| s.to_string()).unwrap_or_default();
            let gate = self.gates.lock().unwrap().remove(&status);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(ResultPage {
                items: vec![listing(page as u64, &status)],
                pagination: PaginationCursor::new(page, 3, None),
                fetched_at: Utc::now(),
                skipped: 0,
            })
        }

        fn backend_name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn late_response_for_old_filters_is_discarded() {
        let backend = GatedBackend::default();
        let release_rent = backend.hold("rent");
        let pager = controller(backend);

        let slow = tokio::spawn({
            let pager = pager.clone();
            async move { pager.reset(with_status("rent"), "en").await }
        });
        while pager.generation() < 1 {
            tokio::task::yield_now().await;
        }

        assert_eq!(pager.reset(with_status("sale"), "en").await, FetchOutcome::Applied);
        release_rent.send(()).unwrap();

        assert_eq!(slow.await.unwrap(), FetchOutcome::Superseded);
        assert_eq!(pager.status(), LoadStatus::Ready);
        let items = pager.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, "sale");
    }

    #[tokio::test]
    async fn reset_supersedes_in_flight_load_more() {
        let backend = GatedBackend::default();
        let pager = controller(backend);
        pager.reset(with_status("rent"), "en").await;
        assert!(pager.has_more());

        let release_rent = pager.backend().hold("rent");
        let more = tokio::spawn({
            let pager = pager.clone();
            async move { pager.load_next().await }
        });
        while pager.status() != LoadStatus::LoadingMore {
            tokio::task::yield_now().await;
        }
        assert_eq!(pager.load_next().await, FetchOutcome::Skipped);

        assert_eq!(pager.reset(with_status("sale"), "en").await, FetchOutcome::Applied);
        release_rent.send(()).unwrap();

        assert_eq!(more.await.unwrap(), FetchOutcome::Superseded);
        let items = pager.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, "sale");
        assert_eq!(pager.cursor().unwrap().current_page, 1);
    }

    /// Never answers
    struct StuckBackend;

    #[async_trait]
    impl SearchBackend for StuckBackend {
        async fn fetch_page(
            &self,
            _filters: &FilterState,
            _page: u32,
            _page_size: u32,
            _locale: &str,
        ) -> Result<ResultPage, SearchError> {
            std::future::pending().await
        }

        fn backend_name(&self) -> &'static str {
            "stuck"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_fetch_times_out_into_errored() {
        let pager = PaginationController::new(StuckBackend, 10, Duration::from_secs(3));

        let outcome = pager.reset(FilterState::defaults(), "en").await;

        assert_eq!(outcome, FetchOutcome::Failed(SearchError::Timeout(Duration::from_secs(3))));
        assert_eq!(pager.status(), LoadStatus::Errored);
    }
}
