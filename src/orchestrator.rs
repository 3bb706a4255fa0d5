//! Ties filters, persistence, paging and the map together for one listing view.

use crate::filters::{FilterKey, FilterPersistence, FilterState, FilterSubscription, FilterValue, ViewId};
use crate::map::{MapSurface, MapSyncAdapter, SyncReport};
use crate::models::PropertyListing;
use crate::pagination::{FetchOutcome, LoadStatus, PaginationController};
use crate::search::{SearchBackend, SearchError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// What the view layer renders
#[derive(Debug, Clone)]
pub struct ListingView {
    pub items: Arc<Vec<PropertyListing>>,
    pub status: LoadStatus,
    pub has_more: bool,
    pub current_page: Option<u32>,
    pub error: Option<SearchError>,
    /// A fetch succeeded and matched nothing
    pub is_empty: bool,
}

struct PendingEdit {
    filters: FilterState,
    deadline: Instant,
}

pub struct ListingOrchestrator<B: SearchBackend, S: MapSurface> {
    view_id: ViewId,
    filters: FilterState,
    locale: String,
    persistence: FilterPersistence,
    subscription: FilterSubscription,
    controller: PaginationController<B>,
    map: MapSyncAdapter<S>,
    debounce: Duration,
    pending: Option<PendingEdit>,
    last_sync: Option<SyncReport>,
    /// Last item whose visibility already triggered a page load
    triggered_by: Option<u64>,
}

impl<B: SearchBackend, S: MapSurface> ListingOrchestrator<B, S> {
    /// Restore stored filters (or start from defaults), start listening to
    /// other views and load the first page.
    pub async fn mount(
        persistence: FilterPersistence,
        controller: PaginationController<B>,
        map: MapSyncAdapter<S>,
        locale: &str,
        debounce: Duration,
    ) -> Self {
        let view_id = ViewId::next();
        let filters = match persistence.load().await {
            Some(filters) => {
                info!("Restored {} stored filters", filters.len());
                filters
            }
            None => {
                info!("No stored filters, starting from defaults");
                FilterState::defaults()
            }
        };
        let subscription = persistence.subscribe(view_id);

        let mut orchestrator = Self {
            view_id,
            filters,
            locale: locale.to_string(),
            persistence,
            subscription,
            controller,
            map,
            debounce,
            pending: None,
            last_sync: None,
            triggered_by: None,
        };
        orchestrator.refresh().await;
        orchestrator
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn controller(&self) -> &PaginationController<B> {
        &self.controller
    }

    pub fn map(&self) -> &MapSyncAdapter<S> {
        &self.map
    }

    pub fn last_sync(&self) -> Option<&SyncReport> {
        self.last_sync.as_ref()
    }

    pub fn view(&self) -> ListingView {
        let snapshot = self.controller.snapshot();
        ListingView {
            is_empty: snapshot.status == LoadStatus::Ready && snapshot.items.is_empty(),
            has_more: snapshot.has_more(),
            current_page: snapshot.cursor.map(|c| c.current_page),
            items: snapshot.items,
            status: snapshot.status,
            error: snapshot.error,
        }
    }

    fn sync_map(&mut self) {
        let items = self.controller.items();
        self.last_sync = Some(self.map.sync_markers(&items, false));
    }

    fn after_fetch(&mut self, outcome: &FetchOutcome) {
        if *outcome == FetchOutcome::Applied {
            self.sync_map();
        }
    }

    async fn refresh(&mut self) -> FetchOutcome {
        self.triggered_by = None;
        let outcome = self.controller.reset(self.filters.clone(), &self.locale).await;
        match outcome {
            // The reset already emptied the list; take the old markers down too
            FetchOutcome::Applied | FetchOutcome::Failed(_) => self.sync_map(),
            FetchOutcome::Superseded | FetchOutcome::Skipped => {}
        }
        outcome
    }

    /// Filters the next edit builds on: the pending debounced snapshot if any
    fn edit_base(&self) -> &FilterState {
        self.pending
            .as_ref()
            .map(|p| &p.filters)
            .unwrap_or(&self.filters)
    }

    /// Make `next` the active filters: persist, tell other views, reload.
    /// A snapshot equal to the current one changes nothing.
    pub async fn replace_filters(&mut self, next: FilterState) -> FetchOutcome {
        self.pending = None;
        if next == self.filters {
            debug!("Filters unchanged, not reloading");
            return FetchOutcome::Skipped;
        }

        self.filters = next.clone();
        self.persistence.save(&next).await;
        self.persistence.publish(self.view_id, next);
        self.refresh().await
    }

    pub async fn set_filter(
        &mut self,
        key: FilterKey,
        value: impl Into<Option<FilterValue>>,
    ) -> FetchOutcome {
        let next = self.edit_base().with_field(key, value);
        self.replace_filters(next).await
    }

    pub async fn toggle_filter_item(&mut self, key: FilterKey, id: i64) -> FetchOutcome {
        let next = self.edit_base().toggle_list_item(key, id);
        self.replace_filters(next).await
    }

    pub async fn clear_filters(&mut self) -> FetchOutcome {
        self.replace_filters(FilterState::defaults()).await
    }

    /// Queue an edit and restart the debounce window; see [`Self::settle`].
    pub fn set_filter_debounced(&mut self, key: FilterKey, value: impl Into<Option<FilterValue>>) {
        let filters = self.edit_base().with_field(key, value);
        self.pending = Some(PendingEdit {
            filters,
            deadline: Instant::now() + self.debounce,
        });
    }

    pub fn has_pending_edit(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait out the debounce window, then apply the queued edits as one change
    pub async fn settle(&mut self) -> FetchOutcome {
        let Some(deadline) = self.pending.as_ref().map(|p| p.deadline) else {
            return FetchOutcome::Skipped;
        };
        tokio::time::sleep_until(deadline).await;

        match self.pending.take() {
            Some(pending) => self.replace_filters(pending.filters).await,
            None => FetchOutcome::Skipped,
        }
    }

    pub async fn set_locale(&mut self, locale: &str) -> FetchOutcome {
        if locale == self.locale {
            return FetchOutcome::Skipped;
        }
        info!("Switching locale {} -> {}", self.locale, locale);
        self.locale = locale.to_string();
        self.refresh().await
    }

    async fn adopt_remote(&mut self, filters: FilterState) -> FetchOutcome {
        if filters == self.filters {
            return FetchOutcome::Skipped;
        }
        debug!("Adopting filters broadcast by another view");
        self.pending = None;
        self.filters = filters;
        self.refresh().await
    }

    /// Wait for another view to change the filters and follow it.
    /// Returns `false` once unsubscribed.
    pub async fn next_remote_update(&mut self) -> bool {
        match self.subscription.recv().await {
            Some(filters) => {
                self.adopt_remote(filters).await;
                true
            }
            None => false,
        }
    }

    /// Follow the newest pending broadcast, if there is one, without waiting
    pub async fn poll_remote(&mut self) -> Option<FetchOutcome> {
        let filters = self.subscription.try_recv()?;
        Some(self.adopt_remote(filters).await)
    }

    pub async fn load_next(&mut self) -> FetchOutcome {
        let outcome = self.controller.load_next().await;
        self.after_fetch(&outcome);
        outcome
    }

    /// Viewport-intersection hook: loads the next page the first time the
    /// current last item becomes visible, and ignores every other call.
    pub async fn on_item_visible(&mut self, listing_id: u64) -> FetchOutcome {
        let is_last = self.controller.items().last().map(|l| l.id) == Some(listing_id);
        if !is_last || self.triggered_by == Some(listing_id) {
            return FetchOutcome::Skipped;
        }

        self.triggered_by = Some(listing_id);
        self.load_next().await
    }

    pub async fn retry(&mut self) -> FetchOutcome {
        let outcome = self.controller.retry().await;
        self.after_fetch(&outcome);
        outcome
    }

    /// Stop following other views. Safe to call more than once.
    pub fn unmount(&mut self) {
        self.pending = None;
        self.subscription.unsubscribe();
    }
}
