use crate::filters::state::FilterState;
use crate::filters::store::{FilterStore, MemoryStore};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

/// Key the latest snapshot is stored under
pub const FILTERS_KEY: &str = "filters";

const BROADCAST_CAPACITY: usize = 16;

/// Identity of a mounted view, used to ignore our own broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(u64);

impl ViewId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ViewId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A filter change announced by one view to the others
#[derive(Debug, Clone)]
pub struct FilterBroadcast {
    pub origin: ViewId,
    pub state: FilterState,
}

struct Inner {
    store: Box<dyn FilterStore>,
    key: String,
    last_saved: Mutex<Option<FilterState>>,
    degraded: AtomicBool,
    sender: broadcast::Sender<FilterBroadcast>,
}

/// Single owner of the persisted filters and of the cross-view channel.
///
/// Clones share the store and the channel, so every mounted view reads and
/// writes through the same seam. Storage failures never reach the caller:
/// the last saved snapshot is kept in memory and served instead.
#[derive(Clone)]
pub struct FilterPersistence {
    inner: Arc<Inner>,
}

impl FilterPersistence {
    pub fn new(store: impl FilterStore + 'static) -> Self {
        Self::with_key(store, FILTERS_KEY)
    }

    pub fn with_key(store: impl FilterStore + 'static, key: &str) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store: Box::new(store),
                key: key.to_string(),
                last_saved: Mutex::new(None),
                degraded: AtomicBool::new(false),
                sender,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// True once the store has failed and snapshots live only in memory
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::Relaxed)
    }

    fn remembered(&self) -> Option<FilterState> {
        self.inner
            .last_saved
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    fn remember(&self, state: &FilterState) {
        if let Ok(mut guard) = self.inner.last_saved.lock() {
            *guard = Some(state.clone());
        }
    }

    fn mark_degraded(&self, reason: impl std::fmt::Display) {
        if !self.inner.degraded.swap(true, Ordering::Relaxed) {
            warn!(
                "Filter storage ({}) unavailable, keeping filters in memory: {}",
                self.inner.store.store_name(),
                reason
            );
        }
    }

    /// Latest stored snapshot. Absent or malformed data is `None`, never an error.
    pub async fn load(&self) -> Option<FilterState> {
        if self.is_degraded() {
            return self.remembered();
        }

        match self.inner.store.get(&self.inner.key).await {
            Ok(Some(raw)) => match FilterState::from_json(&raw) {
                Ok(state) => {
                    debug!("Loaded {} stored filters", state.len());
                    Some(state)
                }
                Err(err) => {
                    info!("Stored filters are malformed, ignoring them: {}", err);
                    None
                }
            },
            Ok(None) => self.remembered(),
            Err(err) => {
                self.mark_degraded(err);
                self.remembered()
            }
        }
    }

    /// Store `state` as the latest snapshot. Failures only degrade persistence.
    pub async fn save(&self, state: &FilterState) {
        self.remember(state);

        let raw = match state.to_json() {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Could not serialize filters: {}", err);
                return;
            }
        };

        match self.inner.store.set(&self.inner.key, &raw).await {
            Ok(()) => {
                if self.inner.degraded.swap(false, Ordering::Relaxed) {
                    info!("Filter storage recovered");
                }
            }
            Err(err) => self.mark_degraded(err),
        }
    }

    /// Announce a new snapshot to every other subscribed view
    pub fn publish(&self, origin: ViewId, state: FilterState) {
        match self.inner.sender.send(FilterBroadcast { origin, state }) {
            Ok(receivers) => debug!("Broadcast filters from {:?} to {} receivers", origin, receivers),
            Err(_) => debug!("No views listening for filter broadcasts"),
        }
    }

    pub fn subscribe(&self, view: ViewId) -> FilterSubscription {
        FilterSubscription {
            view,
            receiver: Some(self.inner.sender.subscribe()),
        }
    }
}

/// Receiving end of the filter broadcast for one view.
///
/// Dropping it unsubscribes as well.
pub struct FilterSubscription {
    view: ViewId,
    receiver: Option<broadcast::Receiver<FilterBroadcast>>,
}

impl FilterSubscription {
    pub fn view(&self) -> ViewId {
        self.view
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Wait for the next snapshot broadcast by another view.
    /// `None` once unsubscribed or the channel is gone.
    pub async fn recv(&mut self) -> Option<FilterState> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(msg) if msg.origin == self.view => continue,
                Ok(msg) => return Some(msg.state),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} filter broadcasts, jumping to the newest", skipped);
                    if let Some(latest) = self.try_recv() {
                        return Some(latest);
                    }
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Newest pending snapshot from another view, without waiting
    pub fn try_recv(&mut self) -> Option<FilterState> {
        let mut latest = None;
        loop {
            let Some(receiver) = self.receiver.as_mut() else {
                return latest;
            };
            match receiver.try_recv() {
                Ok(msg) if msg.origin == self.view => {}
                Ok(msg) => latest = Some(msg.state),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) => return latest,
                Err(TryRecvError::Closed) => {
                    self.receiver = None;
                    return latest;
                }
            }
        }
    }

    /// Stop listening. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            debug!("View {:?} unsubscribed from filter broadcasts", self.view);
        }
    }
}
