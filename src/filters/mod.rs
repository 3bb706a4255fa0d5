pub mod persistence;
pub mod state;
pub mod store;

pub use persistence::{FilterBroadcast, FilterPersistence, FilterSubscription, ViewId, FILTERS_KEY};
pub use state::{FilterKey, FilterState, FilterValue, ListingStatus};
pub use store::{FileStore, FilterStore, MemoryStore, PersistenceError};
