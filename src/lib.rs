//! Property search and listing pipeline.
//!
//! Filters are immutable snapshots ([`filters::FilterState`]) persisted and
//! shared between views through [`filters::FilterPersistence`]. A
//! [`pagination::PaginationController`] pages through a
//! [`search::SearchBackend`] and the [`orchestrator::ListingOrchestrator`]
//! keeps the result list and the map markers in step with the filters.

pub mod config;
pub mod filters;
pub mod map;
pub mod models;
pub mod orchestrator;
pub mod pagination;
pub mod search;

pub use config::Config;
pub use orchestrator::{ListingOrchestrator, ListingView};
pub use pagination::{FetchOutcome, LoadStatus, PaginationController};
