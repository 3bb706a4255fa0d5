use crate::filters::{FilterKey, FilterState, FilterValue};
use crate::models::{PaginationCursor, PropertyListing, ResultPage};
use crate::search::error::SearchError;
use crate::search::traits::SearchBackend;
use crate::search::types::SearchRequest;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// Serves listings from memory, applying the filters the way the backend does.
///
/// Every request is recorded and failures can be queued up front.
#[derive(Default)]
pub struct MemoryBackend {
    listings: Vec<PropertyListing>,
    failures: Mutex<VecDeque<SearchError>>,
    requests: Mutex<Vec<SearchRequest>>,
}

fn number(value: &FilterValue) -> Option<f64> {
    match value {
        FilterValue::Number(n) => Some(*n as f64),
        FilterValue::Text(s) => s.trim().parse().ok(),
        FilterValue::List(_) => None,
    }
}

fn matches(listing: &PropertyListing, filters: &FilterState) -> bool {
    let price: Option<f64> = listing.price.trim().parse().ok();

    filters.iter().all(|(key, value)| match key {
        FilterKey::Status => matches!(value, FilterValue::Text(s) if *s == listing.status),
        FilterKey::Price => match (price, number(value)) {
            (Some(p), Some(min)) => p >= min,
            _ => false,
        },
        FilterKey::DownPrice => match (price, number(value)) {
            (Some(p), Some(max)) => p <= max,
            _ => false,
        },
        FilterKey::AreaId => match (value, listing.area.as_ref().and_then(|a| a.id)) {
            (FilterValue::List(ids), Some(area)) => ids.iter().any(|id| *id as u64 == area),
            _ => false,
        },
        FilterKey::Bedrooms => number(value) == listing.bedroom.map(f64::from),
        FilterKey::Bathrooms => number(value) == listing.bathroom.map(f64::from),
        FilterKey::SpaceMin => matches!((listing.sqt, number(value)), (Some(s), Some(min)) if s >= min),
        FilterKey::SpaceMax => matches!((listing.sqt, number(value)), (Some(s), Some(max)) if s <= max),
        // Not carried on the listing summary
        FilterKey::TypeId | FilterKey::Amenities | FilterKey::PaymentMethod | FilterKey::Furnishing => true,
    })
}

impl MemoryBackend {
    pub fn new(listings: Vec<PropertyListing>) -> Self {
        Self {
            listings,
            ..Self::default()
        }
    }

    /// Make the next fetch fail with `error`
    pub fn fail_next(&self, error: SearchError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn fetch_page(
        &self,
        filters: &FilterState,
        page: u32,
        page_size: u32,
        locale: &str,
    ) -> Result<ResultPage, SearchError> {
        let request = SearchRequest::new(filters.clone(), page, page_size, locale);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(err) = self.failures.lock().ok().and_then(|mut f| f.pop_front()) {
            debug!("Failing request for page {}: {}", page, err);
            return Err(err);
        }

        let matching: Vec<&PropertyListing> = self
            .listings
            .iter()
            .filter(|l| matches(l, filters))
            .collect();

        let per_page = request.page_size as usize;
        let last_page = matching.len().div_ceil(per_page).max(1) as u32;
        let items = matching
            .into_iter()
            .skip((request.page as usize - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();

        Ok(ResultPage {
            items,
            pagination: PaginationCursor::new(request.page, last_page, None),
            fetched_at: Utc::now(),
            skipped: 0,
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Area;
    use serde_json::Map;

    fn listing(id: u64, status: &str, price: &str, area: u64) -> PropertyListing {
        PropertyListing {
            id,
            title: format!("Unit {id}"),
            price: price.to_string(),
            status: status.to_string(),
            area: Some(Area {
                id: Some(area),
                name: format!("Area {area}"),
            }),
            bedroom: Some(2),
            bathroom: Some(1),
            sqt: Some(120.0),
            property_locations: Vec::new(),
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn filters_and_paginates() {
        let backend = MemoryBackend::new(
            (1..=25)
                .map(|id| listing(id, if id % 5 == 0 { "sale" } else { "rent" }, "6000", id % 2))
                .collect(),
        );
        let rent = FilterState::defaults()
            .with_field(FilterKey::Status, FilterValue::from("rent"))
            .with_field(FilterKey::Price, FilterValue::from("5000"));

        let page = backend.fetch_page(&rent, 2, 10, "en").await.unwrap();
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.pagination, PaginationCursor::new(2, 2, None));
        assert!(page.items.iter().all(|l| l.status == "rent"));

        let too_cheap = rent.with_field(FilterKey::DownPrice, FilterValue::from(1000));
        let empty = backend.fetch_page(&too_cheap, 1, 10, "en").await.unwrap();
        assert!(empty.items.is_empty());
        assert_eq!(empty.pagination.last_page, 1);

        let by_area = FilterState::defaults().with_field(FilterKey::AreaId, FilterValue::from(vec![0]));
        let page = backend.fetch_page(&by_area, 1, 50, "en").await.unwrap();
        assert_eq!(page.items.len(), 12);
    }

    #[tokio::test]
    async fn queued_failures_come_first() {
        let backend = MemoryBackend::new(vec![listing(1, "rent", "10", 1)]);
        backend.fail_next(SearchError::Transport("connection reset".into()));

        assert!(backend.fetch_page(&FilterState::defaults(), 1, 10, "en").await.is_err());
        assert!(backend.fetch_page(&FilterState::defaults(), 1, 10, "en").await.is_ok());
        assert_eq!(backend.requests().len(), 2);
    }
}
