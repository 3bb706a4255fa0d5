use crate::filters::{FilterState, FilterValue};
use crate::models::{LookupItem, PaginationCursor, PropertyListing, ResultPage};
use crate::search::error::SearchError;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Everything needed to ask the backend for one page of listings
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub filters: FilterState,
    pub page: u32,
    pub page_size: u32,
    pub locale: String,
}

impl SearchRequest {
    pub fn new(filters: FilterState, page: u32, page_size: u32, locale: &str) -> Self {
        Self {
            filters,
            page: page.max(1),
            page_size: page_size.max(1),
            locale: locale.to_string(),
        }
    }

    /// Query string pairs in send order: filters first, then paging and locale.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = filter_query_pairs(&self.filters);
        pairs.push(("page".to_string(), self.page.to_string()));
        pairs.push(("per_page".to_string(), self.page_size.to_string()));
        pairs.push(("lang".to_string(), self.locale.clone()));
        pairs
    }
}

/// One pair per set scalar filter, one `key[]` pair per list entry.
/// Unset filters are simply absent: that is how the backend reads "any".
pub fn filter_query_pairs(filters: &FilterState) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(filters.len());
    for (key, value) in filters.iter() {
        match value {
            FilterValue::Text(text) => pairs.push((key.as_str().to_string(), text.clone())),
            FilterValue::Number(n) => pairs.push((key.as_str().to_string(), n.to_string())),
            FilterValue::List(ids) => {
                let name = format!("{}[]", key.as_str());
                pairs.extend(ids.iter().map(|id| (name.clone(), id.to_string())));
            }
        }
    }
    pairs
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    data: SearchData,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    properties: Vec<Value>,
    pagination: WirePagination,
}

#[derive(Debug, Deserialize)]
struct WirePagination {
    current_page: u32,
    last_page: u32,
    #[serde(default)]
    has_more_pages: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LookupEnvelope {
    #[serde(default)]
    data: Vec<LookupItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Decode a `GET /properties` body into a page.
///
/// A broken envelope fails the page. A single unreadable listing is
/// dropped and counted in [`ResultPage::skipped`].
pub fn decode_result_page(body: &str) -> Result<ResultPage, SearchError> {
    let envelope: SearchEnvelope = serde_json::from_str(body)?;
    let wire = envelope.data.pagination;

    let mut items = Vec::with_capacity(envelope.data.properties.len());
    let mut skipped = 0;
    for (index, raw) in envelope.data.properties.into_iter().enumerate() {
        match serde_json::from_value::<PropertyListing>(raw) {
            Ok(listing) => items.push(listing),
            Err(err) => {
                warn!("Skipping listing #{} on page {}: {}", index, wire.current_page, err);
                skipped += 1;
            }
        }
    }

    Ok(ResultPage {
        items,
        pagination: PaginationCursor::new(wire.current_page, wire.last_page, wire.has_more_pages),
        fetched_at: Utc::now(),
        skipped,
    })
}

/// Decode one of the `{data: [{id, name}]}` lookup bodies
pub fn decode_lookup(body: &str) -> Result<Vec<LookupItem>, SearchError> {
    let envelope: LookupEnvelope = serde_json::from_str(body)?;
    Ok(envelope.data)
}

/// `message` from a JSON error body, if there is one
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterKey;

    #[test]
    fn unset_filters_are_omitted() {
        let filters = FilterState::defaults()
            .with_field(FilterKey::Status, FilterValue::from("rent"))
            .with_field(FilterKey::Price, FilterValue::from(""))
            .with_field(FilterKey::TypeId, None::<FilterValue>);

        let pairs = filter_query_pairs(&filters);
        assert_eq!(pairs, vec![("status".to_string(), "rent".to_string())]);
    }

    #[test]
    fn lists_use_bracketed_repeated_keys() {
        let filters = FilterState::defaults()
            .with_field(FilterKey::AreaId, FilterValue::from(vec![7, 3]))
            .with_field(FilterKey::Bedrooms, FilterValue::from(2));

        let pairs = SearchRequest::new(filters, 2, 10, "ar").query_pairs();
        let expected: Vec<(String, String)> = [
            ("area_id[]", "7"),
            ("area_id[]", "3"),
            ("bedrooms", "2"),
            ("page", "2"),
            ("per_page", "10"),
            ("lang", "ar"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn decodes_page_and_derives_has_more() {
        let body = r#"{
            "data": {
                "properties": [
                    {"id": 1, "title": "Flat", "price": "5000", "status": "rent", "area": {"name": "Maadi"}},
                    {"id": 2, "title": "Villa", "price": 12000, "status": "rent", "area": null}
                ],
                "pagination": {"current_page": 1, "last_page": 3}
            }
        }"#;

        let page = decode_result_page(body).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].price, "12000");
        assert_eq!(page.pagination, PaginationCursor::new(1, 3, None));
        assert!(page.pagination.has_more);
        assert_eq!(page.skipped, 0);
    }

    #[test]
    fn server_has_more_flag_is_authoritative() {
        let body = r#"{"data": {"properties": [], "pagination": {"current_page": 1, "last_page": 3, "has_more_pages": false}}}"#;
        let page = decode_result_page(body).unwrap();
        assert!(!page.pagination.has_more);
        assert!(page.items.is_empty());
    }

    #[test]
    fn unreadable_listings_are_skipped_not_fatal() {
        let body = r#"{
            "data": {
                "properties": [
                    {"id": 1, "title": "Flat", "price": "5000", "status": "rent"},
                    {"id": "abc", "title": "Studio", "price": "3000", "status": "rent"},
                    {"id": 3, "title": {"en": "Villa"}, "price": "9000", "status": "rent"},
                    "not a listing"
                ],
                "pagination": {"current_page": 2, "last_page": 4}
            }
        }"#;

        let page = decode_result_page(body).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, 1);
        assert_eq!(page.skipped, 3);
        assert_eq!(page.pagination, PaginationCursor::new(2, 4, None));
    }

    #[test]
    fn missing_pagination_is_a_decode_error() {
        let err = decode_result_page(r#"{"data": {"properties": []}}"#).unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[test]
    fn lookup_and_error_bodies() {
        let items = decode_lookup(r#"{"data": [{"id": 1, "name": "Pool"}, {"id": 2, "name": "Gym"}]}"#).unwrap();
        assert_eq!(items[1].name, "Gym");

        assert_eq!(error_message(r#"{"message": "Server Error"}"#).as_deref(), Some("Server Error"));
        assert_eq!(error_message("<html>oops</html>"), None);
    }
}
