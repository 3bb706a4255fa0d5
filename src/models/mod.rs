mod lenient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use lenient::{coordinate_value, non_null_default, opt_f64, opt_u32, string_or_number};

/// Area (neighbourhood / compound) a listing belongs to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Area {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub name: String,
}

/// One pinned location of a property.
///
/// Coordinates are kept as raw JSON because backends send them as numbers,
/// numeric strings or garbage; resolution happens in the map adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PropertyLocation {
    #[serde(default)]
    pub latitude: Value,
    #[serde(default)]
    pub longitude: Value,
}

/// A property as returned by the search endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyListing {
    pub id: u64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub status: String,
    #[serde(default)]
    pub area: Option<Area>,
    #[serde(default, deserialize_with = "opt_u32")]
    pub bedroom: Option<u32>,
    #[serde(default, deserialize_with = "opt_u32")]
    pub bathroom: Option<u32>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub sqt: Option<f64>,
    #[serde(default, deserialize_with = "non_null_default")]
    pub property_locations: Vec<PropertyLocation>,
    /// Everything else the backend sent (images, slug, currency, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PropertyListing {
    pub fn area_name(&self) -> Option<&str> {
        self.area
            .as_ref()
            .map(|a| a.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// Where a result page sits in the overall result set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationCursor {
    pub current_page: u32,
    pub last_page: u32,
    pub has_more: bool,
}

impl PaginationCursor {
    /// Build a cursor from server metadata. The server's `has_more_pages`
    /// flag wins over the page arithmetic when present.
    pub fn new(current_page: u32, last_page: u32, server_has_more: Option<bool>) -> Self {
        let current_page = current_page.max(1);
        let last_page = last_page.max(1);
        Self {
            current_page,
            last_page,
            has_more: server_has_more.unwrap_or(current_page < last_page),
        }
    }
}

/// One fetched page of listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPage {
    pub items: Vec<PropertyListing>,
    pub pagination: PaginationCursor,
    pub fetched_at: DateTime<Utc>,
    /// Items in the response that could not be read as listings
    #[serde(default)]
    pub skipped: usize,
}

/// `{id, name}` entry from the area / property-type / amenity lookups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupItem {
    pub id: u64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_decodes_loose_backend_types() {
        let listing: PropertyListing = serde_json::from_value(json!({
            "id": 42,
            "title": "Villa in Zayed",
            "price": 5000,
            "status": "rent",
            "area": {"id": 3, "name": "Sheikh Zayed"},
            "bedroom": "3",
            "bathroom": 2,
            "sqt": "180.5",
            "property_locations": null,
            "slug": "villa-in-zayed"
        }))
        .unwrap();

        assert_eq!(listing.price, "5000");
        assert_eq!(listing.bedroom, Some(3));
        assert_eq!(listing.bathroom, Some(2));
        assert_eq!(listing.sqt, Some(180.5));
        assert!(listing.property_locations.is_empty());
        assert_eq!(listing.area_name(), Some("Sheikh Zayed"));
        assert_eq!(listing.extra.get("slug"), Some(&json!("villa-in-zayed")));
    }

    #[test]
    fn cursor_prefers_server_flag() {
        let derived = PaginationCursor::new(1, 3, None);
        assert!(derived.has_more);

        let overridden = PaginationCursor::new(1, 3, Some(false));
        assert!(!overridden.has_more);

        let clamped = PaginationCursor::new(0, 0, None);
        assert_eq!(clamped.current_page, 1);
        assert_eq!(clamped.last_page, 1);
        assert!(!clamped.has_more);
    }
}
