use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Every filter the listing search understands.
///
/// Wire names are the backend's query parameter names. Declaration order is
/// also application order when a stored snapshot is rebuilt, so `Status`
/// must stay first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    Status,
    Price,
    DownPrice,
    AreaId,
    TypeId,
    Bedrooms,
    Bathrooms,
    SpaceMin,
    SpaceMax,
    Amenities,
    PaymentMethod,
    Furnishing,
}

impl FilterKey {
    pub const ALL: [FilterKey; 12] = [
        FilterKey::Status,
        FilterKey::Price,
        FilterKey::DownPrice,
        FilterKey::AreaId,
        FilterKey::TypeId,
        FilterKey::Bedrooms,
        FilterKey::Bathrooms,
        FilterKey::SpaceMin,
        FilterKey::SpaceMax,
        FilterKey::Amenities,
        FilterKey::PaymentMethod,
        FilterKey::Furnishing,
    ];

    /// Only meaningful for residential searches
    pub const ROOM_FIELDS: [FilterKey; 2] = [FilterKey::Bedrooms, FilterKey::Bathrooms];
    /// Only meaningful for commercial searches
    pub const SPACE_FIELDS: [FilterKey; 2] = [FilterKey::SpaceMin, FilterKey::SpaceMax];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::Status => "status",
            FilterKey::Price => "price",
            FilterKey::DownPrice => "down_price",
            FilterKey::AreaId => "area_id",
            FilterKey::TypeId => "type_id",
            FilterKey::Bedrooms => "bedrooms",
            FilterKey::Bathrooms => "bathrooms",
            FilterKey::SpaceMin => "space_min",
            FilterKey::SpaceMax => "space_max",
            FilterKey::Amenities => "amenities",
            FilterKey::PaymentMethod => "payment_method",
            FilterKey::Furnishing => "furnishing",
        }
    }

    /// Multi-select keys hold a list of identifiers.
    pub fn is_list(&self) -> bool {
        matches!(self, FilterKey::AreaId | FilterKey::Amenities)
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown filter key: {s}"))
    }
}

/// Listing category. The two commercial variants swap the room filters for
/// the space filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    Sale,
    Rent,
    CommercialSale,
    CommercialRent,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Sale => "sale",
            ListingStatus::Rent => "rent",
            ListingStatus::CommercialSale => "commercial-sale",
            ListingStatus::CommercialRent => "commercial-rent",
        }
    }

    pub fn is_commercial(&self) -> bool {
        matches!(
            self,
            ListingStatus::CommercialSale | ListingStatus::CommercialRent
        )
    }
}

impl FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sale" => Ok(ListingStatus::Sale),
            "rent" => Ok(ListingStatus::Rent),
            "commercial-sale" => Ok(ListingStatus::CommercialSale),
            "commercial-rent" => Ok(ListingStatus::CommercialRent),
            other => Err(format!("unknown listing status: {other}")),
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a single filter. Absence from the state means "no constraint".
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(i64),
    Text(String),
    List(Vec<i64>),
}

impl FilterValue {
    /// Lenient conversion from stored JSON. `None` means "unset".
    fn from_json(value: &Value) -> Option<FilterValue> {
        match value {
            Value::String(s) => Some(FilterValue::Text(s.clone())),
            Value::Number(n) => Some(
                n.as_i64()
                    .map(FilterValue::Number)
                    .unwrap_or_else(|| FilterValue::Text(n.to_string())),
            ),
            Value::Array(items) => Some(FilterValue::List(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Number(n) => n.as_i64(),
                        Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<Vec<i64>> for FilterValue {
    fn from(value: Vec<i64>) -> Self {
        FilterValue::List(value)
    }
}

impl From<ListingStatus> for FilterValue {
    fn from(value: ListingStatus) -> Self {
        FilterValue::Text(value.as_str().to_string())
    }
}

enum Normalized {
    Set(FilterValue),
    Unset,
    Rejected(&'static str),
}

fn normalize(key: FilterKey, value: Option<FilterValue>) -> Normalized {
    let Some(value) = value else {
        return Normalized::Unset;
    };

    match (value, key.is_list()) {
        (FilterValue::Text(s), _) if s.trim().is_empty() => Normalized::Unset,
        (FilterValue::Text(s), _) if key == FilterKey::Status => match s.parse::<ListingStatus>() {
            Ok(status) => Normalized::Set(status.into()),
            Err(_) => Normalized::Unset,
        },
        (FilterValue::Number(_), _) if key == FilterKey::Status => {
            Normalized::Rejected("status must be text")
        }
        (FilterValue::Text(s), true) => match s.trim().parse::<i64>() {
            Ok(id) => Normalized::Set(FilterValue::List(vec![id])),
            Err(_) => Normalized::Rejected("list filters hold numeric ids"),
        },
        (FilterValue::Text(s), false) => Normalized::Set(FilterValue::Text(s.trim().to_string())),
        (FilterValue::Number(n), true) => Normalized::Set(FilterValue::List(vec![n])),
        (FilterValue::Number(n), false) => Normalized::Set(FilterValue::Number(n)),
        (FilterValue::List(_), false) => Normalized::Rejected("scalar filter given a list"),
        (FilterValue::List(ids), true) => {
            let mut unique = Vec::with_capacity(ids.len());
            for id in ids {
                if !unique.contains(&id) {
                    unique.push(id);
                }
            }
            if unique.is_empty() {
                Normalized::Unset
            } else {
                Normalized::Set(FilterValue::List(unique))
            }
        }
    }
}

/// Immutable snapshot of the active search criteria.
///
/// Every edit returns a new snapshot. The room pair and the space pair are
/// never both present: which one applies follows from `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    fields: BTreeMap<FilterKey, FilterValue>,
}

impl FilterState {
    /// No constraints at all
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Build a snapshot by applying each pair through [`FilterState::with_field`].
    pub fn create<I, V>(defaults: I) -> Self
    where
        I: IntoIterator<Item = (FilterKey, V)>,
        V: Into<FilterValue>,
    {
        let mut pairs: Vec<(FilterKey, FilterValue)> =
            defaults.into_iter().map(|(k, v)| (k, v.into())).collect();
        pairs.sort_by_key(|(k, _)| *k);

        pairs
            .into_iter()
            .fold(Self::default(), |state, (key, value)| state.with_field(key, value))
    }

    pub fn get(&self, key: FilterKey) -> Option<&FilterValue> {
        self.fields.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &FilterValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn status(&self) -> Option<ListingStatus> {
        match self.fields.get(&FilterKey::Status) {
            Some(FilterValue::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn is_commercial(&self) -> bool {
        self.status().is_some_and(|s| s.is_commercial())
    }

    /// Keys that are ignored under the current category.
    fn inapplicable(&self) -> [FilterKey; 2] {
        if self.is_commercial() {
            FilterKey::ROOM_FIELDS
        } else {
            FilterKey::SPACE_FIELDS
        }
    }

    /// Return a snapshot with `key` set to `value`.
    ///
    /// `None`, blank text and empty lists unset the key. Setting `status`
    /// drops whichever of the room/space pairs no longer applies.
    #[must_use]
    pub fn with_field(&self, key: FilterKey, value: impl Into<Option<FilterValue>>) -> Self {
        let value = match normalize(key, value.into()) {
            Normalized::Rejected(reason) => {
                warn!("Ignoring value for filter '{}': {}", key, reason);
                return self.clone();
            }
            Normalized::Set(v) => Some(v),
            Normalized::Unset => None,
        };

        if value.is_some() && self.inapplicable().contains(&key) {
            debug!(
                "Filter '{}' does not apply to status {:?}, ignoring",
                key,
                self.status()
            );
            return self.clone();
        }

        let mut next = self.clone();
        match value {
            Some(v) => {
                next.fields.insert(key, v);
            }
            None => {
                next.fields.remove(&key);
            }
        }

        if key == FilterKey::Status {
            for stale in next.inapplicable() {
                next.fields.remove(&stale);
            }
        }

        next
    }

    #[must_use]
    pub fn clear_fields(&self, keys: &[FilterKey]) -> Self {
        let mut next = self.clone();
        for key in keys {
            next.fields.remove(key);
        }
        next
    }

    /// Add `id` to a list filter, or remove it when already selected.
    /// New ids go to the end so display order follows selection order.
    #[must_use]
    pub fn toggle_list_item(&self, key: FilterKey, id: i64) -> Self {
        if !key.is_list() {
            warn!("Filter '{}' is not a list, cannot toggle {}", key, id);
            return self.clone();
        }

        let mut ids = match self.fields.get(&key) {
            Some(FilterValue::List(ids)) => ids.clone(),
            _ => Vec::new(),
        };
        match ids.iter().position(|existing| *existing == id) {
            Some(pos) => {
                ids.remove(pos);
            }
            None => ids.push(id),
        }

        self.with_field(key, FilterValue::List(ids))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored snapshot. Unknown keys and null values are dropped and
    /// a scalar `area_id` from older snapshots becomes a one-element list.
    /// Only non-JSON or non-object input is an error.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    fn from_json_map(map: &Map<String, Value>) -> Self {
        for unknown in map.keys().filter(|k| k.parse::<FilterKey>().is_err()) {
            debug!("Dropping unknown stored filter '{}'", unknown);
        }

        FilterKey::ALL.into_iter().fold(Self::default(), |state, key| {
            match map.get(key.as_str()).and_then(FilterValue::from_json) {
                Some(value) => state.with_field(key, value),
                None => state,
            }
        })
    }
}

impl Serialize for FilterState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key.as_str(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FilterState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_json_map(&map))
    }
}
