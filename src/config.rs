use crate::map::{CoordinatePolicy, LatLng};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not valid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to read .env: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

/// Runtime settings, read from the environment (and an optional `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend root, e.g. `https://api.example.com/api/`
    pub api_base_url: Option<Url>,
    pub locale: String,
    pub page_size: u32,
    /// Per-request HTTP timeout, also the controller's fetch timeout
    pub request_timeout: Duration,
    pub filter_debounce: Duration,
    pub store_dir: PathBuf,
    /// Invent coordinates for listings without any. Demo data only.
    pub map_demo_coordinates: bool,
    pub map_demo_center: LatLng,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            locale: "en".to_string(),
            page_size: 10,
            request_timeout: Duration::from_secs(30),
            filter_debounce: Duration::from_millis(500),
            store_dir: PathBuf::from(".listing-store"),
            map_demo_coordinates: false,
            map_demo_center: LatLng::new(30.0444, 31.2357),
        }
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_center(name: &'static str, raw: &str) -> Result<LatLng, ConfigError> {
    let invalid = || ConfigError::Invalid {
        name,
        reason: format!("expected 'lat,lng', got '{raw}'"),
    };
    let (lat, lng) = raw.split_once(',').ok_or_else(invalid)?;
    let point = LatLng::new(
        lat.trim().parse().map_err(|_| invalid())?,
        lng.trim().parse().map_err(|_| invalid())?,
    );
    if point.is_valid() {
        Ok(point)
    } else {
        Err(invalid())
    }
}

impl Config {
    /// Load `.env` if there is one, then read the process environment
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) | Err(dotenvy::Error::Io(_)) => {}
            Err(err) => return Err(err.into()),
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset variables keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(raw) = lookup("LISTING_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.api_base_url = Some(parse("LISTING_API_BASE_URL", &raw)?);
        }
        if let Some(raw) = lookup("LISTING_LOCALE").filter(|v| !v.trim().is_empty()) {
            config.locale = raw.trim().to_string();
        }
        if let Some(raw) = lookup("LISTING_PAGE_SIZE") {
            config.page_size = parse("LISTING_PAGE_SIZE", &raw)?;
            if config.page_size == 0 {
                return Err(ConfigError::Invalid {
                    name: "LISTING_PAGE_SIZE",
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if let Some(raw) = lookup("LISTING_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse("LISTING_REQUEST_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = lookup("LISTING_FILTER_DEBOUNCE_MS") {
            config.filter_debounce = Duration::from_millis(parse("LISTING_FILTER_DEBOUNCE_MS", &raw)?);
        }
        if let Some(raw) = lookup("LISTING_STORE_DIR").filter(|v| !v.trim().is_empty()) {
            config.store_dir = PathBuf::from(raw.trim());
        }
        if let Some(raw) = lookup("LISTING_MAP_DEMO_COORDINATES") {
            config.map_demo_coordinates = parse_bool("LISTING_MAP_DEMO_COORDINATES", &raw)?;
        }
        if let Some(raw) = lookup("LISTING_MAP_DEMO_CENTER") {
            config.map_demo_center = parse_center("LISTING_MAP_DEMO_CENTER", &raw)?;
        }

        Ok(config)
    }

    pub fn coordinate_policy(&self) -> CoordinatePolicy {
        if self.map_demo_coordinates {
            CoordinatePolicy::DemoFallback {
                center: self.map_demo_center,
                spread: 0.05,
            }
        } else {
            CoordinatePolicy::SkipMissing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = from_pairs(&[]).unwrap();
        assert!(config.api_base_url.is_none());
        assert_eq!(config.page_size, 10);
        assert_eq!(config.locale, "en");
        assert_eq!(config.coordinate_policy(), CoordinatePolicy::SkipMissing);
    }

    #[test]
    fn reads_every_variable() {
        let config = from_pairs(&[
            ("LISTING_API_BASE_URL", "https://backend.example/api/"),
            ("LISTING_LOCALE", "ar"),
            ("LISTING_PAGE_SIZE", "24"),
            ("LISTING_REQUEST_TIMEOUT_SECS", "5"),
            ("LISTING_FILTER_DEBOUNCE_MS", "250"),
            ("LISTING_STORE_DIR", "/tmp/listings"),
            ("LISTING_MAP_DEMO_COORDINATES", "true"),
            ("LISTING_MAP_DEMO_CENTER", "25.2, 55.27"),
        ])
        .unwrap();

        assert_eq!(config.api_base_url.as_ref().unwrap().as_str(), "https://backend.example/api/");
        assert_eq!(config.locale, "ar");
        assert_eq!(config.page_size, 24);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.filter_debounce, Duration::from_millis(250));
        assert_eq!(config.store_dir, PathBuf::from("/tmp/listings"));
        assert_eq!(
            config.coordinate_policy(),
            CoordinatePolicy::DemoFallback {
                center: LatLng::new(25.2, 55.27),
                spread: 0.05
            }
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            from_pairs(&[("LISTING_PAGE_SIZE", "ten")]),
            Err(ConfigError::Invalid { name: "LISTING_PAGE_SIZE", .. })
        ));
        assert!(from_pairs(&[("LISTING_PAGE_SIZE", "0")]).is_err());
        assert!(from_pairs(&[("LISTING_API_BASE_URL", "not a url")]).is_err());
        assert!(from_pairs(&[("LISTING_MAP_DEMO_COORDINATES", "maybe")]).is_err());
        assert!(from_pairs(&[("LISTING_MAP_DEMO_CENTER", "200,10")]).is_err());
    }
}
