use crate::models::{coordinate_value, PropertyLocation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Parse a backend location pin, `None` unless both halves are usable
    pub fn from_location(location: &PropertyLocation) -> Option<Self> {
        let point = LatLng::new(
            coordinate_value(&location.latitude)?,
            coordinate_value(&location.longitude)?,
        );
        point.is_valid().then_some(point)
    }
}

/// Smallest box containing a set of points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LatLng>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;

        Some(points.fold(
            Bounds {
                south_west: first,
                north_east: first,
            },
            |b, p| Bounds {
                south_west: LatLng::new(b.south_west.lat.min(p.lat), b.south_west.lng.min(p.lng)),
                north_east: LatLng::new(b.north_east.lat.max(p.lat), b.north_east.lng.max(p.lng)),
            },
        ))
    }

    pub fn contains(&self, point: &LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&point.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&point.lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn location_accepts_numbers_and_numeric_strings() {
        let loc = PropertyLocation {
            latitude: json!("30.0444"),
            longitude: json!(31.2357),
        };
        assert_eq!(LatLng::from_location(&loc), Some(LatLng::new(30.0444, 31.2357)));
    }

    #[test]
    fn location_rejects_garbage_and_out_of_range() {
        let garbage = PropertyLocation {
            latitude: json!("north"),
            longitude: json!(31.2),
        };
        let out_of_range = PropertyLocation {
            latitude: json!(95.0),
            longitude: json!(31.2),
        };
        assert!(LatLng::from_location(&garbage).is_none());
        assert!(LatLng::from_location(&out_of_range).is_none());
        assert!(LatLng::from_location(&PropertyLocation::default()).is_none());
    }

    #[test]
    fn bounds_cover_every_point() {
        let points = [
            LatLng::new(30.0, 31.0),
            LatLng::new(29.5, 31.4),
            LatLng::new(30.2, 30.9),
        ];
        let bounds = Bounds::from_points(&points).unwrap();

        assert_eq!(bounds.south_west, LatLng::new(29.5, 30.9));
        assert_eq!(bounds.north_east, LatLng::new(30.2, 31.4));
        assert!(points.iter().all(|p| bounds.contains(p)));
        assert!(Bounds::from_points(&[]).is_none());
    }
}
