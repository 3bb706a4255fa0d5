use crate::map::geo::{Bounds, LatLng};
use crate::map::surface::{MapSurface, Marker, MarkerPopup};
use crate::models::PropertyListing;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use tracing::{debug, warn};

/// Ordered `(id, title, price, status)` of a result list.
///
/// Two lists with equal fingerprints render the same markers, so a rebuild
/// can be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(Vec<(u64, String, String, String)>);

impl Fingerprint {
    pub fn of(items: &[PropertyListing]) -> Self {
        Fingerprint(
            items
                .iter()
                .map(|i| (i.id, i.title.clone(), i.price.clone(), i.status.clone()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What to do with listings that have no usable coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinatePolicy {
    /// Production behaviour: no coordinate, no marker
    SkipMissing,
    /// Demo only. Scatters uncoordinated listings around `center` so an
    /// empty backend still draws a map. Never enable against real data.
    DemoFallback { center: LatLng, spread: f64 },
}

impl Default for CoordinatePolicy {
    fn default() -> Self {
        CoordinatePolicy::SkipMissing
    }
}

/// Viewport behaviour after markers are placed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub single_marker_zoom: u8,
    pub padding_px: u32,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            single_marker_zoom: 15,
            padding_px: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MissingCoordinates,
    MalformedCoordinates,
    SurfaceRejected(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingCoordinates => f.write_str("no location"),
            SkipReason::MalformedCoordinates => f.write_str("malformed coordinates"),
            SkipReason::SurfaceRejected(err) => write!(f, "map rejected marker: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub listing_id: u64,
    pub reason: SkipReason,
}

/// Outcome of one [`MapSyncAdapter::sync_markers`] call
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// False when the fingerprint matched and nothing was touched
    pub rebuilt: bool,
    pub placed: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Keeps a map surface showing one marker per listing.
pub struct MapSyncAdapter<S: MapSurface> {
    surface: S,
    policy: CoordinatePolicy,
    fit: FitOptions,
    fingerprint: Option<Fingerprint>,
    markers: Vec<Marker>,
    rng: StdRng,
}

impl<S: MapSurface> MapSyncAdapter<S> {
    pub fn new(surface: S) -> Self {
        Self::with_policy(surface, CoordinatePolicy::SkipMissing)
    }

    /// A negative spread counts as its magnitude and a non-finite one as zero.
    pub fn with_policy(surface: S, policy: CoordinatePolicy) -> Self {
        let policy = match policy {
            CoordinatePolicy::DemoFallback { center, spread } => CoordinatePolicy::DemoFallback {
                center,
                spread: if spread.is_finite() { spread.abs() } else { 0.0 },
            },
            other => other,
        };
        if let CoordinatePolicy::DemoFallback { center, .. } = policy {
            warn!(
                "Map demo coordinates enabled around ({}, {}): listings without a location get invented ones",
                center.lat, center.lng
            );
        }
        Self {
            surface,
            policy,
            fit: FitOptions::default(),
            fingerprint: None,
            markers: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_fit(mut self, fit: FitOptions) -> Self {
        self.fit = fit;
        self
    }

    /// Fix the demo coordinate generator, for reproducible output
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    fn resolve(&mut self, item: &PropertyListing) -> Result<LatLng, SkipReason> {
        let resolved = match item.property_locations.first() {
            None => Err(SkipReason::MissingCoordinates),
            Some(location) => LatLng::from_location(location).ok_or(SkipReason::MalformedCoordinates),
        };

        match (resolved, self.policy) {
            (Ok(point), _) => Ok(point),
            (Err(_), CoordinatePolicy::DemoFallback { center, spread }) if spread > 0.0 => Ok(LatLng::new(
                center.lat + self.rng.gen_range(-spread..=spread),
                center.lng + self.rng.gen_range(-spread..=spread),
            )),
            (Err(_), CoordinatePolicy::DemoFallback { center, .. }) => Ok(center),
            (Err(reason), CoordinatePolicy::SkipMissing) => Err(reason),
        }
    }

    /// Rebuild the markers for `items` unless they match the previous call.
    ///
    /// A listing that cannot be placed is reported in the result and the
    /// rest still get their markers.
    pub fn sync_markers(&mut self, items: &[PropertyListing], force_rebuild: bool) -> SyncReport {
        let fingerprint = Fingerprint::of(items);
        if !force_rebuild && self.fingerprint.as_ref() == Some(&fingerprint) {
            debug!("Result list unchanged, keeping {} markers", self.markers.len());
            return SyncReport {
                rebuilt: false,
                placed: self.markers.len(),
                skipped: Vec::new(),
            };
        }

        self.surface.clear_markers();
        self.markers.clear();
        let mut skipped = Vec::new();

        for item in items {
            let position = match self.resolve(item) {
                Ok(position) => position,
                Err(reason) => {
                    skipped.push(SkippedItem {
                        listing_id: item.id,
                        reason,
                    });
                    continue;
                }
            };

            let marker = Marker {
                listing_id: item.id,
                position,
                popup: MarkerPopup {
                    title: item.title.clone(),
                    price: item.price.clone(),
                    status: item.status.clone(),
                    area: item.area_name().map(str::to_string),
                },
            };

            match self.surface.add_marker(&marker) {
                Ok(()) => self.markers.push(marker),
                Err(err) => skipped.push(SkippedItem {
                    listing_id: item.id,
                    reason: SkipReason::SurfaceRejected(err.to_string()),
                }),
            }
        }

        self.fit_viewport();
        self.fingerprint = Some(fingerprint);

        if !skipped.is_empty() {
            warn!(
                "Placed {} markers, skipped {} listings without a usable location",
                self.markers.len(),
                skipped.len()
            );
        } else {
            debug!("Placed {} markers", self.markers.len());
        }

        SyncReport {
            rebuilt: true,
            placed: self.markers.len(),
            skipped,
        }
    }

    fn fit_viewport(&mut self) {
        match self.markers.as_slice() {
            [] => {}
            [only] => self.surface.set_view(only.position, self.fit.single_marker_zoom),
            many => {
                if let Some(bounds) = Bounds::from_points(many.iter().map(|m| &m.position)) {
                    self.surface.fit_bounds(bounds, self.fit.padding_px);
                }
            }
        }
    }
}
