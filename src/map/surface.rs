use crate::map::geo::{Bounds, LatLng};
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// What the marker popup shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerPopup {
    pub title: String,
    pub price: String,
    pub status: String,
    pub area: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub listing_id: u64,
    pub position: LatLng,
    pub popup: MarkerPopup,
}

/// Map provider contract. Only the map adapter writes to a surface.
pub trait MapSurface: Send {
    fn clear_markers(&mut self);

    /// Place one marker with its popup attached
    fn add_marker(&mut self, marker: &Marker) -> Result<()>;

    fn fit_bounds(&mut self, bounds: Bounds, padding_px: u32);

    fn set_view(&mut self, center: LatLng, zoom: u8);
}

/// Last viewport change applied to a surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Viewport {
    Centered { center: LatLng, zoom: u8 },
    Fitted { bounds: Bounds, padding_px: u32 },
}

/// Headless surface that keeps markers and viewport in memory
#[derive(Debug, Default)]
pub struct MemorySurface {
    pub markers: Vec<Marker>,
    pub viewport: Option<Viewport>,
    /// Total `add_marker` calls, including rejected ones
    pub creations: usize,
    pub clears: usize,
    rejected: HashSet<u64>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `add_marker` fail for these listings
    pub fn rejecting(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            rejected: ids.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl MapSurface for MemorySurface {
    fn clear_markers(&mut self) {
        self.markers.clear();
        self.clears += 1;
    }

    fn add_marker(&mut self, marker: &Marker) -> Result<()> {
        self.creations += 1;
        if self.rejected.contains(&marker.listing_id) {
            bail!("marker for listing {} rejected", marker.listing_id);
        }
        self.markers.push(marker.clone());
        Ok(())
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding_px: u32) {
        self.viewport = Some(Viewport::Fitted { bounds, padding_px });
    }

    fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.viewport = Some(Viewport::Centered { center, zoom });
    }
}

/// Surface for the command line: no map, just log lines.
#[derive(Debug, Default)]
pub struct LogSurface {
    markers: usize,
}

impl MapSurface for LogSurface {
    fn clear_markers(&mut self) {
        debug!("Clearing {} markers", self.markers);
        self.markers = 0;
    }

    fn add_marker(&mut self, marker: &Marker) -> Result<()> {
        self.markers += 1;
        debug!(
            "📍 {} at ({:.5}, {:.5})",
            marker.popup.title, marker.position.lat, marker.position.lng
        );
        Ok(())
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding_px: u32) {
        info!(
            "🗺️  Fitting {} markers into ({:.4}, {:.4})..({:.4}, {:.4}) with {}px padding",
            self.markers,
            bounds.south_west.lat,
            bounds.south_west.lng,
            bounds.north_east.lat,
            bounds.north_east.lng,
            padding_px
        );
    }

    fn set_view(&mut self, center: LatLng, zoom: u8) {
        info!("🗺️  Centering on ({:.4}, {:.4}) at zoom {}", center.lat, center.lng, zoom);
    }
}
