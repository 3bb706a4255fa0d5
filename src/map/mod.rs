pub mod adapter;
pub mod geo;
pub mod surface;

pub use adapter::{CoordinatePolicy, Fingerprint, FitOptions, MapSyncAdapter, SkipReason, SkippedItem, SyncReport};
pub use geo::{Bounds, LatLng};
pub use surface::{LogSurface, MapSurface, Marker, MarkerPopup, MemorySurface, Viewport};
