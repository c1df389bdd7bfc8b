//! QR-code marker types: decoded payloads, code geometry and locator features.

pub mod geometry;
pub mod locator;
pub mod payload;

pub use geometry::{locator_anchors, modules_per_side, trackable_object_points, LOCATOR_WIDTH_MODULES};
pub use locator::{IndexTriplet, LocatorFeature, LocatorTriplet};
pub use payload::{ErrorCorrection, MarkerPayload};
