//! Metric layout of a square QR code.
//!
//! Marker coordinates: origin at the code center, x to the right, y up, z out
//! of the printed side. The code spans `[-size/2, size/2]` on both axes.

use nalgebra::Vector3;

/// Edge length of a locator feature (finder pattern) in modules.
pub const LOCATOR_WIDTH_MODULES: f64 = 7.0;

/// Number of modules along one edge of a QR code of the given version.
pub fn modules_per_side(version: u32) -> u32 {
    17 + 4 * version
}

/// Centers of the three locator features in marker coordinates,
/// ordered top-left, bottom-left, top-right.
pub fn locator_anchors(version: u32, size: f64) -> [Vector3<f64>; 3] {
    let half = size * 0.5;
    let module = size / modules_per_side(version) as f64;
    let offset = module * LOCATOR_WIDTH_MODULES * 0.5;

    let left = -half + offset;
    let right = half - offset;
    let top = half - offset;
    let bottom = -half + offset;

    [
        Vector3::new(left, top, 0.0),
        Vector3::new(left, bottom, 0.0),
        Vector3::new(right, top, 0.0),
    ]
}

/// Outer corners of the three locator features, three per locator, skipping
/// the corner that points into the code.
pub fn trackable_object_points(version: u32, size: f64) -> Vec<Vector3<f64>> {
    let half = size * 0.5;
    let width = size / modules_per_side(version) as f64 * LOCATOR_WIDTH_MODULES;

    vec![
        // top-left locator
        Vector3::new(-half, half, 0.0),
        Vector3::new(-half, half - width, 0.0),
        Vector3::new(-half + width, half, 0.0),
        // bottom-left locator
        Vector3::new(-half, -half, 0.0),
        Vector3::new(-half + width, -half, 0.0),
        Vector3::new(-half, -half + width, 0.0),
        // top-right locator
        Vector3::new(half, half, 0.0),
        Vector3::new(half - width, half, 0.0),
        Vector3::new(half, half - width, 0.0),
    ]
}
