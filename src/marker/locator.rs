//! Locator features (finder patterns) and their groupings.

use nalgebra::Vector2;

/// A square locator feature found in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorFeature {
    /// Center in pixels.
    pub position: Vector2<f64>,
    /// Edge length in pixels.
    pub length: f64,
    /// Edge length of one module in pixels.
    pub module_size: f64,
    /// Outer corners in clockwise order, if the detector refined them.
    pub corners: Option<[Vector2<f64>; 4]>,
    /// Orientation of the top edge, radians.
    pub orientation: f64,
    /// How closely the pattern matches the 1:1:3:1:1 profile, 0 is perfect.
    pub symmetry_score: f64,
}

impl LocatorFeature {
    pub fn new(position: Vector2<f64>, length: f64) -> Self {
        Self {
            position,
            length,
            module_size: length / super::LOCATOR_WIDTH_MODULES,
            corners: None,
            orientation: 0.0,
            symmetry_score: 0.0,
        }
    }

    /// Same feature shifted by `offset`, e.g. from crop to full-image coordinates.
    pub fn translated(&self, offset: Vector2<f64>) -> Self {
        Self {
            position: self.position + offset,
            corners: self.corners.map(|corners| corners.map(|c| c + offset)),
            ..self.clone()
        }
    }
}

/// Indices of three locator features forming a code candidate, ordered
/// top-left, bottom-left, top-right.
pub type IndexTriplet = [usize; 3];

/// Three locator features forming a code candidate, same order as [`IndexTriplet`].
pub type LocatorTriplet = [LocatorFeature; 3];
