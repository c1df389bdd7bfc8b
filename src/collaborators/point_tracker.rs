//! Pyramidal frame-to-frame point tracking.

use nalgebra::Vector2;

use crate::frame::FramePyramid;

/// Patch used by the point tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSize {
    /// Half edge length; the patch is `2 * radius + 1` pixels wide.
    pub radius: u32,
    /// Search radius on the coarsest pyramid layer, in pixels.
    pub coarsest_layer_radius: u32,
}

impl PatchSize {
    pub const SMALL: PatchSize = PatchSize {
        radius: 3,
        coarsest_layer_radius: 2,
    };
    pub const LARGE: PatchSize = PatchSize {
        radius: 7,
        coarsest_layer_radius: 2,
    };

    /// Small 7x7 patch for streams up to `low_resolution_width`, 15x15 above.
    pub fn for_width(width: u32, low_resolution_width: u32) -> Self {
        if width <= low_resolution_width {
            Self::SMALL
        } else {
            Self::LARGE
        }
    }

    pub fn edge(&self) -> u32 {
        2 * self.radius + 1
    }
}

pub trait PointTracker: Send + Sync {
    /// Track `previous_points` from `previous` into `current`, starting the
    /// search at `predicted_points`.
    ///
    /// Returns one point per input point. Points that could not be tracked
    /// may be returned unrefined.
    fn track_points(
        &self,
        previous: &FramePyramid,
        current: &FramePyramid,
        previous_points: &[Vector2<f64>],
        predicted_points: &[Vector2<f64>],
        patch: PatchSize,
    ) -> Vec<Vector2<f64>>;
}
