//! Tracker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning values of a `MarkerTracker`.
///
/// Missing fields fall back to their defaults when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Full detection runs at least every `detection_cadence` frame-sets.
    pub detection_cadence: u32,
    /// Number of pyramid layers built per frame for point tracking.
    pub tracking_pyramid_layers: u32,
    /// How long a lost marker stays in the map before it is evicted.
    pub tracking_lost_grace_timeout: Duration,
    /// Reprojection error (pixels) above which an observed point is an outlier.
    pub observation_history_max_projection_error: f64,
    /// Fraction of outliers (0..=1) an observation may contain and still agree with a pose.
    pub observation_history_max_outlier_fraction: f64,
    /// Observations kept per marker and camera.
    pub observation_history_capacity: usize,
    /// Tracking fails when a camera yields more locator features than this.
    pub max_locator_features_per_camera: usize,
    /// Minimum distance (pixels) of projected anchors to the image border.
    pub anchor_border: f64,
    /// Widths up to this value use the small tracking patch.
    pub low_resolution_width: u32,
    /// Skip tracking, detect every frame and accept 2D-only detections.
    pub force_detection_only: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            detection_cadence: 15,
            tracking_pyramid_layers: 3,
            tracking_lost_grace_timeout: Duration::MAX,
            observation_history_max_projection_error: 5.0,
            observation_history_max_outlier_fraction: 0.2,
            observation_history_capacity: 30,
            max_locator_features_per_camera: 3 * 5,
            anchor_border: 10.0,
            low_resolution_width: 640,
            force_detection_only: false,
        }
    }
}

impl TrackerConfig {
    /// Configuration that only runs detection.
    pub fn detection_only() -> Self {
        Self {
            force_detection_only: true,
            ..Self::default()
        }
    }

    /// Copy with out-of-range values replaced by the closest usable ones.
    pub fn validated(mut self) -> Self {
        self.detection_cadence = self.detection_cadence.max(1);
        self.tracking_pyramid_layers = self.tracking_pyramid_layers.max(1);
        if !self.observation_history_max_projection_error.is_finite()
            || self.observation_history_max_projection_error < 0.0
        {
            self.observation_history_max_projection_error = Self::default().observation_history_max_projection_error;
        }
        self.observation_history_max_outlier_fraction = if self.observation_history_max_outlier_fraction.is_nan() {
            Self::default().observation_history_max_outlier_fraction
        } else {
            self.observation_history_max_outlier_fraction.clamp(0.0, 1.0)
        };
        self.max_locator_features_per_camera = self.max_locator_features_per_camera.max(3);
        if !self.anchor_border.is_finite() || self.anchor_border < 0.0 {
            self.anchor_border = 0.0;
        }
        self
    }
}
