//! Full-frame stereo marker detection.

use rayon::ThreadPool;

use crate::camera::SharedCamera;
use crate::frame::CameraFrame;
use crate::geometry::SE3;
use crate::marker::MarkerPayload;

/// One marker found by a [`MarkerDetector`].
#[derive(Debug, Clone)]
pub struct MarkerDetection {
    pub payload: MarkerPayload,
    /// Pose of the marker in world coordinates, `None` if it could only be
    /// decoded in 2D.
    pub t_world_marker: Option<SE3>,
    /// Edge length in meters, `<= 0` for 2D-only detections.
    pub size: f64,
}

impl MarkerDetection {
    pub fn localized(payload: MarkerPayload, t_world_marker: SE3, size: f64) -> Self {
        Self {
            payload,
            t_world_marker: Some(t_world_marker),
            size,
        }
    }

    pub fn unlocalized(payload: MarkerPayload) -> Self {
        Self {
            payload,
            t_world_marker: None,
            size: 0.0,
        }
    }

    /// True if the detection carries a usable 6-DOF pose and size.
    pub fn is_localized(&self) -> bool {
        self.size.is_finite() && self.size > 0.0 && self.t_world_marker.is_some_and(|pose| pose.is_valid())
    }
}

/// Detects all markers visible in a synchronized frame-set.
pub trait MarkerDetector: Send + Sync {
    /// Detect markers in `frames`; `cameras`, `frames` and `t_device_cameras`
    /// have equal length.
    ///
    /// 2D-only results may only be returned when `allow_unlocalized` is set.
    /// A failed detection returns an empty list.
    fn detect(
        &self,
        cameras: &[SharedCamera],
        frames: &[CameraFrame],
        t_world_device: &SE3,
        t_device_cameras: &[SE3],
        allow_unlocalized: bool,
        pool: Option<&ThreadPool>,
    ) -> Vec<MarkerDetection>;
}
