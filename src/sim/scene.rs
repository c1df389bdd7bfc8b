//! Ground-truth markers of a synthetic scene.

use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::RwLock;

use crate::geometry::SE3;
use crate::marker::MarkerPayload;

#[derive(Debug, Clone)]
pub struct SimulatedMarker {
    pub payload: MarkerPayload,
    pub t_world_marker: SE3,
    /// Edge length in meters.
    pub size: f64,
    /// Occluded markers are neither rendered nor decodable.
    pub visible: bool,
}

impl SimulatedMarker {
    pub fn new(payload: MarkerPayload, t_world_marker: SE3, size: f64) -> Self {
        Self {
            payload,
            t_world_marker,
            size,
            visible: true,
        }
    }
}

/// Pose of an upright marker at `translation` whose printed side faces a
/// camera looking along +z (x right, y down).
pub fn facing_pose(translation: Vector3<f64>) -> SE3 {
    SE3 {
        rotation: UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI),
        translation,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimScene {
    pub markers: Vec<SimulatedMarker>,
}

/// Scene shared between the test driver and the simulated collaborators.
pub type SharedScene = Arc<RwLock<SimScene>>;

impl SimScene {
    pub fn new(markers: Vec<SimulatedMarker>) -> Self {
        Self { markers }
    }

    pub fn into_shared(self) -> SharedScene {
        Arc::new(RwLock::new(self))
    }

    /// Visible marker with the given version closest to `center`, if it is
    /// closer than `max_distance`.
    pub fn nearest_visible(&self, center: &Vector3<f64>, version: u32, max_distance: f64) -> Option<&SimulatedMarker> {
        self.markers
            .iter()
            .filter(|marker| marker.visible && marker.payload.version == version)
            .map(|marker| ((marker.t_world_marker.translation - center).norm(), marker))
            .filter(|(distance, _)| *distance < max_distance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, marker)| marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::ErrorCorrection;
    use approx::assert_relative_eq;

    #[test]
    fn test_facing_pose_points_normal_at_camera() {
        let pose = facing_pose(Vector3::new(0.0, 0.0, 1.0));

        let normal = pose.transform_vector(&Vector3::z());
        let up = pose.transform_vector(&Vector3::y());

        assert_relative_eq!(normal, -Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(up, -Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_visible_skips_hidden_markers() {
        let payload = MarkerPayload::new(1, ErrorCorrection::Low, "a");
        let mut hidden = SimulatedMarker::new(payload.clone(), facing_pose(Vector3::new(0.0, 0.0, 1.0)), 0.1);
        hidden.visible = false;
        let far = SimulatedMarker::new(payload, facing_pose(Vector3::new(0.3, 0.0, 1.0)), 0.1);
        let scene = SimScene::new(vec![hidden, far]);

        assert!(scene.nearest_visible(&Vector3::new(0.0, 0.0, 1.0), 1, 0.1).is_none());
        assert!(scene.nearest_visible(&Vector3::new(0.25, 0.0, 1.0), 1, 0.1).is_some());
        assert!(scene.nearest_visible(&Vector3::new(0.25, 0.0, 1.0), 2, 0.1).is_none());
    }
}
