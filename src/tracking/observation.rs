//! Per-camera history of 2D/3D correspondences of a tracked marker.
//!
//! Each observation pairs marker points with the image points they were
//! seen at. When a newly accepted marker pose no longer explains an older
//! observation, that observation and everything older is discarded.

use std::collections::VecDeque;

use nalgebra::{Vector2, Vector3};

use crate::camera::{CameraModel, SharedCamera};
use crate::geometry::SE3;

/// Minimum number of correspondences of one observation.
pub const MIN_OBSERVATION_POINTS: usize = 3;

/// One sighting of a marker by one camera.
#[derive(Debug, Clone)]
pub struct Observation {
    pub camera: SharedCamera,
    pub t_world_camera: SE3,
    /// Points in marker coordinates.
    pub object_points: Vec<Vector3<f64>>,
    /// Matching image points in pixels.
    pub image_points: Vec<Vector2<f64>>,
}

impl Observation {
    /// Number of points whose reprojection with `t_world_marker` is more than
    /// `max_projection_error` pixels off (or not visible at all).
    pub fn count_outliers(&self, camera: &dyn CameraModel, t_world_marker: &SE3, max_projection_error: f64) -> usize {
        let t_camera_marker = self.t_world_camera.inverse().compose(t_world_marker);
        let max_sqr_error = max_projection_error * max_projection_error;

        self.object_points
            .iter()
            .zip(&self.image_points)
            .filter(|(object_point, image_point)| {
                match camera.project(&t_camera_marker.transform_point(object_point)) {
                    Some(projected) => (projected - *image_point).norm_squared() > max_sqr_error,
                    None => true,
                }
            })
            .count()
    }
}

/// Ordered observations, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ObservationHistory {
    observations: VecDeque<Observation>,
}

impl ObservationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation.
    ///
    /// Returns `false` and leaves the history untouched if the point arrays
    /// differ in length or hold fewer than three points.
    pub fn add_observation(
        &mut self,
        camera: SharedCamera,
        t_world_camera: SE3,
        object_points: Vec<Vector3<f64>>,
        image_points: Vec<Vector2<f64>>,
    ) -> bool {
        if object_points.len() != image_points.len() || object_points.len() < MIN_OBSERVATION_POINTS {
            return false;
        }
        self.observations.push_back(Observation {
            camera,
            t_world_camera,
            object_points,
            image_points,
        });
        true
    }

    /// Remove the most recent observation that disagrees with
    /// `t_world_marker`, together with all older observations.
    ///
    /// An observation disagrees if more than `max_outlier_fraction` of its
    /// points reproject through `camera` further than `max_projection_error`
    /// pixels from where they were seen. Returns the number of removed
    /// observations.
    pub fn remove_observations(
        &mut self,
        camera: &dyn CameraModel,
        t_world_marker: &SE3,
        max_projection_error: f64,
        max_outlier_fraction: f64,
    ) -> usize {
        let violating = self.observations.iter().rposition(|observation| {
            let max_outliers = (observation.object_points.len() as f64 * max_outlier_fraction).round() as usize;
            observation.count_outliers(camera, t_world_marker, max_projection_error) > max_outliers
        });

        match violating {
            Some(index) => {
                self.observations.drain(..=index);
                index + 1
            }
            None => 0,
        }
    }

    /// Drop the oldest observations until at most `capacity` remain.
    pub fn trim_to(&mut self, capacity: usize) -> usize {
        let excess = self.observations.len().saturating_sub(capacity);
        self.observations.drain(..excess);
        excess
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.observations.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
    }
}
