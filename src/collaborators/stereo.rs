//! Stereo triangulation and pose solving of locator triplets.

use image::GrayImage;
use nalgebra::Vector3;

use crate::camera::SharedCamera;
use crate::geometry::SE3;
use crate::marker::{LocatorTriplet, MarkerPayload};

/// Two calibrated cameras with their poses at capture time.
#[derive(Debug, Clone)]
pub struct StereoRig {
    pub cameras: [SharedCamera; 2],
    pub t_world_device: SE3,
    pub t_device_cameras: [SE3; 2],
}

impl StereoRig {
    pub fn new(cameras: [SharedCamera; 2], t_world_device: SE3, t_device_cameras: [SE3; 2]) -> Self {
        Self {
            cameras,
            t_world_device,
            t_device_cameras,
        }
    }

    /// Pose of camera `index` (0 or 1) in world coordinates.
    pub fn t_world_camera(&self, index: usize) -> SE3 {
        self.t_world_device.compose(&self.t_device_cameras[index])
    }
}

/// Triangulated locator centers of one triplet pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangulation {
    /// World positions, same order as the triplets.
    pub world_points: [Vector3<f64>; 3],
    /// Mean distance between the triangulated centers and the cameras, meters.
    pub average_center_distance: f64,
}

/// A marker decoded and localized from a triplet pair.
#[derive(Debug, Clone)]
pub struct StereoSolution {
    pub payload: MarkerPayload,
    pub t_world_marker: SE3,
    pub size: f64,
}

pub trait StereoPoseSolver: Send + Sync {
    /// Triangulate the centers of two corresponding triplets, `None` if the
    /// rays do not agree.
    fn triangulate(
        &self,
        rig: &StereoRig,
        triplet_a: &LocatorTriplet,
        triplet_b: &LocatorTriplet,
    ) -> Option<Triangulation>;

    /// Compute the marker pose and decode its payload, assuming the code
    /// has the given `version`.
    fn solve(
        &self,
        images: [&GrayImage; 2],
        rig: &StereoRig,
        triplet_a: &LocatorTriplet,
        triplet_b: &LocatorTriplet,
        triangulation: &Triangulation,
        version: u32,
    ) -> Option<StereoSolution>;
}
