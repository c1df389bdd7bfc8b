//! Everything the tracker remembers about one processed frame-set.

use crate::camera::SharedCamera;
use crate::frame::FramePyramid;
use crate::geometry::SE3;

/// Cameras, poses and pyramids of one frame-set.
///
/// The tracker keeps the frame-set of the previous call as predecessor for
/// point tracking and replaces it at the end of every call.
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub cameras: Vec<SharedCamera>,
    pub t_world_device: SE3,
    pub t_device_cameras: Vec<SE3>,
    pub pyramids: Vec<FramePyramid>,
    pub timestamp_ns: u64,
}

impl FrameSet {
    pub fn t_world_camera(&self, index: usize) -> SE3 {
        self.t_world_device.compose(&self.t_device_cameras[index])
    }
}
