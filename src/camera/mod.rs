//! Camera models.
//!
//! All models share the computer-vision camera convention (X right, Y down,
//! Z forward along the optical axis). Points are projected from the camera
//! frame; callers transform world points with `t_world_camera.inverse()`
//! first.

pub mod fisheye;
pub mod pinhole;

use std::fmt::Debug;
use std::sync::Arc;

use nalgebra::{Vector2, Vector3};

pub use fisheye::FisheyeCamera;
pub use pinhole::PinholeCamera;

/// Capabilities every camera model offers to the tracker.
pub trait CameraModel: Debug + Send + Sync {
    /// Image width in pixels.
    fn width(&self) -> u32;

    /// Image height in pixels.
    fn height(&self) -> u32;

    /// Project a point given in camera coordinates into the image.
    ///
    /// Returns `None` for points behind the camera.
    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>>;

    /// Viewing ray (unit length, camera coordinates) through an image point.
    fn unproject(&self, pixel: &Vector2<f64>) -> Vector3<f64>;

    /// True if the model parameters are usable.
    fn is_valid(&self) -> bool;

    /// True if `pixel` lies inside the image with at least `border` pixels
    /// distance to every image edge.
    fn is_inside(&self, pixel: &Vector2<f64>, border: f64) -> bool {
        pixel.x >= border
            && pixel.y >= border
            && pixel.x < self.width() as f64 - border
            && pixel.y < self.height() as f64 - border
    }
}

/// Camera model shared between the caller, the tracker and stored observations.
pub type SharedCamera = Arc<dyn CameraModel>;
