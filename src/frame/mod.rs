//! Camera frames and image pyramids.

pub mod pyramid;

use image::GrayImage;

pub use pyramid::{crop, FramePyramid};

/// One 8-bit grayscale image captured by a camera of the rig.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub image: GrayImage,
    /// Capture time in nanoseconds on a monotonic clock.
    pub timestamp_ns: u64,
}

impl CameraFrame {
    pub fn new(image: GrayImage, timestamp_ns: u64) -> Self {
        Self {
            image,
            timestamp_ns,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
