//! Locator-feature (finder pattern) detection.

use image::GrayImage;

use crate::marker::{IndexTriplet, LocatorFeature};

pub trait LocatorDetector: Send + Sync {
    /// Find locator features inside `image`, positions in `image` coordinates.
    ///
    /// Features closer than `min_distance` pixels to each other are reported once.
    fn detect_locators(&self, image: &GrayImage, min_distance: u32) -> Vec<LocatorFeature>;

    /// Group features into code candidates, each ordered top-left,
    /// bottom-left, top-right in image space.
    fn extract_triplets(&self, features: &[LocatorFeature]) -> Vec<IndexTriplet>;
}
