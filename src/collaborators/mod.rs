//! Interfaces of the components the tracker relies on but does not implement:
//! full-frame stereo marker detection, stereo triangulation and pose solving,
//! pyramidal point tracking and locator-feature detection.
//!
//! All collaborators must be `Send + Sync`; the tracker may call them from
//! the worker pool passed to `MarkerTracker::track_markers`.

pub mod detector;
pub mod locator;
pub mod point_tracker;
pub mod stereo;

use std::sync::Arc;

pub use detector::{MarkerDetection, MarkerDetector};
pub use locator::LocatorDetector;
pub use point_tracker::{PatchSize, PointTracker};
pub use stereo::{StereoPoseSolver, StereoRig, StereoSolution, Triangulation};

/// The set of collaborators a `MarkerTracker` works with.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn MarkerDetector>,
    pub stereo_solver: Arc<dyn StereoPoseSolver>,
    pub point_tracker: Arc<dyn PointTracker>,
    pub locator_detector: Arc<dyn LocatorDetector>,
}

impl Collaborators {
    pub fn new(
        detector: Arc<dyn MarkerDetector>,
        stereo_solver: Arc<dyn StereoPoseSolver>,
        point_tracker: Arc<dyn PointTracker>,
        locator_detector: Arc<dyn LocatorDetector>,
    ) -> Self {
        Self {
            detector,
            stereo_solver,
            point_tracker,
            locator_detector,
        }
    }
}
