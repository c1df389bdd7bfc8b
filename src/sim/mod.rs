//! Deterministic synthetic stereo rig.
//!
//! A [`SimScene`] holds markers with ground-truth poses. [`SimRig`] renders
//! their locator features into grayscale frames, and the collaborators in this
//! module recover them from those frames the way real detectors would, with
//! payload decoding replaced by a lookup in the scene.

pub mod detector;
pub mod locator;
pub mod point_tracker;
pub mod render;
pub mod scene;
pub mod solver;

use std::sync::Arc;

use crate::collaborators::Collaborators;

pub use detector::SimMarkerDetector;
pub use locator::BlobLocatorDetector;
pub use point_tracker::SsdPointTracker;
pub use render::SimRig;
pub use scene::{facing_pose, SharedScene, SimScene, SimulatedMarker};
pub use solver::SimStereoSolver;

/// Collaborators working on frames rendered from `scene`.
pub fn collaborators(scene: SharedScene) -> Collaborators {
    let locator_detector = Arc::new(BlobLocatorDetector::default());
    let stereo_solver = Arc::new(SimStereoSolver::new(scene));
    let detector = Arc::new(SimMarkerDetector::new(
        stereo_solver.clone(),
        locator_detector.clone(),
    ));
    Collaborators::new(
        detector,
        stereo_solver,
        Arc::new(SsdPointTracker),
        locator_detector,
    )
}
