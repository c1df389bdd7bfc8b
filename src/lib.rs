pub mod camera;
pub mod collaborators;
pub mod frame;
pub mod geometry;
pub mod marker;
pub mod sim;
pub mod tracking;

pub use tracking::{MarkerTracker, ObjectId, TrackedMarker, TrackerConfig, TrackingState};
