//! Marker tracking: records, observation histories, the per-marker
//! tracking step, identity resolution and the orchestrating tracker.

pub mod config;
pub mod frame_set;
pub mod identity;
pub mod marker_tracking;
pub mod observation;
pub mod record;
pub mod result;
pub mod state;
pub mod tracker;
pub mod types;

pub use config::TrackerConfig;
pub use frame_set::FrameSet;
pub use identity::is_already_tracked;
pub use observation::{Observation, ObservationHistory};
pub use record::TrackedMarker;
pub use result::{NewMarkerEvent, StepReport, TimingStats};
pub use state::TrackingState;
pub use tracker::{MarkerTracker, TrackedMarkersMap};
pub use types::ObjectId;
