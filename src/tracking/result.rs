//! Per-call results and diagnostics.
//!
//! These types describe what happened during one `track_markers` call:
//! - whether full detection ran and how many markers were tracked
//! - which markers were created or evicted
//! - 2D-only detections (detection-only mode)
//! - timing information for profiling

use crate::geometry::SE3;
use crate::marker::MarkerPayload;
use crate::tracking::types::ObjectId;

/// Summary of one processed frame-set.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    /// Index of the frame-set, starting at 1.
    pub frame_index: u64,
    pub timestamp_ns: u64,
    pub detection_ran: bool,
    /// Records whose pose was refreshed by the tracking step.
    pub num_tracked: usize,
    pub new_ids: Vec<ObjectId>,
    pub evicted_ids: Vec<ObjectId>,
    /// Markers decoded without a pose; never stored in the map.
    pub unlocalized: Vec<(ObjectId, MarkerPayload)>,
    pub timing: TimingStats,
}

impl StepReport {
    pub fn new(frame_index: u64, timestamp_ns: u64) -> Self {
        Self {
            frame_index,
            timestamp_ns,
            ..Self::default()
        }
    }
}

/// Timing breakdown for a frame-set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingStats {
    pub total_ms: f64,
    pub pyramid_ms: f64,
    pub tracking_ms: f64,
    pub detection_ms: f64,
}

impl TimingStats {
    pub fn zero() -> Self {
        Self {
            total_ms: 0.0,
            pyramid_ms: 0.0,
            tracking_ms: 0.0,
            detection_ms: 0.0,
        }
    }
}

/// Notification about a newly discovered marker.
#[derive(Debug, Clone)]
pub struct NewMarkerEvent {
    pub object_id: ObjectId,
    pub payload: MarkerPayload,
    /// `None` for 2D-only detections.
    pub t_world_marker: Option<SE3>,
    pub size: f64,
}
