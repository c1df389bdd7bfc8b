//! Persistent state of one tracked marker.

use nalgebra::Vector3;

use crate::geometry::SE3;
use crate::marker::{trackable_object_points, MarkerPayload};
use crate::tracking::observation::{ObservationHistory, MIN_OBSERVATION_POINTS};
use crate::tracking::TrackingState;

/// A marker known to the tracker.
///
/// Records are created from a localized detection, refreshed by tracking or
/// re-detection and evicted once invalid or lost for too long.
#[derive(Debug, Clone)]
pub struct TrackedMarker {
    payload: MarkerPayload,
    t_world_marker: SE3,
    size: f64,
    state: TrackingState,
    /// Capture time of the last accepted pose.
    tracking_timestamp_ns: u64,
    /// Capture time of the frame-set at which tracking was lost.
    lost_since_ns: Option<u64>,
    trackable_object_points: Vec<Vector3<f64>>,
    observation_histories: Vec<ObservationHistory>,
}

impl TrackedMarker {
    /// New record in state `Tracking`, with one observation history per camera.
    pub fn new(
        payload: MarkerPayload,
        t_world_marker: SE3,
        size: f64,
        timestamp_ns: u64,
        num_cameras: usize,
    ) -> Self {
        let trackable_object_points = trackable_object_points(payload.version, size);
        Self {
            payload,
            t_world_marker,
            size,
            state: TrackingState::Tracking,
            tracking_timestamp_ns: timestamp_ns,
            lost_since_ns: None,
            trackable_object_points,
            observation_histories: vec![ObservationHistory::new(); num_cameras],
        }
    }

    pub fn payload(&self) -> &MarkerPayload {
        &self.payload
    }

    pub fn t_world_marker(&self) -> &SE3 {
        &self.t_world_marker
    }

    /// Edge length in meters.
    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn tracking_timestamp_ns(&self) -> u64 {
        self.tracking_timestamp_ns
    }

    /// Capture time at which the record became lost, `None` while tracking.
    pub fn lost_since_ns(&self) -> Option<u64> {
        self.lost_since_ns
    }

    /// Marker-local points usable as tracking anchors.
    pub fn trackable_object_points(&self) -> &[Vector3<f64>] {
        &self.trackable_object_points
    }

    pub fn observation_history(&self, camera_index: usize) -> Option<&ObservationHistory> {
        self.observation_histories.get(camera_index)
    }

    pub(crate) fn observation_history_mut(&mut self, camera_index: usize) -> Option<&mut ObservationHistory> {
        self.observation_histories.get_mut(camera_index)
    }

    pub(crate) fn observation_histories_mut(&mut self) -> impl Iterator<Item = &mut ObservationHistory> {
        self.observation_histories.iter_mut()
    }

    pub fn is_valid(&self) -> bool {
        self.payload.is_valid()
            && self.t_world_marker.is_valid()
            && self.size.is_finite()
            && self.size > 0.0
            && self.state != TrackingState::Unknown
            && self.trackable_object_points.len() >= MIN_OBSERVATION_POINTS
    }

    /// Accept a new pose; the record is tracking afterwards.
    pub fn update_tracking_pose(&mut self, t_world_marker: SE3, size: f64, timestamp_ns: u64) {
        if size != self.size {
            self.trackable_object_points = trackable_object_points(self.payload.version, size);
        }
        self.t_world_marker = t_world_marker;
        self.size = size;
        self.tracking_timestamp_ns = timestamp_ns;
        self.state = TrackingState::Tracking;
        self.lost_since_ns = None;
    }

    /// Mark the record as lost at capture time `timestamp_ns`.
    ///
    /// A record that is already lost keeps its original loss time.
    pub fn set_tracking_lost(&mut self, timestamp_ns: u64) {
        if self.state != TrackingState::Lost {
            self.state = TrackingState::Lost;
            self.lost_since_ns = Some(timestamp_ns);
        }
    }

    /// True if the record has been lost for at least `grace_ns` at `now_ns`.
    pub fn is_lost_longer_than(&self, now_ns: u64, grace_ns: u128) -> bool {
        match (self.state, self.lost_since_ns) {
            (TrackingState::Lost, Some(since)) => now_ns.saturating_sub(since) as u128 >= grace_ns,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::ErrorCorrection;

    fn record() -> TrackedMarker {
        TrackedMarker::new(
            MarkerPayload::new(1, ErrorCorrection::Low, "id"),
            SE3::from_translation(Vector3::new(0.0, 0.0, 1.0)),
            0.1,
            1_000,
            2,
        )
    }

    #[test]
    fn test_new_record_is_valid_and_tracking() {
        let record = record();

        assert!(record.is_valid());
        assert_eq!(record.state(), TrackingState::Tracking);
        assert_eq!(record.trackable_object_points().len(), 9);
        assert!(record.observation_history(1).is_some());
        assert!(record.observation_history(2).is_none());
    }

    #[test]
    fn test_lost_time_is_kept_until_refreshed() {
        let mut record = record();

        record.set_tracking_lost(2_000);
        record.set_tracking_lost(3_000);
        assert_eq!(record.lost_since_ns(), Some(2_000));
        assert!(!record.is_lost_longer_than(2_999, 1_000));
        assert!(record.is_lost_longer_than(3_000, 1_000));

        record.update_tracking_pose(SE3::identity(), 0.12, 4_000);
        assert_eq!(record.state(), TrackingState::Tracking);
        assert_eq!(record.lost_since_ns(), None);
        assert_eq!(record.tracking_timestamp_ns(), 4_000);
        assert!(!record.is_lost_longer_than(u64::MAX, 0));
    }

    #[test]
    fn test_size_change_rescales_object_points() {
        let mut record = record();
        let before = record.trackable_object_points()[0];

        record.update_tracking_pose(*record.t_world_marker(), 0.2, 2_000);

        assert_eq!(record.trackable_object_points()[0], before * 2.0);
    }

    #[test]
    fn test_invalid_size_makes_record_invalid() {
        let mut record = record();
        record.update_tracking_pose(SE3::identity(), 0.0, 2_000);
        assert!(!record.is_valid());
    }
}
