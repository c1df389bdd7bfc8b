//! Marker tracker: fuses per-frame detection with frame-to-frame tracking.
//!
//! Every call of [`MarkerTracker::track_markers`]:
//! - tracks all known markers from the previous frame-set into the current one
//! - evicts records that are invalid or lost for longer than the grace timeout
//! - runs full detection when nothing is tracked or the cadence is due
//! - merges detections into existing records or creates new ones
//! - stores the frame-set as predecessor for the next call

use std::collections::HashMap;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use crossbeam_channel::Sender;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, error, info, warn};

use crate::camera::SharedCamera;
use crate::collaborators::{Collaborators, MarkerDetection};
use crate::frame::{CameraFrame, FramePyramid};
use crate::geometry::SE3;
use crate::tracking::config::TrackerConfig;
use crate::tracking::frame_set::FrameSet;
use crate::tracking::identity::is_already_tracked;
use crate::tracking::marker_tracking::{track_marker, TrackingContext, STEREO_CAMERAS};
use crate::tracking::record::TrackedMarker;
use crate::tracking::result::{NewMarkerEvent, StepReport};
use crate::tracking::types::ObjectId;
use crate::tracking::TrackingState;

/// Frames smaller than this in either direction are rejected.
pub const MIN_FRAME_SIZE: u32 = 29;

/// Map of all markers currently tracked.
pub type TrackedMarkersMap = HashMap<ObjectId, TrackedMarker>;

/// Detection/tracking fusion for a stereo camera rig.
pub struct MarkerTracker {
    config: TrackerConfig,
    collaborators: Collaborators,

    tracked_markers: TrackedMarkersMap,

    /// Cameras, poses and pyramids of the last processed frame-set.
    previous: Option<FrameSet>,

    /// Number of accepted frame-sets since construction or reset.
    frame_counter: u64,

    /// Next id to hand out; never rewound.
    next_object_id: u64,

    last_timestamp_ns: Option<u64>,

    /// Receives a message for every newly discovered marker.
    event_sink: Option<Sender<NewMarkerEvent>>,

    last_report: StepReport,
}

impl MarkerTracker {
    pub fn new(config: TrackerConfig, collaborators: Collaborators) -> Self {
        Self {
            config: config.validated(),
            collaborators,
            tracked_markers: HashMap::new(),
            previous: None,
            frame_counter: 0,
            next_object_id: 0,
            last_timestamp_ns: None,
            event_sink: None,
            last_report: StepReport::default(),
        }
    }

    /// Send a [`NewMarkerEvent`] into `sink` whenever a marker is discovered.
    ///
    /// Events are sent without blocking; they are dropped if the channel is
    /// full or disconnected.
    pub fn with_event_sink(mut self, sink: Sender<NewMarkerEvent>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn tracked_markers(&self) -> &TrackedMarkersMap {
        &self.tracked_markers
    }

    pub fn get(&self, object_id: ObjectId) -> Option<&TrackedMarker> {
        self.tracked_markers.get(&object_id)
    }

    pub fn len(&self) -> usize {
        self.tracked_markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked_markers.is_empty()
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Report of the last accepted call.
    pub fn last_report(&self) -> &StepReport {
        &self.last_report
    }

    /// Forget all markers and the previous frame-set.
    ///
    /// Ids handed out before the reset are not reused.
    pub fn reset(&mut self) {
        self.tracked_markers.clear();
        self.previous = None;
        self.frame_counter = 0;
        self.last_timestamp_ns = None;
        self.last_report = StepReport::default();
    }

    /// Process one synchronized frame-set and return the updated map.
    ///
    /// `cameras`, `frames` and `t_device_cameras` must have the same length
    /// (at least two). Tracking uses the first two cameras as stereo pair.
    /// Invalid input is logged and leaves the map untouched.
    pub fn track_markers(
        &mut self,
        cameras: &[SharedCamera],
        frames: &[CameraFrame],
        t_world_device: &SE3,
        t_device_cameras: &[SE3],
        pool: Option<&ThreadPool>,
    ) -> &TrackedMarkersMap {
        let start = Instant::now();

        if let Err(err) = self.validate_inputs(cameras, frames, t_world_device, t_device_cameras) {
            error!("Rejecting frame-set: {:#}", err);
            return &self.tracked_markers;
        }

        let timestamp_ns = frames[0].timestamp_ns;
        let detection_only = self.config.force_detection_only;

        let pyramid_start = Instant::now();
        let current = if detection_only {
            None
        } else {
            match self.build_frame_set(cameras, frames, t_world_device, t_device_cameras, pool) {
                Ok(frame_set) => Some(frame_set),
                Err(err) => {
                    error!("Rejecting frame-set: {:#}", err);
                    return &self.tracked_markers;
                }
            }
        };
        let pyramid_ms = pyramid_start.elapsed().as_secs_f64() * 1000.0;

        self.frame_counter += 1;
        self.last_timestamp_ns = Some(timestamp_ns);

        let mut report = StepReport::new(self.frame_counter, timestamp_ns);
        report.timing.pyramid_ms = pyramid_ms;

        if detection_only {
            self.tracked_markers.clear();
            self.previous = None;
        }

        // 1. Track known markers
        let tracking_start = Instant::now();
        if let (Some(previous), Some(current)) = (self.previous.as_ref(), current.as_ref()) {
            let ctx = TrackingContext {
                previous,
                current,
                collaborators: &self.collaborators,
                config: &self.config,
            };
            report.num_tracked = track_all(&ctx, &mut self.tracked_markers, pool);
        }
        report.timing.tracking_ms = tracking_start.elapsed().as_secs_f64() * 1000.0;

        // 2. Evict invalid and long-lost markers
        report.evicted_ids = self.evict_markers(timestamp_ns);

        // 3. Detect
        let cadence = u64::from(self.config.detection_cadence.max(1));
        let run_detection = detection_only
            || self.tracked_markers.is_empty()
            || report.num_tracked == 0
            || self.frame_counter % cadence == 0;

        if run_detection {
            let detection_start = Instant::now();
            let detections = self.collaborators.detector.detect(
                cameras,
                frames,
                t_world_device,
                t_device_cameras,
                detection_only,
                pool,
            );
            debug!(
                "Frame {}: detection found {} marker(s)",
                self.frame_counter,
                detections.len()
            );
            for detection in detections {
                self.integrate_detection(detection, timestamp_ns, detection_only, &mut report);
            }
            report.detection_ran = true;
            report.timing.detection_ms = detection_start.elapsed().as_secs_f64() * 1000.0;
        }

        // 4. Keep this frame-set as predecessor
        if current.is_some() {
            self.previous = current;
        }

        report.timing.total_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "Frame {}: {} tracked, {} new, {} evicted, {} in map ({:.2} ms)",
            report.frame_index,
            report.num_tracked,
            report.new_ids.len(),
            report.evicted_ids.len(),
            self.tracked_markers.len(),
            report.timing.total_ms
        );
        self.last_report = report;

        &self.tracked_markers
    }

    fn validate_inputs(
        &self,
        cameras: &[SharedCamera],
        frames: &[CameraFrame],
        t_world_device: &SE3,
        t_device_cameras: &[SE3],
    ) -> Result<()> {
        if cameras.len() < 2 {
            bail!("at least two cameras are required, got {}", cameras.len());
        }
        if frames.len() != cameras.len() || t_device_cameras.len() != cameras.len() {
            bail!(
                "got {} cameras, {} frames and {} camera poses",
                cameras.len(),
                frames.len(),
                t_device_cameras.len()
            );
        }
        if !t_world_device.is_valid() {
            bail!("invalid device pose");
        }

        for (index, ((camera, frame), t_device_camera)) in
            cameras.iter().zip(frames).zip(t_device_cameras).enumerate()
        {
            if !camera.is_valid() {
                bail!("camera {} is invalid", index);
            }
            if !t_device_camera.is_valid() {
                bail!("pose of camera {} is invalid", index);
            }
            if frame.width() != camera.width() || frame.height() != camera.height() {
                bail!(
                    "frame {} is {}x{}, camera expects {}x{}",
                    index,
                    frame.width(),
                    frame.height(),
                    camera.width(),
                    camera.height()
                );
            }
            if frame.width() < MIN_FRAME_SIZE || frame.height() < MIN_FRAME_SIZE {
                bail!("frame {} is too small ({}x{})", index, frame.width(), frame.height());
            }
        }

        if let Some(last) = self.last_timestamp_ns {
            if frames[0].timestamp_ns < last {
                bail!(
                    "frame-set at {} ns is older than the previous one at {} ns",
                    frames[0].timestamp_ns,
                    last
                );
            }
        }

        Ok(())
    }

    fn build_frame_set(
        &self,
        cameras: &[SharedCamera],
        frames: &[CameraFrame],
        t_world_device: &SE3,
        t_device_cameras: &[SE3],
        pool: Option<&ThreadPool>,
    ) -> Result<FrameSet> {
        let layers = self.config.tracking_pyramid_layers;
        let pyramids = frames
            .iter()
            .enumerate()
            .map(|(index, frame)| {
                FramePyramid::new(&frame.image, layers, pool)
                    .with_context(|| format!("building pyramid of frame {}", index))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FrameSet {
            cameras: cameras.to_vec(),
            t_world_device: *t_world_device,
            t_device_cameras: t_device_cameras.to_vec(),
            pyramids,
            timestamp_ns: frames[0].timestamp_ns,
        })
    }

    fn evict_markers(&mut self, timestamp_ns: u64) -> Vec<ObjectId> {
        let grace_ns = self.config.tracking_lost_grace_timeout.as_nanos();

        let mut evicted: Vec<ObjectId> = self
            .tracked_markers
            .iter()
            .filter(|(_, record)| !record.is_valid() || record.is_lost_longer_than(timestamp_ns, grace_ns))
            .map(|(&object_id, _)| object_id)
            .collect();
        evicted.sort();

        for object_id in &evicted {
            if let Some(record) = self.tracked_markers.remove(object_id) {
                info!("Evicted {} ({}, {})", object_id, record.payload(), record.state());
            }
        }

        evicted
    }

    fn integrate_detection(
        &mut self,
        detection: MarkerDetection,
        timestamp_ns: u64,
        detection_only: bool,
        report: &mut StepReport,
    ) {
        if !detection.payload.is_valid() {
            debug!("Ignoring detection with invalid payload");
            return;
        }

        let is_localized = detection.is_localized();
        let MarkerDetection {
            payload,
            t_world_marker,
            size,
        } = detection;

        let t_world_marker = match t_world_marker {
            Some(pose) if is_localized => pose,
            _ => {
                if detection_only {
                    let object_id = self.allocate_object_id();
                    info!("Found 2D-only marker {} ({})", object_id, payload);
                    self.notify_new_marker(NewMarkerEvent {
                        object_id,
                        payload: payload.clone(),
                        t_world_marker: None,
                        size,
                    });
                    report.new_ids.push(object_id);
                    report.unlocalized.push((object_id, payload));
                } else {
                    debug!("Ignoring 2D-only detection of {}", payload);
                }
                return;
            }
        };

        if let Some(object_id) = is_already_tracked(&self.tracked_markers, &payload, &t_world_marker, size) {
            let Some(record) = self.tracked_markers.get_mut(&object_id) else {
                return;
            };
            if record.state() == TrackingState::Tracking || timestamp_ns < record.tracking_timestamp_ns() {
                return;
            }

            record.update_tracking_pose(t_world_marker, size, timestamp_ns);
            prune_observations(record, &self.config);
            debug!("Re-detected {} ({})", object_id, record.payload());
            return;
        }

        let record = TrackedMarker::new(payload.clone(), t_world_marker, size, timestamp_ns, STEREO_CAMERAS);
        if !record.is_valid() {
            debug!("Ignoring detection of {} that yields an invalid record", payload);
            return;
        }
        let object_id = self.allocate_object_id();
        info!(
            "New marker {} ({}, {:.3} m) at [{:.3}, {:.3}, {:.3}]",
            object_id,
            payload,
            size,
            t_world_marker.translation.x,
            t_world_marker.translation.y,
            t_world_marker.translation.z
        );

        self.tracked_markers.insert(object_id, record);
        self.notify_new_marker(NewMarkerEvent {
            object_id,
            payload,
            t_world_marker: Some(t_world_marker),
            size,
        });
        report.new_ids.push(object_id);
    }

    fn allocate_object_id(&mut self) -> ObjectId {
        let object_id = ObjectId::new(self.next_object_id);
        self.next_object_id += 1;
        object_id
    }

    fn notify_new_marker(&self, event: NewMarkerEvent) {
        if let Some(sink) = &self.event_sink {
            if let Err(err) = sink.try_send(event) {
                warn!("Dropping new-marker event: {}", err);
            }
        }
    }
}

/// Run the tracking step on every record, on `pool` if given.
///
/// Returns the number of successfully tracked records; all others are lost.
fn track_all(ctx: &TrackingContext<'_>, tracked_markers: &mut TrackedMarkersMap, pool: Option<&ThreadPool>) -> usize {
    let track_one = |(object_id, record): (&ObjectId, &mut TrackedMarker)| -> bool {
        let was_tracking = record.state() == TrackingState::Tracking;

        if track_marker(ctx, record) {
            prune_observations(record, ctx.config);
            return true;
        }

        if was_tracking {
            debug!("Lost {} ({})", object_id, record.payload());
        }
        record.set_tracking_lost(ctx.current.timestamp_ns);
        false
    };

    match pool {
        Some(pool) => pool.install(|| tracked_markers.par_iter_mut().map(track_one).filter(|&tracked| tracked).count()),
        None => tracked_markers.iter_mut().map(track_one).filter(|&tracked| tracked).count(),
    }
}

/// Drop observations that contradict the record's current pose and cap the
/// history length.
fn prune_observations(record: &mut TrackedMarker, config: &TrackerConfig) {
    let t_world_marker = *record.t_world_marker();
    for history in record.observation_histories_mut() {
        let camera = match history.latest() {
            Some(observation) => observation.camera.clone(),
            None => continue,
        };
        history.remove_observations(
            camera.as_ref(),
            &t_world_marker,
            config.observation_history_max_projection_error,
            config.observation_history_max_outlier_fraction,
        );
        history.trim_to(config.observation_history_capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::collaborators::{
        LocatorDetector, MarkerDetector, PatchSize, PointTracker, StereoPoseSolver, StereoRig, StereoSolution,
        Triangulation,
    };
    use crate::marker::{ErrorCorrection, IndexTriplet, LocatorFeature, LocatorTriplet, MarkerPayload};
    use image::GrayImage;
    use nalgebra::{Vector2, Vector3};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Returns a scripted list of detections and counts its calls.
    #[derive(Default)]
    struct ScriptedDetector {
        detections: Mutex<Vec<MarkerDetection>>,
        calls: Mutex<Vec<bool>>,
    }

    impl MarkerDetector for ScriptedDetector {
        fn detect(
            &self,
            _cameras: &[SharedCamera],
            _frames: &[CameraFrame],
            _t_world_device: &SE3,
            _t_device_cameras: &[SE3],
            allow_unlocalized: bool,
            _pool: Option<&ThreadPool>,
        ) -> Vec<MarkerDetection> {
            self.calls.lock().push(allow_unlocalized);
            self.detections.lock().clone()
        }
    }

    /// Never finds anything, so tracking always fails.
    struct Blind;

    impl StereoPoseSolver for Blind {
        fn triangulate(&self, _rig: &StereoRig, _a: &LocatorTriplet, _b: &LocatorTriplet) -> Option<Triangulation> {
            None
        }

        fn solve(
            &self,
            _images: [&GrayImage; 2],
            _rig: &StereoRig,
            _a: &LocatorTriplet,
            _b: &LocatorTriplet,
            _triangulation: &Triangulation,
            _version: u32,
        ) -> Option<StereoSolution> {
            None
        }
    }

    impl PointTracker for Blind {
        fn track_points(
            &self,
            _previous: &FramePyramid,
            _current: &FramePyramid,
            _previous_points: &[Vector2<f64>],
            predicted_points: &[Vector2<f64>],
            _patch: PatchSize,
        ) -> Vec<Vector2<f64>> {
            predicted_points.to_vec()
        }
    }

    impl LocatorDetector for Blind {
        fn detect_locators(&self, _image: &GrayImage, _min_distance: u32) -> Vec<LocatorFeature> {
            Vec::new()
        }

        fn extract_triplets(&self, _features: &[LocatorFeature]) -> Vec<IndexTriplet> {
            Vec::new()
        }
    }

    fn tracker(config: TrackerConfig) -> (MarkerTracker, Arc<ScriptedDetector>) {
        let detector = Arc::new(ScriptedDetector::default());
        let blind = Arc::new(Blind);
        let collaborators = Collaborators::new(detector.clone(), blind.clone(), blind.clone(), blind);
        (MarkerTracker::new(config, collaborators), detector)
    }

    fn rig() -> (Vec<SharedCamera>, Vec<SE3>) {
        let camera: SharedCamera = Arc::new(PinholeCamera::new(64, 48, 50.0, 50.0, 32.0, 24.0));
        (
            vec![camera.clone(), camera],
            vec![
                SE3::from_translation(Vector3::new(-0.05, 0.0, 0.0)),
                SE3::from_translation(Vector3::new(0.05, 0.0, 0.0)),
            ],
        )
    }

    fn frames(timestamp_ns: u64) -> Vec<CameraFrame> {
        vec![
            CameraFrame::new(GrayImage::new(64, 48), timestamp_ns),
            CameraFrame::new(GrayImage::new(64, 48), timestamp_ns),
        ]
    }

    fn detection(text: &str, x: f64) -> MarkerDetection {
        MarkerDetection::localized(
            MarkerPayload::new(1, ErrorCorrection::Low, text),
            SE3::from_translation(Vector3::new(x, 0.0, 1.0)),
            0.1,
        )
    }

    #[test]
    fn test_invalid_input_is_a_no_op() {
        let (mut tracker, detector) = tracker(TrackerConfig::default());
        let (cameras, poses) = rig();

        tracker.track_markers(&cameras[..1], &frames(0)[..1], &SE3::identity(), &poses[..1], None);
        tracker.track_markers(&cameras, &frames(0)[..1], &SE3::identity(), &poses, None);

        let mut bad_pose = SE3::identity();
        bad_pose.translation.x = f64::NAN;
        tracker.track_markers(&cameras, &frames(0), &bad_pose, &poses, None);

        assert_eq!(tracker.frame_counter(), 0);
        assert!(detector.calls.lock().is_empty());
    }

    #[test]
    fn test_timestamps_must_not_go_backwards() {
        let (mut tracker, detector) = tracker(TrackerConfig::default());
        let (cameras, poses) = rig();

        tracker.track_markers(&cameras, &frames(1_000), &SE3::identity(), &poses, None);
        tracker.track_markers(&cameras, &frames(999), &SE3::identity(), &poses, None);

        assert_eq!(tracker.frame_counter(), 1);
        assert_eq!(detector.calls.lock().len(), 1);
    }

    #[test]
    fn test_lost_marker_is_merged_not_duplicated() {
        let (mut tracker, detector) = tracker(TrackerConfig::default());
        let (cameras, poses) = rig();
        detector.detections.lock().push(detection("a", 0.0));

        let map = tracker.track_markers(&cameras, &frames(0), &SE3::identity(), &poses, None);
        assert_eq!(map.len(), 1);

        // tracking fails with the blind collaborators, so detection runs again
        *detector.detections.lock() = vec![detection("a", 0.01)];
        let map = tracker.track_markers(&cameras, &frames(10), &SE3::identity(), &poses, None);

        assert_eq!(map.len(), 1);
        let record = &map[&ObjectId::new(0)];
        assert_eq!(record.state(), TrackingState::Tracking);
        assert_eq!(record.tracking_timestamp_ns(), 10);
        assert_eq!(record.t_world_marker().translation.x, 0.01);
        assert!(tracker.last_report().detection_ran);
        assert!(tracker.last_report().new_ids.is_empty());
    }

    #[test]
    fn test_detections_with_unusable_size_create_no_record() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let (tracker, detector) = tracker(TrackerConfig::default());
        let mut tracker = tracker.with_event_sink(sender);
        let (cameras, poses) = rig();
        let pose = SE3::from_translation(Vector3::new(0.0, 0.0, 1.0));
        *detector.detections.lock() = vec![
            MarkerDetection::localized(MarkerPayload::new(1, ErrorCorrection::Low, "inf"), pose, f64::INFINITY),
            MarkerDetection::localized(MarkerPayload::new(1, ErrorCorrection::Low, "nan"), pose, f64::NAN),
            detection("ok", 0.3),
        ];

        let map = tracker.track_markers(&cameras, &frames(0), &SE3::identity(), &poses, None);

        assert_eq!(map.len(), 1);
        assert!(map.values().all(|record| record.is_valid()));
        assert_eq!(map[&ObjectId::new(0)].payload().data_string(), "ok");
        assert_eq!(tracker.last_report().new_ids, vec![ObjectId::new(0)]);
        assert_eq!(receiver.try_iter().count(), 1);
    }

    #[test]
    fn test_events_are_sent_for_new_markers() {
        let (sender, receiver) = crossbeam_channel::bounded(4);
        let (tracker, detector) = tracker(TrackerConfig::default());
        let mut tracker = tracker.with_event_sink(sender);
        let (cameras, poses) = rig();
        *detector.detections.lock() = vec![detection("a", 0.0), detection("b", 0.5)];

        tracker.track_markers(&cameras, &frames(0), &SE3::identity(), &poses, None);

        let events: Vec<NewMarkerEvent> = receiver.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_ne!(events[0].object_id, events[1].object_id);
        assert_eq!(tracker.last_report().new_ids.len(), 2);
    }

    #[test]
    fn test_full_event_sink_does_not_block() {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let (tracker, detector) = tracker(TrackerConfig::default());
        let mut tracker = tracker.with_event_sink(sender);
        let (cameras, poses) = rig();
        *detector.detections.lock() = vec![detection("a", 0.0), detection("b", 0.5), detection("c", 1.0)];

        let map = tracker.track_markers(&cameras, &frames(0), &SE3::identity(), &poses, None);

        assert_eq!(map.len(), 3);
        assert_eq!(receiver.try_iter().count(), 1);
    }

    #[test]
    fn test_detection_only_mode_keeps_no_state() {
        let (mut tracker, detector) = tracker(TrackerConfig::detection_only());
        let (cameras, poses) = rig();
        *detector.detections.lock() = vec![
            detection("a", 0.0),
            MarkerDetection::unlocalized(MarkerPayload::new(1, ErrorCorrection::Low, "flat")),
        ];

        tracker.track_markers(&cameras, &frames(0), &SE3::identity(), &poses, None);
        let first_ids: Vec<ObjectId> = tracker.tracked_markers().keys().copied().collect();
        assert_eq!(first_ids.len(), 1);
        assert_eq!(tracker.last_report().unlocalized.len(), 1);

        let map = tracker.track_markers(&cameras, &frames(1), &SE3::identity(), &poses, None);

        // map was rebuilt from scratch, with fresh ids
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&first_ids[0]));
        assert_eq!(*detector.calls.lock(), vec![true, true]);
    }

    #[test]
    fn test_reset_never_reuses_ids() {
        let (mut tracker, detector) = tracker(TrackerConfig::default());
        let (cameras, poses) = rig();
        detector.detections.lock().push(detection("a", 0.0));

        tracker.track_markers(&cameras, &frames(0), &SE3::identity(), &poses, None);
        tracker.reset();
        assert!(tracker.is_empty());

        tracker.track_markers(&cameras, &frames(0), &SE3::identity(), &poses, None);

        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(ObjectId::new(1)).is_some());
        assert!(tracker.get(ObjectId::new(0)).is_none());
    }
}
