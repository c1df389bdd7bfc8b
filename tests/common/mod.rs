//! Synthetic stereo rig driving a `MarkerTracker` frame by frame.

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use nalgebra::Vector3;

use rust_qrtrack::collaborators::Collaborators;
use rust_qrtrack::geometry::SE3;
use rust_qrtrack::marker::{ErrorCorrection, MarkerPayload};
use rust_qrtrack::sim::{self, facing_pose, SharedScene, SimRig, SimScene, SimulatedMarker};
use rust_qrtrack::tracking::{NewMarkerEvent, StepReport, TrackedMarkersMap};
use rust_qrtrack::{MarkerTracker, TrackerConfig};

pub const FRAME_INTERVAL_NS: u64 = 33_333_333;

pub fn marker(text: &str, version: u32, position: Vector3<f64>, size: f64) -> SimulatedMarker {
    SimulatedMarker::new(
        MarkerPayload::new(version, ErrorCorrection::Medium, text),
        facing_pose(position),
        size,
    )
}

pub struct Harness {
    pub scene: SharedScene,
    pub rig: SimRig,
    pub tracker: MarkerTracker,
    pub events: Receiver<NewMarkerEvent>,
    pub t_world_device: SE3,
    next_timestamp_ns: u64,
}

impl Harness {
    pub fn new(config: TrackerConfig, markers: Vec<SimulatedMarker>) -> Self {
        Self::with_collaborators(config, markers, sim::collaborators)
    }

    /// Like [`Harness::new`], with collaborators built by `make` from the scene.
    pub fn with_collaborators(
        config: TrackerConfig,
        markers: Vec<SimulatedMarker>,
        make: impl FnOnce(SharedScene) -> Collaborators,
    ) -> Self {
        let scene = SimScene::new(markers).into_shared();
        let (sender, events) = crossbeam_channel::unbounded();
        let tracker = MarkerTracker::new(config, make(scene.clone())).with_event_sink(sender);
        Self {
            scene,
            rig: SimRig::vga_stereo(),
            tracker,
            events,
            t_world_device: SE3::identity(),
            next_timestamp_ns: 0,
        }
    }

    /// Process the next frame-set, one frame interval after the previous one.
    pub fn step(&mut self) -> &TrackedMarkersMap {
        let timestamp_ns = self.next_timestamp_ns;
        self.step_at(timestamp_ns)
    }

    /// Process a frame-set captured at `timestamp_ns`.
    pub fn step_at(&mut self, timestamp_ns: u64) -> &TrackedMarkersMap {
        self.next_timestamp_ns = timestamp_ns + FRAME_INTERVAL_NS;
        let frames = self.rig.render(&self.scene.read(), &self.t_world_device, timestamp_ns);
        let map = self.tracker.track_markers(
            &self.rig.cameras,
            &frames,
            &self.t_world_device,
            &self.rig.t_device_cameras,
            None,
        );
        for (id, record) in map {
            assert!(record.is_valid(), "record {} is invalid", id);
        }
        map
    }

    pub fn report(&self) -> &StepReport {
        self.tracker.last_report()
    }

    pub fn set_visible(&self, index: usize, visible: bool) {
        self.scene.write().markers[index].visible = visible;
    }

    pub fn move_marker(&self, index: usize, offset: Vector3<f64>) {
        self.scene.write().markers[index].t_world_marker.translation += offset;
    }

    pub fn truth(&self, index: usize) -> SE3 {
        self.scene.read().markers[index].t_world_marker
    }

    pub fn drain_events(&self) -> Vec<NewMarkerEvent> {
        self.events.try_iter().collect()
    }
}
