//! Frame-to-frame tracking of one known marker.
//!
//! The three locator centers of the marker are projected into the previous
//! and current frames, carried over with the point tracker, and locator
//! features are re-detected in small crops around the tracked positions.
//! The re-detected features are then solved in stereo again, which yields a
//! fresh pose without accumulating drift.

use image::GrayImage;
use nalgebra::Vector2;
use tracing::{debug, warn};

use crate::collaborators::{Collaborators, LocatorDetector, PatchSize, StereoRig};
use crate::frame;
use crate::marker::{
    locator_anchors, modules_per_side, IndexTriplet, LocatorFeature, LocatorTriplet, LOCATOR_WIDTH_MODULES,
};
use crate::tracking::config::TrackerConfig;
use crate::tracking::frame_set::FrameSet;
use crate::tracking::record::TrackedMarker;
use crate::tracking::TrackingState;

/// Cameras used for tracking; further cameras only feed detection.
pub(crate) const STEREO_CAMERAS: usize = 2;
/// Smallest crop (pixels) searched for locator features.
const MIN_CROP_SIZE: u32 = 29;
/// Crops clamped below this size at the image border are skipped.
const MIN_CLAMPED_CROP_SIZE: u32 = 21;
/// Crop edge length in modules around a tracked locator center.
const CROP_SIZE_MODULES: f64 = 27.0;
/// Locator features closer than this (pixels) are duplicates.
const MIN_LOCATOR_DISTANCE: u32 = 5;

/// Inputs shared by all markers tracked in one call.
pub(crate) struct TrackingContext<'a> {
    pub previous: &'a FrameSet,
    pub current: &'a FrameSet,
    pub collaborators: &'a Collaborators,
    pub config: &'a TrackerConfig,
}

/// Track `record` from the previous into the current frame-set.
///
/// Only records in state `Tracking` are attempted. On success the record
/// holds the new pose, size and timestamp, and each camera's observation
/// history received the correspondences of the accepted solve.
pub(crate) fn track_marker(ctx: &TrackingContext<'_>, record: &mut TrackedMarker) -> bool {
    if record.state() != TrackingState::Tracking {
        return false;
    }

    let version = record.payload().version;
    let anchors = locator_anchors(version, record.size());
    let modules = modules_per_side(version);
    let locator_detector = ctx.collaborators.locator_detector.as_ref();

    let mut features: [Vec<LocatorFeature>; STEREO_CAMERAS] = [Vec::new(), Vec::new()];

    for (camera_index, found) in features.iter_mut().enumerate() {
        let previous_camera = &ctx.previous.cameras[camera_index];
        let camera = &ctx.current.cameras[camera_index];
        let t_previous_camera_world = ctx.previous.t_world_camera(camera_index).inverse();
        let t_camera_world = ctx.current.t_world_camera(camera_index).inverse();

        let mut previous_points = Vec::with_capacity(anchors.len());
        let mut predicted_points = Vec::with_capacity(anchors.len());

        for anchor in &anchors {
            let p_world = record.t_world_marker().transform_point(anchor);
            let previous_point = previous_camera.project(&t_previous_camera_world.transform_point(&p_world));
            let predicted_point = camera.project(&t_camera_world.transform_point(&p_world));

            if let (Some(previous_point), Some(predicted_point)) = (previous_point, predicted_point) {
                if previous_camera.is_inside(&previous_point, ctx.config.anchor_border)
                    && camera.is_inside(&predicted_point, ctx.config.anchor_border)
                {
                    previous_points.push(previous_point);
                    predicted_points.push(predicted_point);
                }
            }
        }

        if previous_points.len() < anchors.len() {
            debug!(
                "camera {}: only {} of {} anchors visible",
                camera_index,
                previous_points.len(),
                anchors.len()
            );
            continue;
        }

        let finest = ctx.current.pyramids[camera_index].finest_layer();
        let patch = PatchSize::for_width(finest.width(), ctx.config.low_resolution_width);
        let tracked_points = ctx.collaborators.point_tracker.track_points(
            &ctx.previous.pyramids[camera_index],
            &ctx.current.pyramids[camera_index],
            &previous_points,
            &predicted_points,
            patch,
        );

        if tracked_points.len() != previous_points.len() {
            debug!(
                "camera {}: point tracker returned {} of {} points",
                camera_index,
                tracked_points.len(),
                previous_points.len()
            );
            continue;
        }

        redetect_locators(finest, &tracked_points, modules, locator_detector, found);
    }

    let [features_a, features_b] = &features;

    if features_a.len() < 3 || features_b.len() < 3 {
        debug!(
            "not enough locator features ({} / {})",
            features_a.len(),
            features_b.len()
        );
        return false;
    }

    let cap = ctx.config.max_locator_features_per_camera;
    if features_a.len() > cap || features_b.len() > cap {
        warn!(
            "too many locator features ({} / {}, cap {}), giving up on {}",
            features_a.len(),
            features_b.len(),
            cap,
            record.payload()
        );
        return false;
    }

    let triplets_a = locator_detector.extract_triplets(features_a);
    let triplets_b = locator_detector.extract_triplets(features_b);

    if triplets_a.is_empty() || triplets_b.is_empty() {
        debug!("no locator triplets ({} / {})", triplets_a.len(), triplets_b.len());
        return false;
    }

    let rig = StereoRig::new(
        [ctx.current.cameras[0].clone(), ctx.current.cameras[1].clone()],
        ctx.current.t_world_device,
        [ctx.current.t_device_cameras[0], ctx.current.t_device_cameras[1]],
    );
    let images = [
        ctx.current.pyramids[0].finest_layer(),
        ctx.current.pyramids[1].finest_layer(),
    ];
    let solver = ctx.collaborators.stereo_solver.as_ref();

    for index_triplet_a in &triplets_a {
        let Some(triplet_a) = gather_triplet(features_a, index_triplet_a) else {
            continue;
        };

        for index_triplet_b in &triplets_b {
            let Some(triplet_b) = gather_triplet(features_b, index_triplet_b) else {
                continue;
            };

            let Some(triangulation) = solver.triangulate(&rig, &triplet_a, &triplet_b) else {
                continue;
            };
            let Some(solution) = solver.solve(images, &rig, &triplet_a, &triplet_b, &triangulation, version)
            else {
                continue;
            };

            if !solution.payload.is_same(record.payload(), true) {
                continue;
            }

            record.update_tracking_pose(solution.t_world_marker, solution.size, ctx.current.timestamp_ns);
            record_observations(ctx.current, record, [&triplet_a, &triplet_b]);
            return true;
        }
    }

    debug!(
        "no triplet combination re-identified {} ({} x {} triplets)",
        record.payload(),
        triplets_a.len(),
        triplets_b.len()
    );
    false
}

fn gather_triplet(features: &[LocatorFeature], indices: &IndexTriplet) -> Option<LocatorTriplet> {
    Some([
        features.get(indices[0])?.clone(),
        features.get(indices[1])?.clone(),
        features.get(indices[2])?.clone(),
    ])
}

/// Search crops around `tracked_points` for locator features and append the
/// ones not already in `found`.
fn redetect_locators(
    image: &GrayImage,
    tracked_points: &[Vector2<f64>],
    modules_per_side: u32,
    detector: &dyn LocatorDetector,
    found: &mut Vec<LocatorFeature>,
) {
    if tracked_points.len() < 3 || image.width() == 0 || image.height() == 0 {
        return;
    }

    // anchors are (modules_per_side - 7) modules apart
    let average_distance = 0.5
        * ((tracked_points[0] - tracked_points[1]).norm() + (tracked_points[0] - tracked_points[2]).norm());
    let module_size = average_distance / (modules_per_side as f64 - LOCATOR_WIDTH_MODULES);
    let crop_size = ((module_size * CROP_SIZE_MODULES).round() as u32).max(MIN_CROP_SIZE);
    let half_crop = crop_size as f64 * 0.5;
    let min_sqr_distance = (MIN_LOCATOR_DISTANCE * MIN_LOCATOR_DISTANCE) as f64;

    for point in tracked_points {
        if !point.x.is_finite() || !point.y.is_finite() {
            continue;
        }

        let left = if point.x > half_crop { (point.x - half_crop) as u32 } else { 0 };
        let top = if point.y > half_crop { (point.y - half_crop) as u32 } else { 0 };
        if left >= image.width() || top >= image.height() {
            continue;
        }

        let right = (left + crop_size - 1).min(image.width() - 1);
        let bottom = (top + crop_size - 1).min(image.height() - 1);
        let crop_width = right - left + 1;
        let crop_height = bottom - top + 1;

        if crop_width < MIN_CLAMPED_CROP_SIZE || crop_height < MIN_CLAMPED_CROP_SIZE {
            continue;
        }

        let crop = frame::crop(image, left, top, crop_width, crop_height);
        let offset = Vector2::new(left as f64, top as f64);

        for feature in detector.detect_locators(&crop, MIN_LOCATOR_DISTANCE) {
            let feature = feature.translated(offset);
            let is_duplicate = found
                .iter()
                .any(|existing| (existing.position - feature.position).norm_squared() < min_sqr_distance);
            if !is_duplicate {
                found.push(feature);
            }
        }
    }
}

/// Store the accepted locator centers as observations of the anchors.
fn record_observations(current: &FrameSet, record: &mut TrackedMarker, triplets: [&LocatorTriplet; 2]) {
    let anchors = locator_anchors(record.payload().version, record.size());

    for (camera_index, triplet) in triplets.into_iter().enumerate() {
        let t_world_camera = current.t_world_camera(camera_index);
        let camera = current.cameras[camera_index].clone();
        if let Some(history) = record.observation_history_mut(camera_index) {
            history.add_observation(
                camera,
                t_world_camera,
                anchors.to_vec(),
                triplet.iter().map(|feature| feature.position).collect(),
            );
        }
    }
}
