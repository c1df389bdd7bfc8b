//! Full-frame stereo detection built from the locator detector and the
//! stereo solver.

use std::sync::Arc;

use nalgebra::Vector3;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::camera::SharedCamera;
use crate::collaborators::{LocatorDetector, MarkerDetection, MarkerDetector, StereoPoseSolver, StereoRig};
use crate::frame::CameraFrame;
use crate::geometry::SE3;
use crate::marker::payload::MAX_VERSION;
use crate::marker::{locator_anchors, IndexTriplet, LocatorFeature, LocatorTriplet, MarkerPayload, LOCATOR_WIDTH_MODULES};
use crate::sim::scene::SharedScene;
use crate::sim::solver::SimStereoSolver;

const MIN_LOCATOR_DISTANCE: u32 = 5;

/// Detects locators in both full frames, pairs all triplets and keeps every
/// pair the stereo solver can decode.
///
/// 2D-only results come from scene markers whose locators were found in one
/// camera only.
pub struct SimMarkerDetector {
    solver: Arc<SimStereoSolver>,
    locator_detector: Arc<dyn LocatorDetector>,
}

impl SimMarkerDetector {
    pub fn new(solver: Arc<SimStereoSolver>, locator_detector: Arc<dyn LocatorDetector>) -> Self {
        Self {
            solver,
            locator_detector,
        }
    }

    fn scene(&self) -> &SharedScene {
        self.solver.scene()
    }
}

/// Code version implied by a triplet: anchors are `17 + 4 * version - 7`
/// modules apart.
fn estimate_version(triplet: &LocatorTriplet) -> u32 {
    let module_size = triplet.iter().map(|f| f.module_size).sum::<f64>() / 3.0;
    if module_size <= 0.0 {
        return 1;
    }
    let distance = 0.5
        * ((triplet[1].position - triplet[0].position).norm() + (triplet[2].position - triplet[0].position).norm());
    let modules = distance / module_size + LOCATOR_WIDTH_MODULES;
    (((modules - 17.0) / 4.0).round().max(1.0) as u32).min(MAX_VERSION)
}

fn gather(features: &[LocatorFeature], indices: &IndexTriplet) -> Option<LocatorTriplet> {
    Some([
        features.get(indices[0])?.clone(),
        features.get(indices[1])?.clone(),
        features.get(indices[2])?.clone(),
    ])
}

impl MarkerDetector for SimMarkerDetector {
    fn detect(
        &self,
        cameras: &[SharedCamera],
        frames: &[CameraFrame],
        t_world_device: &SE3,
        t_device_cameras: &[SE3],
        allow_unlocalized: bool,
        pool: Option<&ThreadPool>,
    ) -> Vec<MarkerDetection> {
        if cameras.len() < 2 || frames.len() < 2 || t_device_cameras.len() < 2 {
            return Vec::new();
        }

        let detect = |frame: &CameraFrame| {
            let features = self.locator_detector.detect_locators(&frame.image, MIN_LOCATOR_DISTANCE);
            let triplets = self.locator_detector.extract_triplets(&features);
            (features, triplets)
        };
        let per_camera: Vec<(Vec<LocatorFeature>, Vec<IndexTriplet>)> = match pool {
            Some(pool) => pool.install(|| frames[..2].par_iter().map(detect).collect()),
            None => frames[..2].iter().map(detect).collect(),
        };
        let (features_a, triplets_a) = &per_camera[0];
        let (features_b, triplets_b) = &per_camera[1];

        let rig = StereoRig::new(
            [cameras[0].clone(), cameras[1].clone()],
            *t_world_device,
            [t_device_cameras[0], t_device_cameras[1]],
        );
        let images = [&frames[0].image, &frames[1].image];

        let mut detections: Vec<MarkerDetection> = Vec::new();

        for index_triplet_a in triplets_a {
            let Some(triplet_a) = gather(features_a, index_triplet_a) else {
                continue;
            };
            let version = estimate_version(&triplet_a);

            for index_triplet_b in triplets_b {
                let Some(triplet_b) = gather(features_b, index_triplet_b) else {
                    continue;
                };
                let Some(triangulation) = self.solver.triangulate(&rig, &triplet_a, &triplet_b) else {
                    continue;
                };
                let Some(solution) = self
                    .solver
                    .solve(images, &rig, &triplet_a, &triplet_b, &triangulation, version)
                else {
                    continue;
                };

                let duplicate = detections.iter().any(|detection| {
                    detection.payload == solution.payload
                        && detection.t_world_marker.is_some_and(|pose| {
                            (pose.translation - solution.t_world_marker.translation).norm() < 0.5 * solution.size
                        })
                });
                if !duplicate {
                    detections.push(MarkerDetection::localized(
                        solution.payload,
                        solution.t_world_marker,
                        solution.size,
                    ));
                }
            }
        }

        if allow_unlocalized {
            let localized: Vec<MarkerPayload> = detections.iter().map(|d| d.payload.clone()).collect();
            let scene = self.scene().read();

            for marker in scene.markers.iter().filter(|marker| marker.visible) {
                if localized.contains(&marker.payload) {
                    continue;
                }
                let anchors: Vec<Vector3<f64>> = locator_anchors(marker.payload.version, marker.size)
                    .iter()
                    .map(|anchor| marker.t_world_marker.transform_point(anchor))
                    .collect();
                let seen = [(features_a, 0), (features_b, 1)].into_iter().any(|(features, camera)| {
                    let t_camera_world = rig.t_world_camera(camera).inverse();
                    anchors.iter().all(|anchor| {
                        rig.cameras[camera]
                            .project(&t_camera_world.transform_point(anchor))
                            .is_some_and(|pixel| {
                                features
                                    .iter()
                                    .any(|feature| (feature.position - pixel).norm() < feature.length)
                            })
                    })
                });
                if seen {
                    detections.push(MarkerDetection::unlocalized(marker.payload.clone()));
                }
            }
        }

        detections
    }
}
