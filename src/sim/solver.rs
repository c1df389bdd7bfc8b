//! Stereo triangulation and pose solving for simulated markers.

use image::GrayImage;
use nalgebra::{Matrix3, Vector2, Vector3};

use crate::collaborators::{StereoPoseSolver, StereoRig, StereoSolution, Triangulation};
use crate::geometry::SE3;
use crate::marker::{modules_per_side, LocatorTriplet, LOCATOR_WIDTH_MODULES};
use crate::sim::scene::SharedScene;

/// Rays closer than this (meters, plus a fraction of the depth) intersect.
const MAX_RAY_GAP: f64 = 0.005;
const MAX_RAY_GAP_PER_METER: f64 = 0.01;

/// Maximum |cos| between the two edges of a solved code.
const MAX_EDGE_COSINE: f64 = 0.1;
/// Maximum relative length difference of the two edges of a solved code.
const MAX_EDGE_DIFFERENCE: f64 = 0.1;

/// Triangulates locator centers by ray midpoints and builds the marker pose
/// from the three centers; decoding looks the marker up in the scene.
pub struct SimStereoSolver {
    scene: SharedScene,
}

impl SimStereoSolver {
    pub fn new(scene: SharedScene) -> Self {
        Self { scene }
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }
}

/// Closest point between the viewing rays of `pixel_a` and `pixel_b`.
///
/// Returns the midpoint and the distance to camera A.
fn triangulate_point(rig: &StereoRig, pixel_a: &Vector2<f64>, pixel_b: &Vector2<f64>) -> Option<(Vector3<f64>, f64)> {
    let t_world_camera_a = rig.t_world_camera(0);
    let t_world_camera_b = rig.t_world_camera(1);

    let origin_a = t_world_camera_a.translation;
    let origin_b = t_world_camera_b.translation;
    let ray_a = t_world_camera_a.transform_vector(&rig.cameras[0].unproject(pixel_a));
    let ray_b = t_world_camera_b.transform_vector(&rig.cameras[1].unproject(pixel_b));

    let w0 = origin_a - origin_b;
    let b = ray_a.dot(&ray_b);
    let d = ray_a.dot(&w0);
    let e = ray_b.dot(&w0);
    let denominator = 1.0 - b * b;
    if denominator < 1e-12 {
        return None;
    }

    let s = (b * e - d) / denominator;
    let t = (e - b * d) / denominator;
    if s <= 0.0 || t <= 0.0 {
        return None;
    }

    let point_a = origin_a + ray_a * s;
    let point_b = origin_b + ray_b * t;
    if (point_a - point_b).norm() > MAX_RAY_GAP + MAX_RAY_GAP_PER_METER * s {
        return None;
    }

    Some(((point_a + point_b) * 0.5, s))
}

impl StereoPoseSolver for SimStereoSolver {
    fn triangulate(
        &self,
        rig: &StereoRig,
        triplet_a: &LocatorTriplet,
        triplet_b: &LocatorTriplet,
    ) -> Option<Triangulation> {
        let mut world_points = [Vector3::zeros(); 3];
        let mut total_distance = 0.0;

        for (index, world_point) in world_points.iter_mut().enumerate() {
            let (point, distance) = triangulate_point(rig, &triplet_a[index].position, &triplet_b[index].position)?;
            *world_point = point;
            total_distance += distance;
        }

        Some(Triangulation {
            world_points,
            average_center_distance: total_distance / 3.0,
        })
    }

    fn solve(
        &self,
        _images: [&GrayImage; 2],
        _rig: &StereoRig,
        _triplet_a: &LocatorTriplet,
        _triplet_b: &LocatorTriplet,
        triangulation: &Triangulation,
        version: u32,
    ) -> Option<StereoSolution> {
        let [top_left, bottom_left, top_right] = triangulation.world_points;

        let x_edge = top_right - top_left;
        let y_edge = top_left - bottom_left;
        let (x_length, y_length) = (x_edge.norm(), y_edge.norm());
        if x_length < f64::EPSILON || y_length < f64::EPSILON {
            return None;
        }
        if (x_length - y_length).abs() > MAX_EDGE_DIFFERENCE * x_length.max(y_length) {
            return None;
        }
        if (x_edge.dot(&y_edge) / (x_length * y_length)).abs() > MAX_EDGE_COSINE {
            return None;
        }

        let x_axis = x_edge / x_length;
        let z_axis = x_axis.cross(&y_edge).normalize();
        let y_axis = z_axis.cross(&x_axis);
        let rotation = Matrix3::from_columns(&[x_axis, y_axis, z_axis]);
        let center = (bottom_left + top_right) * 0.5;

        // anchor distance is (modules_per_side - 7) modules
        let modules = modules_per_side(version) as f64;
        let size = 0.5 * (x_length + y_length) * modules / (modules - LOCATOR_WIDTH_MODULES);

        let scene = self.scene.read();
        let marker = scene.nearest_visible(&center, version, 0.5 * size)?;

        Some(StereoSolution {
            payload: marker.payload.clone(),
            t_world_marker: SE3::from_rt(rotation, center),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{locator_anchors, ErrorCorrection, LocatorFeature, MarkerPayload};
    use crate::sim::render::SimRig;
    use crate::sim::scene::{facing_pose, SimScene, SimulatedMarker};
    use approx::assert_relative_eq;

    fn project_triplet(rig: &StereoRig, camera: usize, marker: &SimulatedMarker) -> LocatorTriplet {
        let t_camera_world = rig.t_world_camera(camera).inverse();
        locator_anchors(marker.payload.version, marker.size).map(|anchor| {
            let p_world = marker.t_world_marker.transform_point(&anchor);
            let pixel = rig.cameras[camera].project(&t_camera_world.transform_point(&p_world)).unwrap();
            LocatorFeature::new(pixel, 20.0)
        })
    }

    fn setup() -> (SimStereoSolver, StereoRig, SimulatedMarker) {
        let marker = SimulatedMarker::new(
            MarkerPayload::new(2, ErrorCorrection::Medium, "solver"),
            facing_pose(Vector3::new(0.05, -0.02, 0.8)),
            0.15,
        );
        let scene = SimScene::new(vec![marker.clone()]).into_shared();
        let sim_rig = SimRig::vga_stereo();
        let rig = StereoRig::new(
            [sim_rig.cameras[0].clone(), sim_rig.cameras[1].clone()],
            SE3::identity(),
            [sim_rig.t_device_cameras[0], sim_rig.t_device_cameras[1]],
        );
        (SimStereoSolver::new(scene), rig, marker)
    }

    #[test]
    fn test_recovers_marker_pose_and_payload() {
        let (solver, rig, marker) = setup();
        let triplet_a = project_triplet(&rig, 0, &marker);
        let triplet_b = project_triplet(&rig, 1, &marker);
        let images = [&GrayImage::new(1, 1), &GrayImage::new(1, 1)];

        let triangulation = solver.triangulate(&rig, &triplet_a, &triplet_b).unwrap();
        assert_relative_eq!(triangulation.average_center_distance, 0.8, epsilon = 0.05);

        let solution = solver
            .solve(images, &rig, &triplet_a, &triplet_b, &triangulation, 2)
            .unwrap();

        assert_eq!(solution.payload, marker.payload);
        assert_relative_eq!(solution.size, 0.15, epsilon = 1e-9);
        assert_relative_eq!(solution.t_world_marker.translation, marker.t_world_marker.translation, epsilon = 1e-9);
        assert!(solution.t_world_marker.rotation.angle_to(&marker.t_world_marker.rotation) < 1e-6);
    }

    #[test]
    fn test_wrong_version_does_not_decode() {
        let (solver, rig, marker) = setup();
        let triplet_a = project_triplet(&rig, 0, &marker);
        let triplet_b = project_triplet(&rig, 1, &marker);
        let images = [&GrayImage::new(1, 1), &GrayImage::new(1, 1)];

        let triangulation = solver.triangulate(&rig, &triplet_a, &triplet_b).unwrap();

        assert!(solver.solve(images, &rig, &triplet_a, &triplet_b, &triangulation, 3).is_none());
    }

    #[test]
    fn test_mismatched_rays_are_rejected() {
        let (solver, rig, marker) = setup();
        let triplet_a = project_triplet(&rig, 0, &marker);
        let mut triplet_b = project_triplet(&rig, 1, &marker);
        triplet_b[0].position.y += 40.0;

        assert!(solver.triangulate(&rig, &triplet_a, &triplet_b).is_none());
    }
}
