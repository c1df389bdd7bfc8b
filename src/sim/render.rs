//! Ray-cast rendering of marker locator features.

use std::sync::Arc;

use image::{GrayImage, Luma};
use nalgebra::{Vector2, Vector3};

use crate::camera::{CameraModel, PinholeCamera, SharedCamera};
use crate::frame::CameraFrame;
use crate::geometry::SE3;
use crate::marker::{modules_per_side, LOCATOR_WIDTH_MODULES};
use crate::sim::scene::{SimScene, SimulatedMarker};

const BACKGROUND: u8 = 255;
const LOCATOR: u8 = 0;

/// Extra pixels ray-cast around the projected outline of a marker.
const OUTLINE_MARGIN: f64 = 2.0;

/// Cameras of a simulated head-mounted device.
#[derive(Debug, Clone)]
pub struct SimRig {
    pub cameras: Vec<SharedCamera>,
    pub t_device_cameras: Vec<SE3>,
}

impl SimRig {
    /// Two forward-looking pinhole cameras `baseline` meters apart along x.
    pub fn stereo(width: u32, height: u32, focal_length: f64, baseline: f64) -> Self {
        let camera: SharedCamera = Arc::new(PinholeCamera::new(
            width,
            height,
            focal_length,
            focal_length,
            width as f64 * 0.5,
            height as f64 * 0.5,
        ));
        Self {
            cameras: vec![camera.clone(), camera],
            t_device_cameras: vec![
                SE3::from_translation(Vector3::new(-baseline * 0.5, 0.0, 0.0)),
                SE3::from_translation(Vector3::new(baseline * 0.5, 0.0, 0.0)),
            ],
        }
    }

    /// VGA stereo pair with a 10 cm baseline.
    pub fn vga_stereo() -> Self {
        Self::stereo(640, 480, 500.0, 0.1)
    }

    /// Render one frame per camera.
    pub fn render(&self, scene: &SimScene, t_world_device: &SE3, timestamp_ns: u64) -> Vec<CameraFrame> {
        self.cameras
            .iter()
            .zip(&self.t_device_cameras)
            .map(|(camera, t_device_camera)| {
                let t_world_camera = t_world_device.compose(t_device_camera);
                CameraFrame::new(render_image(scene, camera.as_ref(), &t_world_camera), timestamp_ns)
            })
            .collect()
    }
}

/// White image with the locator features of all visible markers in black.
pub fn render_image(scene: &SimScene, camera: &dyn CameraModel, t_world_camera: &SE3) -> GrayImage {
    let mut image = GrayImage::from_pixel(camera.width(), camera.height(), Luma([BACKGROUND]));
    for marker in scene.markers.iter().filter(|marker| marker.visible) {
        draw_marker(&mut image, marker, camera, t_world_camera);
    }
    image
}

fn draw_marker(image: &mut GrayImage, marker: &SimulatedMarker, camera: &dyn CameraModel, t_world_camera: &SE3) {
    let t_marker_camera = marker.t_world_marker.inverse().compose(t_world_camera);
    let origin = t_marker_camera.translation;
    // printed side only
    if origin.z <= 0.0 {
        return;
    }

    let half = marker.size * 0.5;
    let t_camera_marker = t_world_camera.inverse().compose(&marker.t_world_marker);
    let mut outline: Vec<Vector2<f64>> = Vec::with_capacity(4);
    for (x, y) in [(-half, half), (-half, -half), (half, -half), (half, half)] {
        match camera.project(&t_camera_marker.transform_point(&Vector3::new(x, y, 0.0))) {
            Some(pixel) => outline.push(pixel),
            None => return,
        }
    }

    let min_x = outline.iter().map(|p| p.x).fold(f64::INFINITY, f64::min) - OUTLINE_MARGIN;
    let max_x = outline.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max) + OUTLINE_MARGIN;
    let min_y = outline.iter().map(|p| p.y).fold(f64::INFINITY, f64::min) - OUTLINE_MARGIN;
    let max_y = outline.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max) + OUTLINE_MARGIN;

    if max_x < 0.0 || max_y < 0.0 || min_x >= image.width() as f64 || min_y >= image.height() as f64 {
        return;
    }
    let x0 = min_x.max(0.0).floor() as u32;
    let y0 = min_y.max(0.0).floor() as u32;
    let x1 = (max_x.ceil() as u32).min(image.width() - 1);
    let y1 = (max_y.ceil() as u32).min(image.height() - 1);

    let locator_width = marker.size / modules_per_side(marker.payload.version) as f64 * LOCATOR_WIDTH_MODULES;

    for v in y0..=y1 {
        for u in x0..=x1 {
            let ray = t_marker_camera.transform_vector(&camera.unproject(&Vector2::new(u as f64, v as f64)));
            if ray.z.abs() < f64::EPSILON {
                continue;
            }
            let s = -origin.z / ray.z;
            if s <= 0.0 {
                continue;
            }
            let hit = origin + ray * s;
            if in_locator(hit.x, hit.y, half, locator_width) {
                image.put_pixel(u, v, Luma([LOCATOR]));
            }
        }
    }
}

/// True if marker-plane point (x, y) lies on one of the three locator squares.
fn in_locator(x: f64, y: f64, half: f64, width: f64) -> bool {
    let left = (-half..=-half + width).contains(&x);
    let right = (half - width..=half).contains(&x);
    let top = (half - width..=half).contains(&y);
    let bottom = (-half..=-half + width).contains(&y);
    (left && top) || (left && bottom) || (right && top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{locator_anchors, ErrorCorrection, MarkerPayload};
    use crate::sim::scene::facing_pose;

    #[test]
    fn test_locators_are_drawn_at_projected_anchors() {
        let marker = SimulatedMarker::new(
            MarkerPayload::new(1, ErrorCorrection::Low, "r"),
            facing_pose(Vector3::new(0.0, 0.0, 1.0)),
            0.21,
        );
        let scene = SimScene::new(vec![marker.clone()]);
        let camera = PinholeCamera::new(640, 480, 500.0, 500.0, 320.0, 240.0);

        let image = render_image(&scene, &camera, &SE3::identity());

        for anchor in locator_anchors(1, 0.21) {
            let pixel = camera.project(&marker.t_world_marker.transform_point(&anchor)).unwrap();
            assert_eq!(image.get_pixel(pixel.x.round() as u32, pixel.y.round() as u32)[0], LOCATOR);
        }
        // marker center and the free corner stay white
        assert_eq!(image.get_pixel(320, 240)[0], BACKGROUND);
        let free_corner = camera
            .project(&marker.t_world_marker.transform_point(&Vector3::new(0.08, -0.08, 0.0)))
            .unwrap();
        assert_eq!(image.get_pixel(free_corner.x as u32, free_corner.y as u32)[0], BACKGROUND);
    }

    #[test]
    fn test_back_side_and_hidden_markers_are_not_drawn() {
        let payload = MarkerPayload::new(1, ErrorCorrection::Low, "r");
        let away = SimulatedMarker::new(payload.clone(), SE3::from_translation(Vector3::new(0.0, 0.0, 1.0)), 0.21);
        let mut hidden = SimulatedMarker::new(payload, facing_pose(Vector3::new(0.0, 0.0, 1.0)), 0.21);
        hidden.visible = false;
        let scene = SimScene::new(vec![away, hidden]);
        let camera = PinholeCamera::new(64, 48, 50.0, 50.0, 32.0, 24.0);

        let image = render_image(&scene, &camera, &SE3::identity());

        assert!(image.pixels().all(|p| p[0] == BACKGROUND));
    }
}
