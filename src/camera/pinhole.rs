//! Distortion-free pinhole camera.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::CameraModel;

/// Minimum depth for a point to be considered in front of the camera.
const MIN_DEPTH: f64 = 1e-6;

/// Pinhole camera intrinsics with image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeCamera {
    pub fn new(width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
        }
    }

    /// Pinhole camera with the principal point in the image center and the
    /// given horizontal field of view (radians).
    pub fn from_fov(width: u32, height: u32, fov_x: f64) -> Self {
        let f = width as f64 * 0.5 / (fov_x * 0.5).tan();
        Self::new(
            width,
            height,
            f,
            f,
            (width as f64 - 1.0) * 0.5,
            (height as f64 - 1.0) * 0.5,
        )
    }
}

impl CameraModel for PinholeCamera {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p_cam.z <= MIN_DEPTH {
            return None;
        }
        Some(Vector2::new(
            self.fx * p_cam.x / p_cam.z + self.cx,
            self.fy * p_cam.y / p_cam.z + self.cy,
        ))
    }

    fn unproject(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        Vector3::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
            1.0,
        )
        .normalize()
    }

    fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx > 0.0
            && self.fy > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_unproject_consistency() {
        let camera = PinholeCamera::new(640, 480, 500.0, 510.0, 320.0, 240.0);
        let p = Vector3::new(0.2, -0.1, 1.5);

        let pixel = camera.project(&p).unwrap();
        let ray = camera.unproject(&pixel);

        assert_relative_eq!(ray, p.normalize(), epsilon = 1e-12);
    }

    #[test]
    fn test_point_behind_camera_is_rejected() {
        let camera = PinholeCamera::new(640, 480, 500.0, 500.0, 320.0, 240.0);
        assert!(camera.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_from_fov_centers_principal_point() {
        let camera = PinholeCamera::from_fov(641, 481, std::f64::consts::FRAC_PI_2);

        assert_relative_eq!(camera.cx, 320.0);
        assert_relative_eq!(camera.cy, 240.0);
        assert_relative_eq!(camera.fx, 320.5, epsilon = 1e-9);
        assert!(camera.is_valid());
    }
}
