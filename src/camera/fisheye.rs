//! Equidistant fisheye camera (`r = f * theta`).

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::CameraModel;

/// Largest supported incidence angle (just below 180 degrees field of view).
const MAX_THETA: f64 = std::f64::consts::FRAC_PI_2 * 0.99;

/// Ideal equidistant fisheye model, as used by wide-angle tracking cameras.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FisheyeCamera {
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl FisheyeCamera {
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
}

impl CameraModel for FisheyeCamera {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>> {
        let r_xy = (p_cam.x * p_cam.x + p_cam.y * p_cam.y).sqrt();
        let theta = r_xy.atan2(p_cam.z);
        if theta > MAX_THETA {
            return None;
        }
        if r_xy < f64::EPSILON {
            return Some(Vector2::new(self.cx, self.cy));
        }
        let scale = theta / r_xy;
        Some(Vector2::new(
            self.fx * scale * p_cam.x + self.cx,
            self.fy * scale * p_cam.y + self.cy,
        ))
    }

    fn unproject(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        let mx = (pixel.x - self.cx) / self.fx;
        let my = (pixel.y - self.cy) / self.fy;
        let theta = (mx * mx + my * my).sqrt();
        if theta < f64::EPSILON {
            return Vector3::z();
        }
        let s = theta.sin() / theta;
        Vector3::new(mx * s, my * s, theta.cos())
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
