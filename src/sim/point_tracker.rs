//! Coarse-to-fine SSD patch tracker.

use image::GrayImage;
use nalgebra::Vector2;

use crate::collaborators::{PatchSize, PointTracker};
use crate::frame::FramePyramid;

/// Search radius on all but the coarsest layer.
const REFINEMENT_RADIUS: i32 = 1;

/// Tracks points by exhaustive sum-of-squared-differences search on each
/// pyramid layer, refining the estimate from coarse to fine.
///
/// Ties keep the candidate closest to the start position.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsdPointTracker;

impl PointTracker for SsdPointTracker {
    fn track_points(
        &self,
        previous: &FramePyramid,
        current: &FramePyramid,
        previous_points: &[Vector2<f64>],
        predicted_points: &[Vector2<f64>],
        patch: PatchSize,
    ) -> Vec<Vector2<f64>> {
        let layers = previous.num_layers().min(current.num_layers());

        previous_points
            .iter()
            .zip(predicted_points)
            .map(|(previous_point, predicted_point)| {
                track_point(previous, current, layers, previous_point, predicted_point, patch)
            })
            .collect()
    }
}

fn track_point(
    previous: &FramePyramid,
    current: &FramePyramid,
    layers: usize,
    previous_point: &Vector2<f64>,
    predicted_point: &Vector2<f64>,
    patch: PatchSize,
) -> Vector2<f64> {
    let coarsest = layers.saturating_sub(1);
    let mut estimate = predicted_point / f64::powi(2.0, coarsest as i32);

    for layer in (0..layers).rev() {
        let (Some(previous_layer), Some(current_layer)) = (previous.layer(layer), current.layer(layer)) else {
            return *predicted_point;
        };
        let scale = f64::powi(2.0, layer as i32);
        let reference = previous_point / scale;
        let radius = if layer == coarsest {
            patch.coarsest_layer_radius as i32
        } else {
            REFINEMENT_RADIUS
        };

        estimate = best_match(previous_layer, current_layer, &reference, &estimate, radius, patch.radius as i32);
        if layer > 0 {
            estimate *= 2.0;
        }
    }

    estimate
}

fn best_match(
    previous: &GrayImage,
    current: &GrayImage,
    reference: &Vector2<f64>,
    start: &Vector2<f64>,
    search_radius: i32,
    patch_radius: i32,
) -> Vector2<f64> {
    let mut best = *start;
    let mut best_cost = ssd(previous, current, reference, start, patch_radius);

    for dy in -search_radius..=search_radius {
        for dx in -search_radius..=search_radius {
            let candidate = start + Vector2::new(dx as f64, dy as f64);
            let cost = ssd(previous, current, reference, &candidate, patch_radius);
            if cost < best_cost {
                best = candidate;
                best_cost = cost;
            }
        }
    }

    best
}

fn ssd(previous: &GrayImage, current: &GrayImage, a: &Vector2<f64>, b: &Vector2<f64>, patch_radius: i32) -> f64 {
    let mut sum = 0.0;
    for dy in -patch_radius..=patch_radius {
        for dx in -patch_radius..=patch_radius {
            let offset = Vector2::new(dx as f64, dy as f64);
            let difference = sample(previous, &(a + offset)) - sample(current, &(b + offset));
            sum += difference * difference;
        }
    }
    sum
}

/// Bilinear interpolation with coordinates clamped to the image.
fn sample(image: &GrayImage, point: &Vector2<f64>) -> f64 {
    let max_x = (image.width() - 1) as f64;
    let max_y = (image.height() - 1) as f64;
    let x = point.x.clamp(0.0, max_x);
    let y = point.y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);

    let pixel = |u: f64, v: f64| image.get_pixel(u as u32, v as u32)[0] as f64;

    (1.0 - fy) * ((1.0 - fx) * pixel(x0, y0) + fx * pixel(x1, y0)) + fy * ((1.0 - fx) * pixel(x0, y1) + fx * pixel(x1, y1))
}
