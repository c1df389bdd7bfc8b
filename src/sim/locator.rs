//! Locator detection by connected dark blobs.
//!
//! Works on the flat, solid locator squares produced by the renderer: every
//! dark 4-connected component that looks roughly square and does not touch
//! the image border is one locator feature.

use std::collections::VecDeque;

use image::GrayImage;
use nalgebra::Vector2;

use crate::collaborators::LocatorDetector;
use crate::marker::{IndexTriplet, LocatorFeature};

#[derive(Debug, Clone)]
pub struct BlobLocatorDetector {
    /// Pixels darker than this belong to a locator.
    pub threshold: u8,
    /// Smallest blob area in pixels.
    pub min_area: usize,
    /// Maximum relative difference of the two legs of a triplet.
    pub max_leg_difference: f64,
    /// Maximum |cos| of the angle between the two legs of a triplet.
    pub max_leg_cosine: f64,
}

impl Default for BlobLocatorDetector {
    fn default() -> Self {
        Self {
            threshold: 128,
            min_area: 9,
            max_leg_difference: 0.25,
            max_leg_cosine: 0.25,
        }
    }
}

struct Blob {
    area: usize,
    sum_x: f64,
    sum_y: f64,
    min: (u32, u32),
    max: (u32, u32),
}

impl BlobLocatorDetector {
    fn blobs(&self, image: &GrayImage) -> Vec<Blob> {
        let (width, height) = image.dimensions();
        let mut visited = vec![false; width as usize * height as usize];
        let mut blobs = Vec::new();
        let mut queue = VecDeque::new();

        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                if visited[index] || image.get_pixel(x, y)[0] >= self.threshold {
                    continue;
                }

                let mut blob = Blob {
                    area: 0,
                    sum_x: 0.0,
                    sum_y: 0.0,
                    min: (x, y),
                    max: (x, y),
                };
                visited[index] = true;
                queue.push_back((x, y));

                while let Some((px, py)) = queue.pop_front() {
                    blob.area += 1;
                    blob.sum_x += px as f64;
                    blob.sum_y += py as f64;
                    blob.min = (blob.min.0.min(px), blob.min.1.min(py));
                    blob.max = (blob.max.0.max(px), blob.max.1.max(py));

                    let neighbors = [
                        (px.wrapping_sub(1), py),
                        (px + 1, py),
                        (px, py.wrapping_sub(1)),
                        (px, py + 1),
                    ];
                    for (nx, ny) in neighbors {
                        if nx >= width || ny >= height {
                            continue;
                        }
                        let neighbor = (ny * width + nx) as usize;
                        if !visited[neighbor] && image.get_pixel(nx, ny)[0] < self.threshold {
                            visited[neighbor] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }

                blobs.push(blob);
            }
        }

        blobs
    }

    fn to_feature(&self, blob: &Blob, width: u32, height: u32) -> Option<LocatorFeature> {
        if blob.area < self.min_area {
            return None;
        }
        if blob.min.0 == 0 || blob.min.1 == 0 || blob.max.0 + 1 >= width || blob.max.1 + 1 >= height {
            return None;
        }

        let box_width = (blob.max.0 - blob.min.0 + 1) as f64;
        let box_height = (blob.max.1 - blob.min.1 + 1) as f64;
        let aspect = box_width / box_height;
        // a rotated square still fills half of its bounding box
        let fill = blob.area as f64 / (box_width * box_height);
        if !(0.5..=2.0).contains(&aspect) || fill < 0.45 {
            return None;
        }

        let position = Vector2::new(blob.sum_x / blob.area as f64, blob.sum_y / blob.area as f64);
        Some(LocatorFeature::new(position, (blob.area as f64).sqrt()))
    }
}

impl LocatorDetector for BlobLocatorDetector {
    fn detect_locators(&self, image: &GrayImage, min_distance: u32) -> Vec<LocatorFeature> {
        let (width, height) = image.dimensions();
        let min_sqr_distance = (min_distance * min_distance) as f64;
        let mut features: Vec<LocatorFeature> = Vec::new();

        for blob in self.blobs(image) {
            let Some(feature) = self.to_feature(&blob, width, height) else {
                continue;
            };
            if features
                .iter()
                .all(|existing| (existing.position - feature.position).norm_squared() >= min_sqr_distance)
            {
                features.push(feature);
            }
        }

        features
    }

    fn extract_triplets(&self, features: &[LocatorFeature]) -> Vec<IndexTriplet> {
        let mut triplets = Vec::new();

        for (corner, corner_feature) in features.iter().enumerate() {
            for first in 0..features.len() {
                for second in first + 1..features.len() {
                    if first == corner || second == corner {
                        continue;
                    }

                    let leg_a = features[first].position - corner_feature.position;
                    let leg_b = features[second].position - corner_feature.position;
                    let (length_a, length_b) = (leg_a.norm(), leg_b.norm());
                    let longer = length_a.max(length_b);

                    // legs must be longer than the locators themselves
                    if length_a.min(length_b) < corner_feature.length {
                        continue;
                    }
                    if (length_a - length_b).abs() > self.max_leg_difference * longer {
                        continue;
                    }
                    if (leg_a.dot(&leg_b) / (length_a * length_b)).abs() > self.max_leg_cosine {
                        continue;
                    }

                    let lengths = [
                        corner_feature.length,
                        features[first].length,
                        features[second].length,
                    ];
                    let max_length = lengths.iter().cloned().fold(f64::MIN, f64::max);
                    let min_length = lengths.iter().cloned().fold(f64::MAX, f64::min);
                    if max_length > 2.0 * min_length {
                        continue;
                    }

                    // top-left, bottom-left, top-right: counter-clockwise in a y-down image
                    let cross = leg_a.x * leg_b.y - leg_a.y * leg_b.x;
                    if cross < 0.0 {
                        triplets.push([corner, first, second]);
                    } else {
                        triplets.push([corner, second, first]);
                    }
                }
            }
        }

        triplets
    }
}
