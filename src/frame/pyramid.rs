//! Coarse-to-fine image pyramid used by the point tracker.
//!
//! Layer 0 is the finest layer (the original image); every following layer
//! halves both dimensions by averaging 2x2 blocks.

use anyhow::{bail, Context, Result};
use image::{imageops, GrayImage};
use rayon::prelude::*;
use rayon::ThreadPool;

/// Layers stop being added once a dimension would drop below this size.
const MIN_LAYER_SIZE: u32 = 8;

#[derive(Debug, Clone)]
pub struct FramePyramid {
    layers: Vec<GrayImage>,
}

impl FramePyramid {
    /// Build a pyramid with at most `max_layers` layers.
    ///
    /// Row downsampling runs on `pool` when one is supplied.
    pub fn new(image: &GrayImage, max_layers: u32, pool: Option<&ThreadPool>) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            bail!("cannot build a pyramid from an empty image");
        }

        let mut layers = vec![image.clone()];
        while (layers.len() as u32) < max_layers.max(1) {
            let Some(finer) = layers.last() else { break };
            if finer.width() / 2 < MIN_LAYER_SIZE || finer.height() / 2 < MIN_LAYER_SIZE {
                break;
            }
            let coarser = downsample(finer, pool)
                .with_context(|| format!("downsampling layer {}", layers.len() - 1))?;
            layers.push(coarser);
        }

        Ok(Self { layers })
    }

    pub fn finest_layer(&self) -> &GrayImage {
        &self.layers[0]
    }

    pub fn layer(&self, index: usize) -> Option<&GrayImage> {
        self.layers.get(index)
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

fn downsample(src: &GrayImage, pool: Option<&ThreadPool>) -> Option<GrayImage> {
    let width = src.width() / 2;
    let height = src.height() / 2;

    let row = |y: u32| -> Vec<u8> {
        (0..width)
            .map(|x| {
                let sum = src.get_pixel(2 * x, 2 * y)[0] as u16
                    + src.get_pixel(2 * x + 1, 2 * y)[0] as u16
                    + src.get_pixel(2 * x, 2 * y + 1)[0] as u16
                    + src.get_pixel(2 * x + 1, 2 * y + 1)[0] as u16;
                ((sum + 2) / 4) as u8
            })
            .collect()
    };

    let data: Vec<u8> = match pool {
        Some(pool) => pool.install(|| (0..height).into_par_iter().flat_map_iter(row).collect()),
        None => (0..height).flat_map(row).collect(),
    };

    GrayImage::from_raw(width, height, data)
}

/// Copy the `width` x `height` region starting at (`x`, `y`) out of `image`.
///
/// The region is clamped to the image bounds.
pub fn crop(image: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> GrayImage {
    imageops::crop_imm(image, x, y, width, height).to_image()
}
