//! Image decoding and normalization pipeline
//!
//! Turns image files into network-ready tensors: decode, center crop,
//! resize, optional horizontal flip, and scaling into [-1, 1].

use std::path::Path;

use anyhow::{ensure, Context, Result};
use tch::{Kind, Tensor};

/// Deterministic-size image pipeline applied to every sample
#[derive(Debug, Clone)]
pub struct ImageTransform {
    /// Side length of the center crop taken from the source image
    pub crop_size: i64,
    /// Side length of the network input after resizing
    pub image_size: i64,
    /// Randomly mirror images horizontally (train mode only)
    pub random_flip: bool,
}

impl ImageTransform {
    /// Create a new transform pipeline
    pub fn new(crop_size: i64, image_size: i64, random_flip: bool) -> Self {
        Self {
            crop_size,
            image_size,
            random_flip,
        }
    }

    /// Load one image file as a (3, image_size, image_size) tensor in [-1, 1]
    pub fn load(&self, path: &Path) -> Result<Tensor> {
        let image = tch::vision::image::load(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;

        let image = fix_channels(&image)?;
        let image = center_crop(&image, self.crop_size)?;
        let image = tch::vision::image::resize(&image, self.image_size, self.image_size)
            .with_context(|| format!("failed to resize image {}", path.display()))?;

        let image = if self.random_flip && rand::random::<bool>() {
            image.flip([2])
        } else {
            image
        };

        Ok(image.to_kind(Kind::Float) / 127.5 - 1.0)
    }
}

/// Coerce grayscale and RGBA inputs to three channels
fn fix_channels(image: &Tensor) -> Result<Tensor> {
    let (channels, _h, _w) = image.size3()?;
    match channels {
        3 => Ok(image.shallow_clone()),
        1 => Ok(image.repeat([3, 1, 1])),
        4 => Ok(image.narrow(0, 0, 3)),
        n => anyhow::bail!("unsupported channel count {} in image", n),
    }
}

fn center_crop(image: &Tensor, crop: i64) -> Result<Tensor> {
    let (_channels, height, width) = image.size3()?;
    ensure!(
        height >= crop && width >= crop,
        "image {}x{} is smaller than crop size {}",
        height,
        width,
        crop
    );

    Ok(image
        .narrow(1, (height - crop) / 2, crop)
        .narrow(2, (width - crop) / 2, crop))
}
