//! Image grid output for sampling and evaluation
//!
//! Writes the side-by-side comparison sheets saved during training and
//! testing: one row per input image, its translations beside it.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use tch::{Device, Kind, Tensor};

/// Map network outputs from [-1, 1] back to [0, 1].
pub fn denorm(x: &Tensor) -> Tensor {
    ((x + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Save a batch of [0, 1] images as one grid image, one batch entry per row.
///
/// Callers concatenate the translation columns along the width beforehand,
/// so each row shows an input followed by all of its translations.
pub fn save_translation_grid(path: &Path, batch: &Tensor) -> Result<()> {
    let batch = batch.to_device(Device::Cpu);
    let (n, c, h, w) = batch
        .size4()
        .context("image grid expects an (N, C, H, W) batch")?;
    ensure!(n > 0, "image grid needs at least one image");

    let sheet = batch.permute([1, 0, 2, 3]).reshape([c, n * h, w]);
    let image = (&sheet * 255.0).to_kind(Kind::Uint8);
    tch::vision::image::save(&image, path)
        .with_context(|| format!("failed to save image grid to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denorm_maps_unit_range() {
        let x = Tensor::from_slice(&[-1.0f32, 0.0, 1.0, 3.0]);
        let out = Vec::<f64>::try_from(&denorm(&x)).unwrap();

        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_grid_layout_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-images.jpg");

        // Two rows, each made of three 4x4 panels laid side by side.
        let columns = [
            Tensor::full([2, 3, 4, 4], 0.0, (Kind::Float, Device::Cpu)),
            Tensor::full([2, 3, 4, 4], 0.5, (Kind::Float, Device::Cpu)),
            Tensor::full([2, 3, 4, 4], 1.0, (Kind::Float, Device::Cpu)),
        ];
        let batch = Tensor::cat(&columns, 3);
        save_translation_grid(&path, &batch).unwrap();

        let loaded = tch::vision::image::load(&path).unwrap();
        assert_eq!(loaded.size(), vec![3, 8, 12]);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jpg");
        let batch = Tensor::zeros([0, 3, 4, 4], (Kind::Float, Device::Cpu));

        assert!(save_translation_grid(&path, &batch).is_err());
    }
}
