//! Loss functions for multi-domain GAN training
//!
//! Implements the domain classification, cycle-consistency, gradient
//! penalty and adversarial terms combined by the trainer.

use anyhow::{Context, Result};
use tch::{Kind, Reduction, Tensor};

use crate::data::DatasetKind;

/// Domain classification loss on discriminator logits.
///
/// Multi-attribute datasets use binary cross-entropy with logits, summed
/// over all attributes and averaged over the batch. Single-label datasets
/// use cross-entropy against class indices.
///
/// # Arguments
///
/// * `logit` - Raw classification logits of shape (batch, c_dim)
/// * `target` - Binary attribute matrix (batch, c_dim) or class indices (batch,)
/// * `dataset` - Dataset family deciding the label arity
pub fn classification_loss(logit: &Tensor, target: &Tensor, dataset: DatasetKind) -> Tensor {
    if dataset.is_multi_label() {
        let batch_size = logit.size()[0] as f64;
        logit.binary_cross_entropy_with_logits::<Tensor>(target, None, None, Reduction::Sum)
            / batch_size
    } else {
        logit.cross_entropy_for_logits(target)
    }
}

/// Cycle-consistency loss: mean absolute error between the input image and
/// its reconstruction through a round trip of translations.
pub fn reconstruction_loss(x_real: &Tensor, x_reconst: &Tensor) -> Tensor {
    (x_real - x_reconst).abs().mean(Kind::Float)
}

/// Gradient penalty for Wasserstein critics.
///
/// Computes the gradient of the critic score with respect to the
/// interpolated batch and penalizes deviations of its L2 norm from 1.
/// The score map is summed before differentiation, which is equivalent to
/// backpropagating a ones tensor through every patch output.
///
/// # Arguments
///
/// * `out_src` - Critic score map produced from `x_hat`
/// * `x_hat` - Interpolated images, must have `requires_grad` set
pub fn gradient_penalty(out_src: &Tensor, x_hat: &Tensor) -> Result<Tensor> {
    let grads = Tensor::run_backward(&[out_src.sum(Kind::Float)], &[x_hat], true, true);
    let grad = grads
        .into_iter()
        .next()
        .context("no gradient returned for the interpolated batch")?;
    let batch_size = grad.size()[0];
    let norm = grad
        .view([batch_size, -1])
        .square()
        .sum_dim_intlist([1].as_slice(), false, Kind::Float)
        .sqrt();
    Ok((norm - 1.0).square().mean(Kind::Float))
}

/// Binary cross-entropy loss pushing real scores toward 1
pub fn bce_real_loss(out_src: &Tensor) -> Tensor {
    let targets = Tensor::ones_like(out_src);
    out_src.binary_cross_entropy_with_logits::<Tensor>(&targets, None, None, Reduction::Mean)
}

/// Binary cross-entropy loss pushing generated scores toward 0
pub fn bce_fake_loss(out_src: &Tensor) -> Tensor {
    let targets = Tensor::zeros_like(out_src);
    out_src.binary_cross_entropy_with_logits::<Tensor>(&targets, None, None, Reduction::Mean)
}
