//! Sliced Wasserstein distance estimators
//!
//! Implements the random-projection estimator used as the generator's
//! adversarial objective, and its max-sliced variant where the projection
//! direction is learned by the discriminator instead of drawn at random.

use anyhow::{ensure, Result};
use tch::{Device, Kind, Tensor};

/// Estimate the Wasserstein-2 distance between two empirical distributions.
///
/// Both batches are projected onto `num_projections` random unit directions;
/// along each direction the 1-D distance has a closed form obtained by
/// sorting, and averaging over directions gives the sliced estimate. The
/// directions are redrawn on every call, so repeated calls on the same inputs
/// return different but statistically equivalent values.
///
/// # Arguments
///
/// * `true_samples` - Real feature batch of shape (N, F)
/// * `fake_samples` - Generated feature batch of shape (N, F)
/// * `num_projections` - Number of random directions to average over
/// * `device` - Device the projection and reduction run on
///
/// # Returns
///
/// Scalar tensor, non-negative, differentiable w.r.t. both inputs
pub fn sliced_wasserstein_distance(
    true_samples: &Tensor,
    fake_samples: &Tensor,
    num_projections: i64,
    device: Device,
) -> Result<Tensor> {
    ensure!(
        num_projections >= 1,
        "num_projections must be >= 1, got {}",
        num_projections
    );

    let true_dims = true_samples.size();
    let fake_dims = fake_samples.size();
    ensure!(
        true_dims.len() == 2 && fake_dims.len() == 2,
        "expected 2-D sample batches, got shapes {:?} and {:?}",
        true_dims,
        fake_dims
    );
    ensure!(
        true_dims[1] == fake_dims[1],
        "feature dimensions differ: {} vs {}",
        true_dims[1],
        fake_dims[1]
    );

    let projections = random_projections(true_dims[1], num_projections, device);

    Ok(distance_along_projections(
        &true_samples.to_device(device),
        &fake_samples.to_device(device),
        &projections,
    ))
}

/// Squared differences of row-sorted entries for batches that were already
/// projected by the discriminator's learned direction.
///
/// Input shapes are (N, K) with K >= 1. Returns the unreduced (N, K) tensor;
/// the caller decides whether and how to reduce it.
pub fn max_sliced_wasserstein_distance(
    projected_true: &Tensor,
    projected_fake: &Tensor,
) -> Result<Tensor> {
    ensure!(
        projected_true.size() == projected_fake.size(),
        "projected batches differ in shape: {:?} vs {:?}",
        projected_true.size(),
        projected_fake.size()
    );

    let (sorted_true, _) = projected_true.sort(1, false);
    let (sorted_fake, _) = projected_fake.sort(1, false);

    Ok((sorted_true - sorted_fake).square())
}

/// Draw `num_projections` standard-normal directions in R^num_features and
/// L2-normalize each column to unit length.
fn random_projections(num_features: i64, num_projections: i64, device: Device) -> Tensor {
    let directions = Tensor::randn([num_features, num_projections], (Kind::Float, device));
    let norms = directions
        .square()
        .sum_dim_intlist([0].as_slice(), true, Kind::Float)
        .sqrt();
    directions / norms
}

/// Project both batches onto the given direction columns, sort each
/// direction's sample values ascending, and average the squared differences
/// of the matched order statistics over all directions and samples.
fn distance_along_projections(
    true_samples: &Tensor,
    fake_samples: &Tensor,
    projections: &Tensor,
) -> Tensor {
    let projected_true = true_samples.matmul(projections).transpose(0, 1);
    let projected_fake = fake_samples.matmul(projections).transpose(0, 1);

    let (sorted_true, _) = projected_true.sort(1, false);
    let (sorted_fake, _) = projected_fake.sort(1, false);

    (sorted_true - sorted_fake).square().mean(Kind::Float)
}
