//! Domain label synthesis
//!
//! Helpers that turn class indices into one-hot vectors and sweep a batch
//! of source labels across every target domain for evaluation.

use anyhow::{bail, Result};
use tch::{Kind, Tensor};

use crate::data::DatasetKind;

/// Attribute names treated as a mutually exclusive hair color group
const HAIR_COLOR_ATTRS: [&str; 4] = ["Black_Hair", "Blond_Hair", "Brown_Hair", "Gray_Hair"];

/// Convert a batch of class indices into one-hot float vectors.
///
/// # Arguments
///
/// * `labels` - Class indices of shape (batch,), any numeric kind
/// * `dim` - Number of classes
pub fn label2onehot(labels: &Tensor, dim: i64) -> Tensor {
    labels
        .to_kind(Kind::Int64)
        .one_hot(dim)
        .to_kind(Kind::Float)
}

/// Positions of the hair color attributes within the selected attribute list
fn hair_color_indices(selected_attrs: &[String]) -> Vec<i64> {
    selected_attrs
        .iter()
        .enumerate()
        .filter(|(_, name)| HAIR_COLOR_ATTRS.contains(&name.as_str()))
        .map(|(i, _)| i as i64)
        .collect()
}

/// Generate one target label batch per domain for sampling and evaluation.
///
/// For multi-attribute labels, domain `i` inside the hair color group
/// activates that color and clears the other colors, while any other domain
/// flips its attribute bit. For single-label datasets, domain `i` is a
/// constant one-hot batch.
///
/// # Arguments
///
/// * `c_org` - Source labels of shape (batch, c_dim)
/// * `c_dim` - Number of domains
/// * `dataset` - Dataset family deciding the label arity
/// * `selected_attrs` - Attribute names aligned with the label columns
///
/// # Returns
///
/// One (batch, c_dim) label tensor per target domain
pub fn create_labels(
    c_org: &Tensor,
    c_dim: i64,
    dataset: DatasetKind,
    selected_attrs: &[String],
) -> Result<Vec<Tensor>> {
    let batch_size = c_org.size()[0];
    let hair_colors = hair_color_indices(selected_attrs);

    let mut c_trg_list = Vec::with_capacity(c_dim as usize);
    for i in 0..c_dim {
        let c_trg = match dataset {
            DatasetKind::CelebA => {
                let c_trg = c_org.copy();
                if hair_colors.contains(&i) {
                    // Hair colors are mutually exclusive: activate one, clear the rest.
                    let _ = c_trg.narrow(1, i, 1).fill_(1.0);
                    for &j in &hair_colors {
                        if j != i {
                            let _ = c_trg.narrow(1, j, 1).fill_(0.0);
                        }
                    }
                } else {
                    let flipped = c_trg.narrow(1, i, 1).eq(0.0).to_kind(Kind::Float);
                    c_trg.narrow(1, i, 1).copy_(&flipped);
                }
                c_trg
            }
            DatasetKind::RaFD => {
                let fixed = Tensor::full([batch_size], i, (Kind::Int64, c_org.device()));
                label2onehot(&fixed, c_dim)
            }
            DatasetKind::Both => {
                bail!("target label sweeps are generated per dataset, not for 'Both'")
            }
        };
        c_trg_list.push(c_trg);
    }
    Ok(c_trg_list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn to_vec(t: &Tensor) -> Vec<f64> {
        Vec::<f64>::try_from(&t.reshape([-1])).unwrap()
    }

    #[test]
    fn test_label2onehot() {
        let labels = Tensor::from_slice(&[2i64, 0]);
        let onehot = label2onehot(&labels, 3);

        assert_eq!(onehot.size(), vec![2, 3]);
        assert_eq!(to_vec(&onehot), vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_hair_color_target_clears_other_colors() {
        let selected = attrs(&["Black_Hair", "Blond_Hair", "Brown_Hair", "Male", "Young"]);
        let c_org = Tensor::from_slice(&[0.0f32, 1.0, 0.0, 1.0, 1.0]).view([1, 5]);
        let targets = create_labels(&c_org, 5, DatasetKind::CelebA, &selected).unwrap();

        // Targeting Black_Hair turns off Blond_Hair and keeps the rest.
        assert_eq!(to_vec(&targets[0]), vec![1.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_non_hair_target_flips_attribute() {
        let selected = attrs(&["Black_Hair", "Blond_Hair", "Brown_Hair", "Male", "Young"]);
        let c_org = Tensor::from_slice(&[0.0f32, 1.0, 0.0, 1.0, 1.0]).view([1, 5]);
        let targets = create_labels(&c_org, 5, DatasetKind::CelebA, &selected).unwrap();

        assert_eq!(to_vec(&targets[3]), vec![0.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(to_vec(&targets[4]), vec![0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_source_labels_not_mutated() {
        let selected = attrs(&["Black_Hair", "Blond_Hair", "Brown_Hair", "Male", "Young"]);
        let c_org = Tensor::from_slice(&[0.0f32, 1.0, 0.0, 1.0, 1.0]).view([1, 5]);
        let _ = create_labels(&c_org, 5, DatasetKind::CelebA, &selected).unwrap();

        assert_eq!(to_vec(&c_org), vec![0.0, 1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_single_label_targets_are_constant_onehot() {
        let c_org = Tensor::from_slice(&[1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0]).view([2, 3]);
        let targets = create_labels(&c_org, 3, DatasetKind::RaFD, &[]).unwrap();

        assert_eq!(targets.len(), 3);
        assert_eq!(to_vec(&targets[1]), vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_both_is_rejected() {
        let c_org = Tensor::zeros([1, 5], (Kind::Float, tch::Device::Cpu));
        assert!(create_labels(&c_org, 5, DatasetKind::Both, &[]).is_err());
    }
}
