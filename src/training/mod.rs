//! Training module for multi-domain image translation
//!
//! This module provides:
//! - Training and evaluation loops
//! - Adversarial, classification, reconstruction and penalty losses
//! - Sliced and max-sliced Wasserstein distances
//! - Objective strategy selection and loss bookkeeping

mod labels;
mod losses;
mod metrics;
mod objective;
mod swd;
mod trainer;

pub use labels::{create_labels, label2onehot};
pub use losses::{classification_loss, gradient_penalty, reconstruction_loss};
pub use metrics::LossRecord;
pub use objective::{DCriterion, DiscriminatorUpdate, GeneratorUpdate, LossMode, Objective};
pub use swd::{max_sliced_wasserstein_distance, sliced_wasserstein_distance};
pub use trainer::Trainer;
