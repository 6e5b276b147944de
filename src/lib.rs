//! # Multi-Domain Image Translation with Sliced Wasserstein Objectives
//!
//! This crate provides a modular implementation of a multi-domain
//! image-to-image translation GAN that can train its generator against the
//! original Wasserstein critic, the sliced Wasserstein distance, or the
//! max-sliced Wasserstein distance.
//!
//! ## Modules
//!
//! - `data`: Labeled image datasets and batch loading
//! - `model`: Generator and discriminator architectures
//! - `training`: Training loops, objectives and loss functions
//! - `utils`: Configuration, checkpoints, logging and image output

pub mod data;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{CelebaDataset, DataLoader, Dataset, DatasetKind, ImageFolderDataset, Split};
pub use model::{Discriminator, DiscriminatorOutput, Generator, StarGan};
pub use training::{LossMode, LossRecord, Objective, Trainer};
pub use utils::{CheckpointStore, Config};
