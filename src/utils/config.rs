//! Configuration management
//!
//! Provides unified configuration for the entire training and evaluation
//! pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::DatasetKind;
use crate::training::{DCriterion, LossMode};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    pub model: ModelConfig,
    /// Adversarial objective configuration
    pub objective: ObjectiveConfig,
    /// Training configuration
    pub training: TrainingConfig,
    /// Data configuration
    pub data: DataConfig,
    /// Step schedule configuration
    pub steps: StepConfig,
    /// Output directory configuration
    pub output: OutputConfig,
    /// Device: "cpu", "cuda" or "auto"
    pub device: String,
}

/// Network-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of domain labels of the first dataset
    pub c_dim: i64,
    /// Number of domain labels of the second dataset (combined runs only)
    pub c2_dim: i64,
    /// Image resolution fed to both networks
    pub image_size: i64,
    /// Base channels of the generator
    pub g_conv_dim: i64,
    /// Base channels of the discriminator
    pub d_conv_dim: i64,
    /// Number of residual blocks in the generator
    pub g_repeat_num: i64,
    /// Number of strided blocks in the discriminator
    pub d_repeat_num: i64,
    /// Weight of the domain classification loss
    pub lambda_cls: f64,
    /// Weight of the reconstruction loss
    pub lambda_rec: f64,
    /// Weight of the gradient penalty
    pub lambda_gp: f64,
}

/// Adversarial objective configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveConfig {
    /// Discriminator criterion for the sliced modes: "BCE" or "WGAN-GP"
    pub d_criterion: String,
    /// Train the generator with the sliced Wasserstein distance
    pub use_sw_loss: bool,
    /// Number of random projections of the sliced distance
    pub num_projections: i64,
    /// Compute the sliced distance over discriminator features instead of pixels
    pub use_d_feature: bool,
    /// Train the generator with the max-sliced Wasserstein distance
    pub use_max_sw_loss: bool,
    /// Sort the discriminator's scalar scores rather than its feature vectors
    pub sort_scalar: bool,
}

/// Training-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Dataset to train on: "CelebA", "RaFD" or "Both"
    pub dataset: String,
    /// Batch size
    pub batch_size: usize,
    /// Total number of discriminator updates
    pub num_iters: i64,
    /// Number of final iterations over which the learning rates decay to zero
    pub num_iters_decay: i64,
    /// Generator learning rate
    pub g_lr: f64,
    /// Discriminator learning rate
    pub d_lr: f64,
    /// Discriminator updates per generator update
    pub n_critic: i64,
    /// Adam beta1
    pub beta1: f64,
    /// Adam beta2
    pub beta2: f64,
    /// Resume training from this saved step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_iters: Option<i64>,
    /// Attribute columns used as CelebA domains
    pub selected_attrs: Vec<String>,
    /// Saved step evaluated by the test loop
    pub test_iters: i64,
}

/// Data-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of CelebA images
    pub celeba_image_dir: String,
    /// Path to the CelebA attribute annotation file
    pub attr_path: String,
    /// Directory of RaFD images grouped in per-class subdirectories
    pub rafd_image_dir: String,
    /// Center crop applied to CelebA images before resizing
    pub celeba_crop_size: i64,
    /// Center crop applied to RaFD images before resizing
    pub rafd_crop_size: i64,
    /// Shuffle training batches
    pub shuffle: bool,
}

/// Step schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Log losses every N iterations
    pub log_step: i64,
    /// Save a translation snapshot every N iterations
    pub sample_step: i64,
    /// Save checkpoints every N iterations
    pub model_save_step: i64,
    /// Re-evaluate the learning rates every N iterations
    pub lr_update_step: i64,
}

/// Output directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for scalar and progress logs
    pub log_dir: String,
    /// Directory for model checkpoints
    pub model_save_dir: String,
    /// Directory for training snapshots
    pub sample_dir: String,
    /// Directory for test outputs
    pub result_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                c_dim: 5,
                c2_dim: 8,
                image_size: 128,
                g_conv_dim: 64,
                d_conv_dim: 64,
                g_repeat_num: 6,
                d_repeat_num: 6,
                lambda_cls: 1.0,
                lambda_rec: 10.0,
                lambda_gp: 10.0,
            },
            objective: ObjectiveConfig {
                d_criterion: "BCE".to_string(),
                use_sw_loss: false,
                num_projections: 10_000,
                use_d_feature: false,
                use_max_sw_loss: false,
                sort_scalar: true,
            },
            training: TrainingConfig {
                dataset: "CelebA".to_string(),
                batch_size: 16,
                num_iters: 200_000,
                num_iters_decay: 100_000,
                g_lr: 1e-4,
                d_lr: 1e-4,
                n_critic: 5,
                beta1: 0.5,
                beta2: 0.999,
                resume_iters: None,
                selected_attrs: vec![
                    "Black_Hair".to_string(),
                    "Blond_Hair".to_string(),
                    "Brown_Hair".to_string(),
                    "Male".to_string(),
                    "Young".to_string(),
                ],
                test_iters: 200_000,
            },
            data: DataConfig {
                celeba_image_dir: "data/celeba/images".to_string(),
                attr_path: "data/celeba/list_attr_celeba.txt".to_string(),
                rafd_image_dir: "data/RaFD/train".to_string(),
                celeba_crop_size: 178,
                rafd_crop_size: 256,
                shuffle: true,
            },
            steps: StepConfig {
                log_step: 10,
                sample_step: 1000,
                model_save_step: 10_000,
                lr_update_step: 1000,
            },
            output: OutputConfig {
                log_dir: "stargan/logs".to_string(),
                model_save_dir: "stargan/models".to_string(),
                sample_dir: "stargan/samples".to_string(),
                result_dir: "stargan/results".to_string(),
            },
            device: "auto".to_string(),
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        match self.device.to_lowercase().as_str() {
            "cpu" => tch::Device::Cpu,
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::cuda_if_available(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let dataset = DatasetKind::parse(&self.training.dataset)?;
        let mode = LossMode::from_flags(self.objective.use_sw_loss, self.objective.use_max_sw_loss)?;
        DCriterion::parse(&self.objective.d_criterion)?;

        if dataset == DatasetKind::Both && mode != LossMode::Original {
            anyhow::bail!("the combined dataset trains with the original objective only");
        }
        if self.model.c_dim <= 0 {
            anyhow::bail!("c_dim must be > 0");
        }
        if dataset == DatasetKind::Both && self.model.c2_dim <= 0 {
            anyhow::bail!("c2_dim must be > 0 for combined runs");
        }
        if dataset != DatasetKind::RaFD
            && self.training.selected_attrs.len() as i64 != self.model.c_dim
        {
            anyhow::bail!(
                "c_dim ({}) must match the number of selected attributes ({})",
                self.model.c_dim,
                self.training.selected_attrs.len()
            );
        }
        if self.model.g_repeat_num < 1 {
            anyhow::bail!("g_repeat_num must be >= 1");
        }
        if self.model.d_repeat_num < 1 || self.model.d_repeat_num > 30 {
            anyhow::bail!("d_repeat_num must lie in [1, 30]");
        }
        let stride_factor = 1i64 << self.model.d_repeat_num;
        if self.model.image_size < stride_factor || self.model.image_size % stride_factor != 0 {
            anyhow::bail!(
                "image_size ({}) must be divisible by 2^d_repeat_num ({})",
                self.model.image_size,
                stride_factor
            );
        }
        if self.training.batch_size == 0 {
            anyhow::bail!("Batch size must be > 0");
        }
        if self.training.num_iters <= 0 {
            anyhow::bail!("Number of iterations must be > 0");
        }
        if self.training.num_iters_decay < 0
            || self.training.num_iters_decay > self.training.num_iters
        {
            anyhow::bail!("num_iters_decay must lie in [0, num_iters]");
        }
        if self.training.n_critic < 1 {
            anyhow::bail!("n_critic must be >= 1");
        }
        if self.objective.num_projections < 1 {
            anyhow::bail!("num_projections must be >= 1");
        }
        if let Some(step) = self.training.resume_iters {
            if step < 1 {
                anyhow::bail!("resume_iters must be >= 1 when set");
            }
        }
        if self.training.test_iters < 1 {
            anyhow::bail!("test_iters must be >= 1");
        }
        Ok(())
    }
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        if path.ends_with(".toml") {
            Config::from_toml(path)
        } else {
            Config::from_json(path)
        }
    } else {
        let config = Config::default();
        if path.ends_with(".toml") {
            config.save_toml(path)?;
        } else {
            config.save_json(path)?;
        }
        Ok(config)
    }
}
