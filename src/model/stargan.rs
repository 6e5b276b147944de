//! StarGAN wrapper combining generator and discriminator
//!
//! Keeps both networks with their variable stores and provides optimizer
//! construction and checkpoint persistence.

use std::path::Path;

use tch::{nn, nn::VarStore, Device, Tensor};

use super::discriminator::{Discriminator, DiscriminatorConfig, DiscriminatorOutput};
use super::generator::{Generator, GeneratorConfig};

/// Complete translation model
pub struct StarGan {
    /// Generator network
    pub generator: Generator,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for discriminator
    pub disc_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
}

impl StarGan {
    /// Create a new model
    ///
    /// # Arguments
    ///
    /// * `gen_config` - Generator configuration
    /// * `disc_config` - Discriminator configuration
    /// * `device` - Device to create model on
    pub fn new(
        gen_config: GeneratorConfig,
        disc_config: DiscriminatorConfig,
        device: Device,
    ) -> Self {
        let gen_vs = VarStore::new(device);
        let disc_vs = VarStore::new(device);

        let generator = Generator::new(&gen_vs.root(), gen_config);
        let discriminator = Discriminator::new(&disc_vs.root(), disc_config);

        Self {
            generator,
            discriminator,
            gen_vs,
            disc_vs,
            device,
        }
    }

    /// Translate images into the given target domains
    pub fn translate(&self, x: &Tensor, c: &Tensor) -> Tensor {
        self.generator.forward(x, c)
    }

    /// Score images with the discriminator
    pub fn discriminate(&self, x: &Tensor) -> DiscriminatorOutput {
        self.discriminator.forward(x)
    }

    /// Get generator optimizer (Adam)
    pub fn gen_optimizer(&self, lr: f64, beta1: f64, beta2: f64) -> nn::Optimizer {
        nn::Adam {
            beta1,
            beta2,
            wd: 0.0,
        }
        .build(&self.gen_vs, lr)
        .expect("Failed to create generator optimizer")
    }

    /// Get discriminator optimizer (Adam)
    pub fn disc_optimizer(&self, lr: f64, beta1: f64, beta2: f64) -> nn::Optimizer {
        nn::Adam {
            beta1,
            beta2,
            wd: 0.0,
        }
        .build(&self.disc_vs, lr)
        .expect("Failed to create discriminator optimizer")
    }

    /// Save both networks
    pub fn save(&self, gen_path: &Path, disc_path: &Path) -> anyhow::Result<()> {
        self.gen_vs.save(gen_path)?;
        self.disc_vs.save(disc_path)?;
        Ok(())
    }

    /// Load both networks
    pub fn load(&mut self, gen_path: &Path, disc_path: &Path) -> anyhow::Result<()> {
        self.gen_vs.load(gen_path)?;
        self.disc_vs.load(disc_path)?;
        Ok(())
    }

    /// Number of trainable parameters in (generator, discriminator)
    pub fn num_parameters(&self) -> (i64, i64) {
        let count = |vs: &VarStore| -> i64 {
            vs.trainable_variables()
                .iter()
                .map(|t| t.numel() as i64)
                .sum()
        };
        (count(&self.gen_vs), count(&self.disc_vs))
    }
}
