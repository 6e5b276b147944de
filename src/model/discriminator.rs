//! Discriminator network with auxiliary domain classifier
//!
//! A PatchGAN critic: a stack of strided convolutions shared by two heads,
//! one producing a spatial map of real/fake scores and one producing domain
//! classification logits. The shared representation can optionally be
//! exposed for distribution matching losses computed in feature space.

use tch::{nn, nn::Module, Tensor};

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Height and width of input images
    pub image_size: i64,
    /// Dimension of the domain label vector
    pub c_dim: i64,
    /// Number of filters in the first convolution
    pub conv_dim: i64,
    /// Number of strided convolutions in the shared trunk
    pub repeat_num: i64,
    /// Expose the flattened trunk activations in the output
    pub include_feature: bool,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            image_size: 128,
            c_dim: 5,
            conv_dim: 64,
            repeat_num: 6,
            include_feature: false,
        }
    }
}

/// Everything the discriminator produces for one batch
#[derive(Debug)]
pub struct DiscriminatorOutput {
    /// Patch-wise realness scores of shape (batch, 1, h', w')
    pub src: Tensor,
    /// Domain classification logits of shape (batch, c_dim)
    pub cls: Tensor,
    /// Flattened trunk activations of shape (batch, features), if requested
    pub feature: Option<Tensor>,
}

/// Discriminator network
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    trunk: Vec<nn::Conv2D>,
    src_head: nn::Conv2D,
    cls_head: nn::Conv2D,
}

impl Discriminator {
    /// Create a new discriminator network.
    ///
    /// `image_size` must be divisible by 2^`repeat_num` so the classifier
    /// head can reduce the final feature map to a single spatial position.
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let down_cfg = nn::ConvConfig {
            stride: 2,
            padding: 1,
            ..Default::default()
        };

        let mut trunk = Vec::with_capacity(config.repeat_num as usize);
        trunk.push(nn::conv2d(vs / "trunk0", 3, config.conv_dim, 4, down_cfg));
        let mut curr_dim = config.conv_dim;
        for i in 1..config.repeat_num {
            trunk.push(nn::conv2d(
                vs / format!("trunk{}", i),
                curr_dim,
                curr_dim * 2,
                4,
                down_cfg,
            ));
            curr_dim *= 2;
        }

        let src_cfg = nn::ConvConfig {
            stride: 1,
            padding: 1,
            bias: false,
            ..Default::default()
        };
        let src_head = nn::conv2d(vs / "src", curr_dim, 1, 3, src_cfg);

        // The classifier kernel covers the whole remaining feature map.
        let kernel_size = config.image_size / (1 << config.repeat_num);
        let cls_cfg = nn::ConvConfig {
            bias: false,
            ..Default::default()
        };
        let cls_head = nn::conv2d(vs / "cls", curr_dim, config.c_dim, kernel_size, cls_cfg);

        Self {
            config,
            trunk,
            src_head,
            cls_head,
        }
    }

    /// Score a batch of images.
    ///
    /// # Arguments
    ///
    /// * `x` - Input images of shape (batch, 3, image_size, image_size)
    pub fn forward(&self, x: &Tensor) -> DiscriminatorOutput {
        let mut h = self.trunk[0].forward(x).leaky_relu();
        for conv in &self.trunk[1..] {
            h = conv.forward(&h).leaky_relu();
        }

        let batch_size = h.size()[0];
        let src = self.src_head.forward(&h);
        let cls = self
            .cls_head
            .forward(&h)
            .view([batch_size, self.config.c_dim]);
        let feature = self
            .config
            .include_feature
            .then(|| h.view([batch_size, -1]));

        DiscriminatorOutput { src, cls, feature }
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    fn small_config(include_feature: bool) -> DiscriminatorConfig {
        DiscriminatorConfig {
            image_size: 32,
            c_dim: 5,
            conv_dim: 16,
            repeat_num: 3,
            include_feature,
        }
    }

    #[test]
    fn test_discriminator_output_shapes() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), small_config(false));

        let x = Tensor::randn([4, 3, 32, 32], (Kind::Float, Device::Cpu));
        let output = disc.forward(&x);

        assert_eq!(output.src.size(), vec![4, 1, 4, 4]);
        assert_eq!(output.cls.size(), vec![4, 5]);
        assert!(output.feature.is_none());
    }

    #[test]
    fn test_discriminator_exposes_feature() {
        let vs = VarStore::new(Device::Cpu);
        let disc = Discriminator::new(&vs.root(), small_config(true));

        let x = Tensor::randn([2, 3, 32, 32], (Kind::Float, Device::Cpu));
        let output = disc.forward(&x);

        // Trunk ends at 16 * 2^2 = 64 channels on a 4x4 map.
        let feature = output.feature.unwrap();
        assert_eq!(feature.size(), vec![2, 64 * 4 * 4]);
    }
}
