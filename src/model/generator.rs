//! Generator network for multi-domain image translation
//!
//! The generator maps an input image together with a spatially replicated
//! target domain label to an image in the target domain. Architecture:
//! 7x7 stem, two strided down-sampling convolutions, a stack of residual
//! bottleneck blocks, two transposed up-sampling convolutions and a 7x7
//! output convolution with tanh.

use tch::{nn, nn::Module, Tensor};

/// Instance normalization with learnable affine parameters.
///
/// Per-sample channel statistics are used at every forward pass.
#[derive(Debug)]
pub(crate) struct InstanceNorm2d {
    weight: Tensor,
    bias: Tensor,
}

impl InstanceNorm2d {
    pub(crate) fn new(vs: nn::Path, dim: i64) -> Self {
        Self {
            weight: vs.ones("weight", &[dim]),
            bias: vs.zeros("bias", &[dim]),
        }
    }
}

impl Module for InstanceNorm2d {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.instance_norm(
            Some(&self.weight),
            Some(&self.bias),
            None,
            None,
            true,
            0.1,
            1e-5,
            false,
        )
    }
}

/// Residual block preserving spatial resolution and channel count
#[derive(Debug)]
struct ResidualBlock {
    conv1: nn::Conv2D,
    norm1: InstanceNorm2d,
    conv2: nn::Conv2D,
    norm2: InstanceNorm2d,
}

impl ResidualBlock {
    fn new(vs: &nn::Path, dim: i64) -> Self {
        let conv_cfg = nn::ConvConfig {
            stride: 1,
            padding: 1,
            bias: false,
            ..Default::default()
        };
        Self {
            conv1: nn::conv2d(vs / "conv1", dim, dim, 3, conv_cfg),
            norm1: InstanceNorm2d::new(vs / "norm1", dim),
            conv2: nn::conv2d(vs / "conv2", dim, dim, 3, conv_cfg),
            norm2: InstanceNorm2d::new(vs / "norm2", dim),
        }
    }
}

impl Module for ResidualBlock {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let h = self.norm1.forward(&self.conv1.forward(xs)).relu();
        let h = self.norm2.forward(&self.conv2.forward(&h));
        xs + h
    }
}

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Dimension of the domain label vector
    pub c_dim: i64,
    /// Number of filters in the stem convolution
    pub conv_dim: i64,
    /// Number of residual bottleneck blocks
    pub repeat_num: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            c_dim: 5,
            conv_dim: 64,
            repeat_num: 6,
        }
    }
}

/// Generator network
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    stem: nn::Conv2D,
    stem_norm: InstanceNorm2d,
    down1: nn::Conv2D,
    down1_norm: InstanceNorm2d,
    down2: nn::Conv2D,
    down2_norm: InstanceNorm2d,
    blocks: Vec<ResidualBlock>,
    up1: nn::ConvTranspose2D,
    up1_norm: InstanceNorm2d,
    up2: nn::ConvTranspose2D,
    up2_norm: InstanceNorm2d,
    out: nn::Conv2D,
}

impl Generator {
    /// Create a new generator network
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let dim = config.conv_dim;

        let stem_cfg = nn::ConvConfig {
            stride: 1,
            padding: 3,
            bias: false,
            ..Default::default()
        };
        let down_cfg = nn::ConvConfig {
            stride: 2,
            padding: 1,
            bias: false,
            ..Default::default()
        };
        let up_cfg = nn::ConvTransposeConfig {
            stride: 2,
            padding: 1,
            bias: false,
            ..Default::default()
        };

        // The domain label is concatenated to the image channels.
        let stem = nn::conv2d(vs / "stem", 3 + config.c_dim, dim, 7, stem_cfg);
        let stem_norm = InstanceNorm2d::new(vs / "stem_norm", dim);

        let down1 = nn::conv2d(vs / "down1", dim, dim * 2, 4, down_cfg);
        let down1_norm = InstanceNorm2d::new(vs / "down1_norm", dim * 2);
        let down2 = nn::conv2d(vs / "down2", dim * 2, dim * 4, 4, down_cfg);
        let down2_norm = InstanceNorm2d::new(vs / "down2_norm", dim * 4);

        let blocks = (0..config.repeat_num)
            .map(|i| ResidualBlock::new(&(vs / format!("block{}", i)), dim * 4))
            .collect();

        let up1 = nn::conv_transpose2d(vs / "up1", dim * 4, dim * 2, 4, up_cfg);
        let up1_norm = InstanceNorm2d::new(vs / "up1_norm", dim * 2);
        let up2 = nn::conv_transpose2d(vs / "up2", dim * 2, dim, 4, up_cfg);
        let up2_norm = InstanceNorm2d::new(vs / "up2_norm", dim);

        let out = nn::conv2d(vs / "out", dim, 3, 7, stem_cfg);

        Self {
            config,
            stem,
            stem_norm,
            down1,
            down1_norm,
            down2,
            down2_norm,
            blocks,
            up1,
            up1_norm,
            up2,
            up2_norm,
            out,
        }
    }

    /// Translate a batch of images into the target domains.
    ///
    /// # Arguments
    ///
    /// * `x` - Input images of shape (batch, 3, height, width) in [-1, 1]
    /// * `c` - Target domain labels of shape (batch, c_dim)
    ///
    /// # Returns
    ///
    /// Translated images of shape (batch, 3, height, width) in [-1, 1]
    pub fn forward(&self, x: &Tensor, c: &Tensor) -> Tensor {
        let size = x.size();
        let (height, width) = (size[2], size[3]);

        // Replicate the label spatially and concatenate as extra channels.
        let c = c
            .view([c.size()[0], self.config.c_dim, 1, 1])
            .repeat([1, 1, height, width]);
        let h = Tensor::cat(&[x, &c], 1);

        let h = self.stem_norm.forward(&self.stem.forward(&h)).relu();
        let h = self.down1_norm.forward(&self.down1.forward(&h)).relu();
        let h = self.down2_norm.forward(&self.down2.forward(&h)).relu();
        let h = self
            .blocks
            .iter()
            .fold(h, |h, block| block.forward(&h));
        let h = self.up1_norm.forward(&self.up1.forward(&h)).relu();
        let h = self.up2_norm.forward(&self.up2.forward(&h)).relu();

        self.out.forward(&h).tanh()
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_generator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            c_dim: 5,
            conv_dim: 16,
            repeat_num: 2,
        };
        let gen = Generator::new(&vs.root(), config);

        let x = Tensor::randn([2, 3, 32, 32], (Kind::Float, Device::Cpu));
        let c = Tensor::zeros([2, 5], (Kind::Float, Device::Cpu));
        let output = gen.forward(&x, &c);

        assert_eq!(output.size(), vec![2, 3, 32, 32]);
    }

    #[test]
    fn test_generator_output_range() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            c_dim: 3,
            conv_dim: 8,
            repeat_num: 1,
        };
        let gen = Generator::new(&vs.root(), config);

        let x = Tensor::randn([1, 3, 16, 16], (Kind::Float, Device::Cpu));
        let c = Tensor::ones([1, 3], (Kind::Float, Device::Cpu));
        let output = gen.forward(&x, &c);

        let min_val = output.min().double_value(&[]);
        let max_val = output.max().double_value(&[]);
        assert!(min_val >= -1.0 && max_val <= 1.0);
    }

    #[test]
    fn test_residual_block_preserves_shape() {
        let vs = VarStore::new(Device::Cpu);
        let root = vs.root();
        let block = ResidualBlock::new(&(&root / "block"), 8);

        let x = Tensor::randn([2, 8, 16, 16], (Kind::Float, Device::Cpu));
        let output = block.forward(&x);

        assert_eq!(output.size(), x.size());
    }
}
