//! Objective strategy selection
//!
//! Maps the mutually exclusive loss-mode flags and the discriminator
//! criterion choice onto a fixed (train-D, train-G) update pair. The pair is
//! resolved once when the trainer is built and never re-dispatched per
//! iteration.

use std::fmt;

use anyhow::{bail, Result};

/// Adversarial formulation driving the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossMode {
    /// Wasserstein critic with gradient penalty
    Original,
    /// Sliced Wasserstein distance over random projections
    SlicedWasserstein,
    /// Max-sliced Wasserstein distance over the discriminator's learned projection
    MaxSlicedWasserstein,
}

impl LossMode {
    /// Resolve the mode from the two configuration flags.
    ///
    /// The flags are mutually exclusive; both set is a configuration error.
    pub fn from_flags(use_sw_loss: bool, use_max_sw_loss: bool) -> Result<Self> {
        match (use_sw_loss, use_max_sw_loss) {
            (true, true) => bail!("use_sw_loss and use_max_sw_loss are mutually exclusive"),
            (true, false) => Ok(Self::SlicedWasserstein),
            (false, true) => Ok(Self::MaxSlicedWasserstein),
            (false, false) => Ok(Self::Original),
        }
    }
}

impl fmt::Display for LossMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => write!(f, "original (Wasserstein-GP)"),
            Self::SlicedWasserstein => write!(f, "sliced Wasserstein"),
            Self::MaxSlicedWasserstein => write!(f, "max-sliced Wasserstein"),
        }
    }
}

/// Discriminator criterion used by the sliced modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DCriterion {
    /// Sigmoid binary cross entropy on real/fake scores
    Bce,
    /// Wasserstein critic with gradient penalty
    WassersteinGp,
}

impl DCriterion {
    /// Parse the configuration string, "BCE" or "WGAN-GP".
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "BCE" => Ok(Self::Bce),
            "WGAN-GP" => Ok(Self::WassersteinGp),
            other => bail!(
                "unknown discriminator criterion '{}', expected 'BCE' or 'WGAN-GP'",
                other
            ),
        }
    }
}

/// Discriminator update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscriminatorUpdate {
    WassersteinGp,
    Bce,
}

/// Generator update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorUpdate {
    Wasserstein,
    SlicedWasserstein,
    MaxSlicedWasserstein,
}

/// The resolved update pair, fixed for the life of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Objective {
    /// Selected loss mode
    pub mode: LossMode,
    /// Update rule applied to the discriminator every iteration
    pub discriminator: DiscriminatorUpdate,
    /// Update rule applied to the generator every n_critic iterations
    pub generator: GeneratorUpdate,
}

impl Objective {
    /// Bind the update pair for a loss mode and criterion.
    ///
    /// The original mode always trains its critic with the gradient penalty;
    /// the criterion choice only applies to the sliced modes.
    pub fn resolve(mode: LossMode, criterion: DCriterion) -> Self {
        let discriminator = match mode {
            LossMode::Original => DiscriminatorUpdate::WassersteinGp,
            LossMode::SlicedWasserstein | LossMode::MaxSlicedWasserstein => match criterion {
                DCriterion::Bce => DiscriminatorUpdate::Bce,
                DCriterion::WassersteinGp => DiscriminatorUpdate::WassersteinGp,
            },
        };
        let generator = match mode {
            LossMode::Original => GeneratorUpdate::Wasserstein,
            LossMode::SlicedWasserstein => GeneratorUpdate::SlicedWasserstein,
            LossMode::MaxSlicedWasserstein => GeneratorUpdate::MaxSlicedWasserstein,
        };

        Self {
            mode,
            discriminator,
            generator,
        }
    }

    /// Whether the discriminator must expose its feature output for this
    /// objective: the sliced mode when it projects in feature space, and the
    /// max-sliced mode always.
    pub fn requires_feature(&self, use_d_feature: bool) -> bool {
        match self.mode {
            LossMode::Original => false,
            LossMode::SlicedWasserstein => use_d_feature,
            LossMode::MaxSlicedWasserstein => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_mode_ignores_criterion() {
        let objective = Objective::resolve(LossMode::Original, DCriterion::Bce);

        assert_eq!(objective.discriminator, DiscriminatorUpdate::WassersteinGp);
        assert_eq!(objective.generator, GeneratorUpdate::Wasserstein);
    }

    #[test]
    fn test_sliced_mode_with_bce_criterion() {
        let mode = LossMode::from_flags(true, false).unwrap();
        let objective = Objective::resolve(mode, DCriterion::parse("BCE").unwrap());

        assert_eq!(objective.discriminator, DiscriminatorUpdate::Bce);
        assert_eq!(objective.generator, GeneratorUpdate::SlicedWasserstein);
    }

    #[test]
    fn test_sliced_mode_with_wasserstein_criterion() {
        let objective = Objective::resolve(LossMode::SlicedWasserstein, DCriterion::WassersteinGp);

        assert_eq!(objective.discriminator, DiscriminatorUpdate::WassersteinGp);
        assert_eq!(objective.generator, GeneratorUpdate::SlicedWasserstein);
    }

    #[test]
    fn test_max_sliced_mode() {
        let mode = LossMode::from_flags(false, true).unwrap();
        let objective = Objective::resolve(mode, DCriterion::Bce);

        assert_eq!(objective.discriminator, DiscriminatorUpdate::Bce);
        assert_eq!(objective.generator, GeneratorUpdate::MaxSlicedWasserstein);
    }

    #[test]
    fn test_both_flags_set_is_rejected() {
        assert!(LossMode::from_flags(true, true).is_err());
    }

    #[test]
    fn test_feature_requirement() {
        let original = Objective::resolve(LossMode::Original, DCriterion::WassersteinGp);
        let sliced = Objective::resolve(LossMode::SlicedWasserstein, DCriterion::Bce);
        let max_sliced = Objective::resolve(LossMode::MaxSlicedWasserstein, DCriterion::Bce);

        assert!(!original.requires_feature(true));
        assert!(!sliced.requires_feature(false));
        assert!(sliced.requires_feature(true));
        assert!(max_sliced.requires_feature(false));
    }

    #[test]
    fn test_unknown_criterion_is_rejected() {
        assert!(DCriterion::parse("hinge").is_err());
    }
}
