//! Data module for labeled image datasets
//!
//! This module provides:
//! - CelebA-style multi-attribute dataset with annotation parsing
//! - Class-per-subdirectory single-label dataset
//! - Image decode/crop/resize/normalize pipeline
//! - DataLoader for batching samples into tensors

use std::fmt;

use anyhow::{bail, Result};

mod celeba;
mod folder;
mod loader;
mod transforms;

pub use celeba::{CelebaDataset, Split};
pub use folder::ImageFolderDataset;
pub use loader::{DataLoader, Dataset, TensorDataset};
pub use transforms::ImageTransform;

/// Which dataset family a run trains on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Multi-attribute faces with binary labels
    CelebA,
    /// Single-label expressions with class indices
    RaFD,
    /// Both datasets interleaved through one shared model
    Both,
}

impl DatasetKind {
    /// Parse the configuration string, "CelebA", "RaFD" or "Both"
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "CelebA" => Ok(Self::CelebA),
            "RaFD" => Ok(Self::RaFD),
            "Both" => Ok(Self::Both),
            other => bail!(
                "unknown dataset '{}', expected 'CelebA', 'RaFD' or 'Both'",
                other
            ),
        }
    }

    /// Multi-attribute datasets carry one binary flag per attribute;
    /// single-label datasets carry a class index
    pub fn is_multi_label(&self) -> bool {
        !matches!(self, Self::RaFD)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CelebA => write!(f, "CelebA"),
            Self::RaFD => write!(f, "RaFD"),
            Self::Both => write!(f, "Both"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_kind_parse() {
        assert_eq!(DatasetKind::parse("CelebA").unwrap(), DatasetKind::CelebA);
        assert_eq!(DatasetKind::parse("RaFD").unwrap(), DatasetKind::RaFD);
        assert_eq!(DatasetKind::parse("Both").unwrap(), DatasetKind::Both);
        assert!(DatasetKind::parse("ImageNet").is_err());
    }

    #[test]
    fn test_label_arity() {
        assert!(DatasetKind::CelebA.is_multi_label());
        assert!(DatasetKind::Both.is_multi_label());
        assert!(!DatasetKind::RaFD.is_multi_label());
    }
}
