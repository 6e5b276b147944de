//! Mini-batch loading over labeled image datasets
//!
//! Provides batching for GAN training with support for:
//! - Random shuffling per epoch
//! - Drop last incomplete batch
//! - Lazy per-sample loading through the `Dataset` trait

use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use tch::Tensor;

/// A labeled dataset yielding (image, label) tensor pairs
pub trait Dataset {
    /// Number of samples
    fn len(&self) -> usize;

    /// Load one sample
    fn get(&self, index: usize) -> Result<(Tensor, Tensor)>;

    /// True when the dataset holds no samples
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory dataset over pre-built tensors
///
/// Images are stacked along dim 0 as (M, C, H, W), labels as (M, ...).
pub struct TensorDataset {
    images: Tensor,
    labels: Tensor,
}

impl TensorDataset {
    /// Wrap pre-built image and label tensors
    pub fn new(images: Tensor, labels: Tensor) -> Result<Self> {
        ensure!(
            images.size()[0] == labels.size()[0],
            "image count {} does not match label count {}",
            images.size()[0],
            labels.size()[0]
        );
        Ok(Self { images, labels })
    }
}

impl Dataset for TensorDataset {
    fn len(&self) -> usize {
        self.images.size()[0] as usize
    }

    fn get(&self, index: usize) -> Result<(Tensor, Tensor)> {
        Ok((
            self.images.get(index as i64),
            self.labels.get(index as i64),
        ))
    }
}

/// DataLoader for iterating over batched samples
pub struct DataLoader<D: Dataset> {
    dataset: D,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    indices: Vec<usize>,
    current_idx: usize,
}

impl<D: Dataset> DataLoader<D> {
    /// Create a new DataLoader
    ///
    /// # Arguments
    ///
    /// * `dataset` - Source of (image, label) samples
    /// * `batch_size` - Number of samples per batch
    /// * `shuffle` - Whether to shuffle indices each epoch
    /// * `drop_last` - Whether to drop the incomplete final batch
    pub fn new(dataset: D, batch_size: usize, shuffle: bool, drop_last: bool) -> Self {
        let indices: Vec<usize> = (0..dataset.len()).collect();

        let mut loader = Self {
            dataset,
            batch_size,
            shuffle,
            drop_last,
            indices,
            current_idx: 0,
        };

        if shuffle {
            loader.shuffle_indices();
        }

        loader
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.indices.len();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            num_samples.div_ceil(self.batch_size)
        }
    }

    /// Get total number of samples
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    /// Borrow the wrapped dataset
    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    /// Shuffle indices for a new epoch
    fn shuffle_indices(&mut self) {
        let mut rng = rand::thread_rng();
        self.indices.shuffle(&mut rng);
    }

    /// Reset for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Get next batch of stacked (images, labels) tensors
    ///
    /// Returns Ok(None) when the epoch is complete.
    pub fn next_batch(&mut self) -> Result<Option<(Tensor, Tensor)>> {
        let num_samples = self.indices.len();
        let start = self.current_idx;

        if start >= num_samples {
            return Ok(None);
        }

        let end = (start + self.batch_size).min(num_samples);
        let actual_batch_size = end - start;

        // Skip incomplete batch if drop_last
        if self.drop_last && actual_batch_size < self.batch_size {
            return Ok(None);
        }

        let mut images = Vec::with_capacity(actual_batch_size);
        let mut labels = Vec::with_capacity(actual_batch_size);
        for &data_idx in &self.indices[start..end] {
            let (image, label) = self.dataset.get(data_idx)?;
            images.push(image);
            labels.push(label);
        }

        self.current_idx = end;
        Ok(Some((Tensor::stack(&images, 0), Tensor::stack(&labels, 0))))
    }
}
