//! CelebA-style attribute dataset
//!
//! Parses the attribute annotation file (image count, attribute-name header,
//! then one "filename ±1 ..." line per image), keeps the configured subset of
//! attributes as binary labels, and loads images lazily per batch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::Tensor;

use super::loader::Dataset;
use super::transforms::ImageTransform;

/// Which half of the deterministic split a dataset instance serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// Number of annotation entries held out for evaluation
const TEST_HOLDOUT: usize = 2000;

/// Fixed shuffle seed so the two splits stay disjoint across runs
const SPLIT_SEED: u64 = 1234;

/// Multi-attribute face dataset
pub struct CelebaDataset {
    image_dir: PathBuf,
    filenames: Vec<String>,
    /// One row per image, one column per selected attribute, values in {0, 1}
    labels: Array2<f32>,
    selected_attrs: Vec<String>,
    transform: ImageTransform,
}

impl CelebaDataset {
    /// Parse the annotation file and build one split of the dataset
    ///
    /// # Arguments
    ///
    /// * `image_dir` - Directory holding the image files
    /// * `attr_path` - Attribute annotation file
    /// * `selected_attrs` - Attribute names to keep, in label-column order
    /// * `transform` - Image pipeline applied to every sample
    /// * `split` - Which side of the held-out split to serve
    pub fn new(
        image_dir: &Path,
        attr_path: &Path,
        selected_attrs: &[String],
        transform: ImageTransform,
        split: Split,
    ) -> Result<Self> {
        let content = std::fs::read_to_string(attr_path)
            .with_context(|| format!("failed to read attribute file {}", attr_path.display()))?;
        let mut lines = content.lines();

        let declared: usize = lines
            .next()
            .context("attribute file is empty")?
            .trim()
            .parse()
            .context("first annotation line is not an image count")?;
        let header = lines.next().context("attribute file has no header line")?;
        let all_attrs: Vec<&str> = header.split_whitespace().collect();

        let mut attr_columns = Vec::with_capacity(selected_attrs.len());
        for name in selected_attrs {
            match all_attrs.iter().position(|a| a == name) {
                Some(column) => attr_columns.push(column),
                None => bail!(
                    "attribute '{}' not present in {}",
                    name,
                    attr_path.display()
                ),
            }
        }

        let mut entries: Vec<(String, Vec<f32>)> = Vec::with_capacity(declared);
        for line in lines {
            let mut parts = line.split_whitespace();
            let filename = match parts.next() {
                Some(name) => name,
                None => continue,
            };
            let values: Vec<&str> = parts.collect();

            let mut label = Vec::with_capacity(attr_columns.len());
            for &column in &attr_columns {
                let value = values.get(column).with_context(|| {
                    format!("annotation line for {} is truncated", filename)
                })?;
                label.push(if *value == "1" { 1.0 } else { 0.0 });
            }
            entries.push((filename.to_string(), label));
        }

        // The same seeded shuffle on every run keeps the two splits disjoint.
        let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
        entries.shuffle(&mut rng);

        let holdout = TEST_HOLDOUT.min(entries.len());
        let entries: Vec<(String, Vec<f32>)> = match split {
            Split::Test => entries.into_iter().take(holdout).collect(),
            Split::Train => entries.into_iter().skip(holdout).collect(),
        };

        let mut filenames = Vec::with_capacity(entries.len());
        let mut labels = Array2::<f32>::zeros((entries.len(), selected_attrs.len()));
        for (row, (filename, label)) in entries.into_iter().enumerate() {
            filenames.push(filename);
            for (column, value) in label.into_iter().enumerate() {
                labels[[row, column]] = value;
            }
        }

        Ok(Self {
            image_dir: image_dir.to_path_buf(),
            filenames,
            labels,
            selected_attrs: selected_attrs.to_vec(),
            transform,
        })
    }

    /// Attribute names in label-column order
    pub fn attr_names(&self) -> &[String] {
        &self.selected_attrs
    }

    /// Label width (number of selected attributes)
    pub fn label_dim(&self) -> i64 {
        self.selected_attrs.len() as i64
    }

    /// View of the full label matrix
    pub fn labels(&self) -> ArrayView2<'_, f32> {
        self.labels.view()
    }

    /// Fraction of positive samples per attribute
    pub fn attribute_frequencies(&self) -> Vec<f32> {
        self.labels
            .mean_axis(Axis(0))
            .map(|means| means.to_vec())
            .unwrap_or_default()
    }
}

impl Dataset for CelebaDataset {
    fn len(&self) -> usize {
        self.filenames.len()
    }

    fn get(&self, index: usize) -> Result<(Tensor, Tensor)> {
        let image = self
            .transform
            .load(&self.image_dir.join(&self.filenames[index]))?;
        let label = Tensor::from_slice(&self.labels.row(index).to_vec());
        Ok((image, label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_attr_file(dir: &Path, lines: &[&str]) -> PathBuf {
        let path = dir.join("list_attr.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_parses_selected_attributes_in_order() {
        let dir = TempDir::new().unwrap();
        let attr_path = write_attr_file(
            dir.path(),
            &[
                "3",
                "Black_Hair Blond_Hair Male",
                "a.jpg -1  1 -1",
                "b.jpg -1  1 -1",
                "c.jpg -1  1 -1",
            ],
        );
        let selected = vec!["Male".to_string(), "Blond_Hair".to_string()];
        let dataset = CelebaDataset::new(
            dir.path(),
            &attr_path,
            &selected,
            ImageTransform::new(4, 4, false),
            Split::Test,
        )
        .unwrap();

        assert_eq!(dataset.label_dim(), 2);
        assert_eq!(dataset.len(), 3);
        // Every row is (Male=0, Blond_Hair=1) regardless of shuffle order.
        for row in dataset.labels().rows() {
            assert_eq!(row.to_vec(), vec![0.0, 1.0]);
        }
    }

    #[test]
    fn test_small_file_lands_entirely_in_test_split() {
        let dir = TempDir::new().unwrap();
        let attr_path = write_attr_file(
            dir.path(),
            &["2", "Black_Hair Male", "a.jpg 1 -1", "b.jpg -1 1"],
        );
        let selected = vec!["Black_Hair".to_string()];
        let transform = ImageTransform::new(4, 4, false);

        let test = CelebaDataset::new(
            dir.path(),
            &attr_path,
            &selected,
            transform.clone(),
            Split::Test,
        )
        .unwrap();
        let train =
            CelebaDataset::new(dir.path(), &attr_path, &selected, transform, Split::Train)
                .unwrap();

        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 0);
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let dir = TempDir::new().unwrap();
        let attr_path =
            write_attr_file(dir.path(), &["1", "Black_Hair Male", "a.jpg 1 -1"]);
        let selected = vec!["Pale_Skin".to_string()];

        let result = CelebaDataset::new(
            dir.path(),
            &attr_path,
            &selected,
            ImageTransform::new(4, 4, false),
            Split::Test,
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_attribute_frequencies() {
        let dir = TempDir::new().unwrap();
        let attr_path = write_attr_file(
            dir.path(),
            &["2", "Black_Hair Male", "a.jpg 1 -1", "b.jpg -1 -1"],
        );
        let selected = vec!["Black_Hair".to_string(), "Male".to_string()];
        let dataset = CelebaDataset::new(
            dir.path(),
            &attr_path,
            &selected,
            ImageTransform::new(4, 4, false),
            Split::Test,
        )
        .unwrap();

        assert_eq!(dataset.attribute_frequencies(), vec![0.5, 0.0]);
    }
}
