//! Single-label dataset over a class-per-subdirectory image tree
//!
//! Each immediate subdirectory of the root is one class; class indices follow
//! the sorted directory names. Used for RaFD-style expression datasets.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use tch::Tensor;

use super::loader::Dataset;
use super::transforms::ImageTransform;

/// Image dataset with one integer class label per sample
pub struct ImageFolderDataset {
    items: Vec<(PathBuf, i64)>,
    classes: Vec<String>,
    transform: ImageTransform,
}

impl ImageFolderDataset {
    /// Scan the directory tree and index every image file
    pub fn new(root: &Path, transform: ImageTransform) -> Result<Self> {
        let mut classes = Vec::new();
        let entries = std::fs::read_dir(root)
            .with_context(|| format!("failed to read dataset root {}", root.display()))?;
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                classes.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        classes.sort();
        ensure!(
            !classes.is_empty(),
            "no class directories under {}",
            root.display()
        );

        let mut items = Vec::new();
        for (class_index, class) in classes.iter().enumerate() {
            let class_dir = root.join(class);
            let mut files: Vec<PathBuf> = std::fs::read_dir(&class_dir)
                .with_context(|| format!("failed to read class directory {}", class_dir.display()))?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| is_image_file(path))
                .collect();
            files.sort();
            for file in files {
                items.push((file, class_index as i64));
            }
        }
        ensure!(!items.is_empty(), "no image files under {}", root.display());

        Ok(Self {
            items,
            classes,
            transform,
        })
    }

    /// Class names in label-index order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes
    pub fn num_classes(&self) -> i64 {
        self.classes.len() as i64
    }
}

impl Dataset for ImageFolderDataset {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Result<(Tensor, Tensor)> {
        let (path, class) = &self.items[index];
        let image = self.transform.load(path)?;
        Ok((image, Tensor::from(*class)))
    }
}

fn is_image_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref(),
        Some("jpg" | "jpeg" | "png" | "bmp")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};
    use tempfile::TempDir;

    #[test]
    fn test_classes_follow_sorted_directory_names() {
        let dir = TempDir::new().unwrap();
        for class in ["neutral", "angry", "happy"] {
            std::fs::create_dir(dir.path().join(class)).unwrap();
            std::fs::write(dir.path().join(class).join("img.png"), b"stub").unwrap();
        }

        let dataset =
            ImageFolderDataset::new(dir.path(), ImageTransform::new(4, 4, false)).unwrap();

        assert_eq!(dataset.classes(), &["angry", "happy", "neutral"]);
        assert_eq!(dataset.num_classes(), 3);
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn test_non_image_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a").join("img.jpg"), b"stub").unwrap();
        std::fs::write(dir.path().join("a").join("notes.txt"), b"stub").unwrap();

        let dataset =
            ImageFolderDataset::new(dir.path(), ImageTransform::new(4, 4, false)).unwrap();

        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_empty_root_is_rejected() {
        let dir = TempDir::new().unwrap();

        assert!(ImageFolderDataset::new(dir.path(), ImageTransform::new(4, 4, false)).is_err());
    }

    #[test]
    fn test_get_loads_saved_image() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("smile")).unwrap();
        let image = Tensor::zeros([3, 8, 8], (Kind::Uint8, Device::Cpu));
        tch::vision::image::save(&image, dir.path().join("smile").join("s.png")).unwrap();

        let dataset =
            ImageFolderDataset::new(dir.path(), ImageTransform::new(8, 4, false)).unwrap();
        let (loaded, label) = dataset.get(0).unwrap();

        assert_eq!(loaded.size(), vec![3, 4, 4]);
        assert_eq!(label.int64_value(&[]), 0);
    }
}
