//! Checkpoint save/load utilities
//!
//! Stores generator and discriminator weights side by side under a
//! step-numbered naming scheme, so interrupted runs can resume and finished
//! runs can be evaluated at any saved step.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use tracing::info;

use crate::model::StarGan;

/// Step-addressed store of paired generator/discriminator weight files.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create checkpoint directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Directory holding the weight files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn generator_path(&self, step: i64) -> PathBuf {
        self.dir.join(format!("{}-G.pt", step))
    }

    fn discriminator_path(&self, step: i64) -> PathBuf {
        self.dir.join(format!("{}-D.pt", step))
    }

    /// Save both networks under the given step number.
    pub fn save(&self, model: &StarGan, step: i64) -> Result<()> {
        model.save(&self.generator_path(step), &self.discriminator_path(step))
    }

    /// Restore both networks from the given step number.
    ///
    /// Missing weight files are an error: resuming or evaluating a step that
    /// was never saved aborts the run.
    pub fn restore(&self, model: &mut StarGan, step: i64) -> Result<()> {
        let gen_path = self.generator_path(step);
        let disc_path = self.discriminator_path(step);
        ensure!(
            gen_path.exists() && disc_path.exists(),
            "no checkpoint for step {} in {}",
            step,
            self.dir.display()
        );
        model.load(&gen_path, &disc_path)?;
        info!("Loaded the trained models from step {}", step);
        Ok(())
    }

    /// Steps with a complete checkpoint pair, in ascending order.
    pub fn available_steps(&self) -> Result<Vec<i64>> {
        let mut steps = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(prefix) = name.to_str().and_then(|n| n.strip_suffix("-G.pt")) {
                if let Ok(step) = prefix.parse::<i64>() {
                    if self.discriminator_path(step).exists() {
                        steps.push(step);
                    }
                }
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }
}
