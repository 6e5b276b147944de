//! Training log sinks
//!
//! Provides the two persistent sinks fed by the trainer: a CSV file of
//! per-step scalar losses and a timestamped progress file that mirrors the
//! console output.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

/// Appending CSV writer of `step,tag,value` loss rows.
pub struct ScalarWriter {
    writer: csv::Writer<std::fs::File>,
}

impl ScalarWriter {
    /// Open the scalar log at `path`, creating parent directories and the
    /// header row as needed. An existing file is appended to, so resumed
    /// runs extend their previous log.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let fresh = !path.exists() || std::fs::metadata(path)?.len() == 0;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open scalar log {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        if fresh {
            writer.write_record(["step", "tag", "value"])?;
        }
        Ok(Self { writer })
    }

    /// Append one scalar observation.
    pub fn write(&mut self, step: i64, tag: &str, value: f64) -> Result<()> {
        self.writer
            .write_record([step.to_string(), tag.to_string(), value.to_string()])?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Progress logger that mirrors every line to the tracing output and a file.
pub struct EventLogger {
    file: std::fs::File,
}

impl EventLogger {
    /// Open the progress file at `path` in append mode.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open progress log {}", path.display()))?;
        Ok(Self { file })
    }

    /// Record one progress line.
    pub fn log(&mut self, message: &str) -> Result<()> {
        info!("{}", message);
        writeln!(self.file, "[{}] {}", chrono::Utc::now().to_rfc3339(), message)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_writer_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalars.csv");

        let mut writer = ScalarWriter::new(&path).unwrap();
        writer.write(10, "D/loss_real", 0.5).unwrap();
        writer.write(10, "D/loss_fake", -0.25).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("step,tag,value"));
        assert!(content.contains("10,D/loss_real,0.5"));
        assert!(content.contains("10,D/loss_fake,-0.25"));
    }

    #[test]
    fn test_scalar_writer_keeps_single_header_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalars.csv");

        let mut writer = ScalarWriter::new(&path).unwrap();
        writer.write(10, "G/loss_rec", 1.0).unwrap();
        drop(writer);

        let mut writer = ScalarWriter::new(&path).unwrap();
        writer.write(20, "G/loss_rec", 0.75).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("step,tag,value").count(), 1);
        assert!(content.contains("20,G/loss_rec,0.75"));
    }

    #[test]
    fn test_event_logger_writes_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.log");

        let mut logger = EventLogger::new(&path).unwrap();
        logger.log("Start training...").unwrap();
        logger.log("Decayed learning rates").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("Start training..."));
    }
}
