//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load utilities
//! - Training log sinks and image grid output

mod checkpoint;
mod config;
mod image_grid;
mod logger;

pub use checkpoint::CheckpointStore;
pub use config::{ensure_config_exists, Config};
pub use image_grid::{denorm, save_translation_grid};
pub use logger::{EventLogger, ScalarWriter};
