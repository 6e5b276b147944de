//! Multi-domain image-to-image translation
//!
//! Main entry point providing CLI interface for:
//! - Initializing a default configuration file
//! - Training the translation model
//! - Translating test images with a trained model

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use stargan_swd::{
    data::{
        CelebaDataset, DataLoader, Dataset, DatasetKind, ImageFolderDataset, ImageTransform, Split,
    },
    training::Trainer,
    utils::Config,
};

/// Multi-domain image translation with sliced Wasserstein objectives
#[derive(Parser)]
#[command(name = "stargan_swd")]
#[command(version = "0.1.0")]
#[command(about = "Train and evaluate a multi-domain image translation GAN")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Train the translation model
    Train {
        /// Resume training from this saved step
        #[arg(long)]
        resume: Option<i64>,
    },

    /// Translate test images with a trained model
    Test {
        /// Saved step to evaluate, overriding the configured test_iters
        #[arg(long)]
        iters: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { output } => {
            init_config(&output)?;
        }
        Commands::Train { resume } => {
            train_model(&cli.config, resume)?;
        }
        Commands::Test { iters } => {
            test_model(&cli.config, iters)?;
        }
    }

    Ok(())
}

/// Load the configuration file, falling back to defaults if it is missing
fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        if path.ends_with(".toml") {
            Config::from_toml(path)
        } else {
            Config::from_json(path)
        }
    } else {
        info!("Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Build a CelebA loader for the given split
fn celeba_loader(
    config: &Config,
    split: Split,
    shuffle: bool,
    random_flip: bool,
) -> Result<DataLoader<CelebaDataset>> {
    let transform = ImageTransform::new(
        config.data.celeba_crop_size,
        config.model.image_size,
        random_flip,
    );
    let dataset = CelebaDataset::new(
        Path::new(&config.data.celeba_image_dir),
        Path::new(&config.data.attr_path),
        &config.training.selected_attrs,
        transform,
        split,
    )?;
    info!("Loaded {} CelebA images", dataset.len());
    Ok(DataLoader::new(
        dataset,
        config.training.batch_size,
        shuffle,
        false,
    ))
}

/// Build a RaFD loader over the class-labeled image folder
fn rafd_loader(config: &Config, shuffle: bool, random_flip: bool) -> Result<DataLoader<ImageFolderDataset>> {
    let transform = ImageTransform::new(
        config.data.rafd_crop_size,
        config.model.image_size,
        random_flip,
    );
    let dataset = ImageFolderDataset::new(Path::new(&config.data.rafd_image_dir), transform)?;
    info!("Loaded {} RaFD images", dataset.len());
    Ok(DataLoader::new(
        dataset,
        config.training.batch_size,
        shuffle,
        false,
    ))
}

/// Train the translation model
fn train_model(config_path: &str, resume: Option<i64>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if resume.is_some() {
        config.training.resume_iters = resume;
    }
    config.validate()?;

    let device = config.get_device();
    info!("Using device: {:?}", device);

    for dir in [
        &config.output.log_dir,
        &config.output.model_save_dir,
        &config.output.sample_dir,
        &config.output.result_dir,
    ] {
        std::fs::create_dir_all(dir)?;
    }

    // Save the effective configuration alongside the run outputs.
    config.save_toml(&format!("{}/config.toml", config.output.log_dir))?;

    let dataset = DatasetKind::parse(&config.training.dataset)?;
    let shuffle = config.data.shuffle;
    match dataset {
        DatasetKind::CelebA => {
            let mut loader = celeba_loader(&config, Split::Train, shuffle, true)?;
            Trainer::new(config)?.train(&mut loader)?;
        }
        DatasetKind::RaFD => {
            let mut loader = rafd_loader(&config, shuffle, true)?;
            Trainer::new(config)?.train(&mut loader)?;
        }
        DatasetKind::Both => {
            let mut celeba = celeba_loader(&config, Split::Train, shuffle, true)?;
            let mut rafd = rafd_loader(&config, shuffle, true)?;
            Trainer::new(config)?.train_multi(&mut celeba, &mut rafd)?;
        }
    }

    info!("Training complete");
    Ok(())
}

/// Translate test images with a trained model
fn test_model(config_path: &str, iters: Option<i64>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(step) = iters {
        config.training.test_iters = step;
    }
    config.validate()?;

    let device = config.get_device();
    info!("Using device: {:?}", device);

    let dataset = DatasetKind::parse(&config.training.dataset)?;
    match dataset {
        DatasetKind::CelebA => {
            let mut loader = celeba_loader(&config, Split::Test, false, false)?;
            Trainer::new(config)?.test(&mut loader)?;
        }
        DatasetKind::RaFD => {
            let mut loader = rafd_loader(&config, false, false)?;
            Trainer::new(config)?.test(&mut loader)?;
        }
        DatasetKind::Both => {
            let mut loader = celeba_loader(&config, Split::Test, false, false)?;
            Trainer::new(config)?.test_multi(&mut loader)?;
        }
    }

    info!("Testing complete");
    Ok(())
}

/// Initialize default configuration file
fn init_config(output_path: &str) -> Result<()> {
    let config = Config::default();

    if output_path.ends_with(".toml") {
        config.save_toml(output_path)?;
    } else {
        config.save_json(output_path)?;
    }

    info!("Created default configuration at {}", output_path);
    Ok(())
}
