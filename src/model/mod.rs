//! Model module containing the translation network components
//!
//! This module provides:
//! - Generator network translating images across domains
//! - Discriminator network with realness and domain classification heads
//! - StarGan wrapper combining both networks

mod discriminator;
mod generator;
mod stargan;

pub use discriminator::{Discriminator, DiscriminatorConfig, DiscriminatorOutput};
pub use generator::{Generator, GeneratorConfig};
pub use stargan::StarGan;
