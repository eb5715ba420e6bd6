//! Infrastructure layer
//!
//! This module contains the container engine adapter, configuration and
//! logging setup.

mod config;
pub mod container;
mod logging;

pub use config::{Config, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use container::{CliEngine, ContainerRuntime};
pub use logging::init_logging;
