//! Configuration management
//!
//! Defaults, then an optional YAML file, then `SKOPEO_MIRROR_*` environment
//! variables. CLI flags are applied last by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::container::ContainerRuntime;
use crate::registry::reference::DEFAULT_TAG;

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "skopeo-mirror.yaml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SKOPEO_MIRROR_";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container runtime used to run the tools
    pub runtime: ContainerRuntime,
    /// Tag of `quay.io/skopeo/stable`
    pub skopeo_image_tag: String,
    /// Tag of `aquasec/trivy`
    pub trivy_image_tag: String,
    /// Tag of `amazon/aws-cli`
    pub aws_cli_image_tag: String,
    /// Named volume holding the trivy vulnerability DB
    pub trivy_cache_volume: String,
    /// Concurrent copies in `mirror-many` (0 = all at once)
    pub max_parallel: usize,
    /// Per-container timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime: ContainerRuntime::Docker,
            skopeo_image_tag: DEFAULT_TAG.to_string(),
            trivy_image_tag: DEFAULT_TAG.to_string(),
            aws_cli_image_tag: DEFAULT_TAG.to_string(),
            trivy_cache_volume: "trivy-db-cache".to_string(),
            max_parallel: 0,
            timeout_secs: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] if it
    /// exists, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, a file cannot be
    /// parsed, or an environment override has an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Parses a YAML configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Applies `SKOPEO_MIRROR_*` overrides from the given variables
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or runtime value does not parse.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match name {
                "RUNTIME" => {
                    self.runtime = value
                        .parse()
                        .map_err(|e: String| anyhow::anyhow!(e))
                        .with_context(|| format!("Invalid {key}"))?;
                }
                "SKOPEO_IMAGE_TAG" => self.skopeo_image_tag = value,
                "TRIVY_IMAGE_TAG" => self.trivy_image_tag = value,
                "AWS_CLI_IMAGE_TAG" => self.aws_cli_image_tag = value,
                "TRIVY_CACHE_VOLUME" => self.trivy_cache_volume = value,
                "MAX_PARALLEL" => {
                    self.max_parallel = value
                        .parse()
                        .with_context(|| format!("Invalid {key}: '{value}'"))?;
                }
                "TIMEOUT_SECS" => {
                    self.timeout_secs = Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid {key}: '{value}'"))?,
                    );
                }
                "LOG_LEVEL" => self.log_level = value,
                _ => tracing::debug!(variable = %key, "Ignoring unknown override"),
            }
        }
        Ok(())
    }

    /// Per-container timeout
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
