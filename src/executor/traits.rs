//! Container execution traits
//!
//! This module defines the seam between registry operations and the
//! container engine that actually runs the tools.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::registry::Result;

/// Trait for running a tool inside a throwaway container
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Engine name, used in logs
    fn name(&self) -> &str;

    /// Runs the container to completion.
    ///
    /// Implementations return [`crate::registry::SkopeoError::CommandFailed`]
    /// when the command exits non-zero.
    async fn run(&self, spec: &ContainerSpec) -> Result<ExecOutput>;

    /// Performs a health check
    async fn health_check(&self) -> HealthStatus;
}

/// Named volume mounted into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMount {
    /// Volume name
    pub volume: String,
    /// Mount point inside the container
    pub target: String,
}

/// Host file mounted into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMount {
    /// Path on the host
    pub source: PathBuf,
    /// Path inside the container
    pub target: String,
    /// Mount read-only
    pub read_only: bool,
}

/// Everything needed to run one command in one container.
///
/// `exec[0]` replaces the image entrypoint; the rest are its arguments.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Image reference
    pub image: String,
    /// Command to run
    pub exec: Vec<String>,
    /// Plain environment variables
    pub env: BTreeMap<String, String>,
    /// Secret environment variables, kept out of the engine's argv
    pub secret_env: Vec<(String, SecretString)>,
    /// Named cache volumes
    pub caches: Vec<CacheMount>,
    /// Bind-mounted host files
    pub files: Vec<FileMount>,
}

impl ContainerSpec {
    /// Creates a spec for the given image
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Sets the command to run
    #[must_use]
    pub fn with_exec<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exec = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a plain environment variable
    #[must_use]
    pub fn with_env_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds a secret environment variable
    #[must_use]
    pub fn with_secret_variable(mut self, key: impl Into<String>, secret: SecretString) -> Self {
        let key = key.into();
        self.secret_env.retain(|(k, _)| *k != key);
        self.secret_env.push((key, secret));
        self
    }

    /// Mounts a named cache volume
    #[must_use]
    pub fn with_mounted_cache(mut self, target: impl Into<String>, volume: impl Into<String>) -> Self {
        self.caches.push(CacheMount {
            volume: volume.into(),
            target: target.into(),
        });
        self
    }

    /// Mounts a host file
    #[must_use]
    pub fn with_mounted_file(
        mut self,
        target: impl Into<String>,
        source: impl Into<PathBuf>,
        read_only: bool,
    ) -> Self {
        self.files.push(FileMount {
            source: source.into(),
            target: target.into(),
            read_only,
        });
        self
    }

    /// Names of the secret variables, for logging
    #[must_use]
    pub fn secret_names(&self) -> Vec<&str> {
        self.secret_env.iter().map(|(k, _)| k.as_str()).collect()
    }
}

/// Output of a container run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code
    pub exit_code: i32,

    /// Duration of execution
    pub duration: Duration,
}

impl ExecOutput {
    /// Returns true if command succeeded (exit code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Health status of an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Engine is healthy
    Healthy,

    /// Engine is degraded (binary present, daemon unreachable)
    Degraded {
        /// Reason for degradation
        reason: String,
    },

    /// Engine is unhealthy
    Unhealthy {
        /// Reason for being unhealthy
        reason: String,
    },
}

impl HealthStatus {
    /// Returns true if engine is healthy or degraded
    #[must_use]
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unhealthy { .. })
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded { reason } => write!(f, "degraded: {reason}"),
            Self::Unhealthy { reason } => write!(f, "unhealthy: {reason}"),
        }
    }
}
