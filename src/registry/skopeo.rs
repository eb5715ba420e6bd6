//! Skopeo image operations
//!
//! [`Skopeo`] is the entry point for every registry operation. Copy lives in
//! `mirror.rs`, scanning in `scan.rs` and the ECR token exchange in `ecr.rs`;
//! they all run through the same [`ContainerEngine`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{Result, SkopeoError};
use super::reference::{self, DEFAULT_TAG};
use super::secret::RegistryCredentials;
use crate::executor::{ContainerEngine, ContainerSpec, ShellArg, ShellScript};
use crate::infrastructure::Config;

/// Default `skopeo inspect --format` template.
pub const DEFAULT_INSPECT_FORMAT: &str =
    "{{.Name}}:{{.Tag}} Digest: {{.Digest}} Arch: {{.Architecture}} | OS: {{.Os}}";

/// Secret variable holding the password for `--creds`.
const REGISTRY_PASS: &str = "REGISTRY_PASS";

/// Runs skopeo, trivy and the AWS CLI in containers
#[derive(Clone)]
pub struct Skopeo {
    pub(crate) engine: Arc<dyn ContainerEngine>,
    pub(crate) skopeo_image_tag: String,
    pub(crate) aws_cli_image_tag: String,
    pub(crate) trivy_cache_volume: String,
    pub(crate) max_parallel: usize,
}

impl std::fmt::Debug for Skopeo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skopeo")
            .field("engine", &self.engine.name())
            .field("skopeo_image_tag", &self.skopeo_image_tag)
            .field("aws_cli_image_tag", &self.aws_cli_image_tag)
            .field("trivy_cache_volume", &self.trivy_cache_volume)
            .field("max_parallel", &self.max_parallel)
            .finish()
    }
}

impl Skopeo {
    /// Creates a new instance using `latest` for every tool image
    #[must_use]
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            skopeo_image_tag: DEFAULT_TAG.to_string(),
            aws_cli_image_tag: DEFAULT_TAG.to_string(),
            trivy_cache_volume: "trivy-db-cache".to_string(),
            max_parallel: 0,
        }
    }

    /// Creates an instance from loaded configuration
    #[must_use]
    pub fn from_config(engine: Arc<dyn ContainerEngine>, config: &Config) -> Self {
        Self::new(engine)
            .with_skopeo_image_tag(&config.skopeo_image_tag)
            .with_aws_cli_image_tag(&config.aws_cli_image_tag)
            .with_trivy_cache_volume(&config.trivy_cache_volume)
            .with_max_parallel(config.max_parallel)
    }

    /// Sets the `quay.io/skopeo/stable` tag
    #[must_use]
    pub fn with_skopeo_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.skopeo_image_tag = tag.into();
        self
    }

    /// Sets the `amazon/aws-cli` tag
    #[must_use]
    pub fn with_aws_cli_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.aws_cli_image_tag = tag.into();
        self
    }

    /// Sets the named volume for the trivy DB
    #[must_use]
    pub fn with_trivy_cache_volume(mut self, volume: impl Into<String>) -> Self {
        self.trivy_cache_volume = volume.into();
        self
    }

    /// Limits concurrent copies in [`mirror_many`](Self::mirror_many); 0 means no limit
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// The configured skopeo image tag
    #[must_use]
    pub fn skopeo_image_tag(&self) -> &str {
        &self.skopeo_image_tag
    }

    /// The engine operations run through
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    pub(crate) fn skopeo_container(&self) -> ContainerSpec {
        ContainerSpec::new(reference::skopeo_image(&self.skopeo_image_tag))
    }

    pub(crate) async fn stdout(&self, spec: &ContainerSpec) -> Result<String> {
        Ok(self.engine.run(spec).await?.stdout)
    }

    /// Builds a skopeo run, switching to `sh -c` when `--creds` is needed.
    fn skopeo_with_creds(
        &self,
        args: Vec<String>,
        target: String,
        credentials: Option<&RegistryCredentials>,
    ) -> ContainerSpec {
        let container = self.skopeo_container();

        match credentials {
            Some(creds) => {
                let script = ShellScript::new("skopeo")
                    .args(args)
                    .arg("--creds")
                    .arg(ShellArg::with_env(format!("{}:", creds.username), REGISTRY_PASS))
                    .arg(target);
                container
                    .with_secret_variable(REGISTRY_PASS, creds.password.clone())
                    .with_exec(script.into_exec())
            }
            None => container.with_exec(
                std::iter::once("skopeo".to_string())
                    .chain(args)
                    .chain(std::iter::once(target)),
            ),
        }
    }

    /// Returns `skopeo --version` output
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to run.
    pub async fn version(&self) -> Result<String> {
        let spec = self.skopeo_container().with_exec(["skopeo", "--version"]);
        self.stdout(&spec).await
    }

    /// Inspects `docker://{registry}/{image_ref}` with a Go template.
    ///
    /// `format` defaults to [`DEFAULT_INSPECT_FORMAT`].
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input or if skopeo fails.
    pub async fn inspect(
        &self,
        image_ref: &str,
        registry: &str,
        format: Option<&str>,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<String> {
        let target = reference::docker_ref(registry, image_ref)?;
        let format = format.filter(|f| !f.is_empty()).unwrap_or(DEFAULT_INSPECT_FORMAT);

        tracing::info!(image = %target, "Inspecting image");
        let spec = self.skopeo_with_creds(
            vec!["inspect".to_string(), "--format".to_string(), format.to_string()],
            target,
            credentials,
        );
        self.stdout(&spec).await
    }

    /// Inspects an image and parses skopeo's JSON output
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input, if skopeo fails, or if its output
    /// is not the expected JSON.
    pub async fn inspect_json(
        &self,
        image_ref: &str,
        registry: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<ImageInspection> {
        let target = reference::docker_ref(registry, image_ref)?;

        tracing::info!(image = %target, "Inspecting image");
        let spec = self.skopeo_with_creds(vec!["inspect".to_string()], target, credentials);
        let stdout = self.stdout(&spec).await?;

        serde_json::from_str(&stdout).map_err(|e| SkopeoError::Parse {
            what: "skopeo inspect output",
            reason: e.to_string(),
        })
    }

    /// Deletes `docker://{registry}/{image_ref}`
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input or if skopeo fails.
    pub async fn delete(
        &self,
        image_ref: &str,
        registry: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<String> {
        let target = reference::docker_ref(registry, image_ref)?;

        tracing::warn!(image = %target, "Deleting image");
        let spec = self.skopeo_with_creds(vec!["delete".to_string()], target, credentials);
        self.stdout(&spec).await
    }
}

/// Parsed `skopeo inspect` output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspection {
    /// Repository name
    #[serde(default)]
    pub name: String,
    /// Manifest digest
    #[serde(default)]
    pub digest: String,
    /// Tags present in the repository
    #[serde(default)]
    pub repo_tags: Vec<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created: Option<String>,
    /// CPU architecture
    #[serde(default)]
    pub architecture: String,
    /// Operating system
    #[serde(default)]
    pub os: String,
    /// Layer digests
    #[serde(default)]
    pub layers: Vec<String>,
    /// Image labels
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}
