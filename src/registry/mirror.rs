//! Image mirroring with `skopeo copy`

use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures::{StreamExt, TryStreamExt, stream};
use secrecy::SecretString;
use serde::Serialize;

use super::errors::{Result, ValidationError};
use super::reference;
use super::secret::{RegistryCredentials, is_blank};
use super::skopeo::Skopeo;
use crate::executor::{ContainerSpec, ShellArg, ShellScript};

const SRC_PASS: &str = "SRC_PASS";
const DST_PASS: &str = "DST_PASS";

/// ECR pull settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcrPull {
    /// AWS credentials file on the host
    pub aws_creds: PathBuf,
    /// ECR region
    pub aws_region: String,
}

/// How to authenticate against the source registry
#[derive(Debug, Clone, Default)]
pub enum SourceAuth {
    /// No `--src-creds`
    #[default]
    Anonymous,
    /// Exchange AWS credentials for an ECR token
    Ecr(EcrPull),
    /// Plain user and password
    Credentials(RegistryCredentials),
}

/// Everything a copy needs except the tag
#[derive(Debug, Clone)]
pub struct MirrorRequest {
    /// Source registry host (and optional path)
    pub src_registry: String,
    /// Destination registry host (and optional path)
    pub dst_registry: String,
    /// Destination user
    pub dst_user: String,
    /// Destination password; no `--dest-creds` when absent
    pub dst_pass: Option<SecretString>,
    /// Destination reference; the repo tag is reused when empty
    pub dst_ref: Option<String>,
    /// Source authentication
    pub source_auth: SourceAuth,
}

impl MirrorRequest {
    /// Creates an anonymous-source request with no destination credentials
    #[must_use]
    pub fn new(src_registry: impl Into<String>, dst_registry: impl Into<String>) -> Self {
        Self {
            src_registry: src_registry.into(),
            dst_registry: dst_registry.into(),
            dst_user: String::new(),
            dst_pass: None,
            dst_ref: None,
            source_auth: SourceAuth::Anonymous,
        }
    }

    /// Sets destination credentials
    #[must_use]
    pub fn with_destination_credentials(
        mut self,
        user: impl Into<String>,
        pass: Option<SecretString>,
    ) -> Self {
        self.dst_user = user.into();
        self.dst_pass = pass;
        self
    }

    /// Sets the destination reference
    #[must_use]
    pub fn with_dst_ref(mut self, dst_ref: impl Into<String>) -> Self {
        self.dst_ref = Some(dst_ref.into());
        self
    }

    /// Sets source authentication
    #[must_use]
    pub fn with_source_auth(mut self, auth: SourceAuth) -> Self {
        self.source_auth = auth;
        self
    }

    fn dst_pass(&self) -> Option<&SecretString> {
        self.dst_pass.as_ref().filter(|p| !is_blank(p))
    }

    /// A destination password needs a user to go with it.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.dst_pass().is_some() && self.dst_user.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "dst_user" });
        }
        Ok(())
    }

    fn dst_ref(&self) -> Option<&str> {
        self.dst_ref.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Source credential resolved before copying
#[derive(Clone)]
enum SourceCreds {
    None,
    Token { user: String, pass: SecretString },
}

/// One mirrored tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirroredImage {
    /// Repository tag that was copied
    pub repo_tag: String,
    /// `docker://` source reference
    pub source: String,
    /// `docker://` destination reference
    pub destination: String,
    /// Time the copy took
    pub duration: Duration,
}

/// Result of [`Skopeo::mirror_many`], in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    /// Copied images
    pub images: Vec<MirroredImage>,
}

impl Skopeo {
    /// Copies `docker://{src}/{repo_tag}` to the destination registry.
    ///
    /// The destination is `dst_ref` when set, `repo_tag` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input, if the ECR token exchange fails,
    /// or if `skopeo copy` fails.
    pub async fn mirror_one(&self, request: &MirrorRequest, repo_tag: &str) -> Result<MirroredImage> {
        request.validate()?;
        let creds = self.resolve_source(&request.source_auth).await?;
        self.copy(request, repo_tag, &creds).await
    }

    /// Mirrors every tag concurrently, stopping at the first error.
    ///
    /// At most `max_parallel` copies run at once (no limit when 0). The first
    /// copy to fail, in completion order, wins; the others are dropped, which
    /// stops their containers. The report keeps the input order.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyRepoTags`] for an empty tag list,
    /// [`ValidationError::SharedDestination`] when a destination reference is
    /// combined with several tags, and otherwise the first copy error.
    pub async fn mirror_many(&self, request: &MirrorRequest, repo_tags: &[String]) -> Result<MirrorReport> {
        if repo_tags.is_empty() {
            return Err(ValidationError::EmptyRepoTags.into());
        }
        request.validate()?;
        if let Some(dst_ref) = request.dst_ref() {
            if repo_tags.len() > 1 {
                return Err(ValidationError::SharedDestination {
                    dst_ref: dst_ref.to_string(),
                    count: repo_tags.len(),
                }
                .into());
            }
        }

        let creds = self.resolve_source(&request.source_auth).await?;
        let limit = if self.max_parallel == 0 {
            repo_tags.len()
        } else {
            self.max_parallel
        };

        tracing::info!(
            tags = repo_tags.len(),
            parallel = limit,
            src = %request.src_registry,
            dst = %request.dst_registry,
            "Mirroring images"
        );

        let creds = &creds;
        let mut images = stream::iter(repo_tags.iter().enumerate())
            .map(move |(index, tag)| async move {
                self.copy(request, tag, creds).await.map(|image| (index, image))
            })
            .buffer_unordered(limit)
            .try_collect::<Vec<_>>()
            .await?;

        images.sort_by_key(|(index, _)| *index);
        Ok(MirrorReport {
            images: images.into_iter().map(|(_, image)| image).collect(),
        })
    }

    async fn resolve_source(&self, auth: &SourceAuth) -> Result<SourceCreds> {
        match auth {
            SourceAuth::Anonymous => Ok(SourceCreds::None),
            SourceAuth::Ecr(ecr) => {
                let token = self.ecr_login_password(&ecr.aws_creds, &ecr.aws_region).await?;
                Ok(SourceCreds::Token {
                    user: "AWS".to_string(),
                    pass: token,
                })
            }
            SourceAuth::Credentials(creds) => Ok(SourceCreds::Token {
                user: creds.username.clone(),
                pass: creds.password.clone(),
            }),
        }
    }

    fn copy_spec(
        &self,
        request: &MirrorRequest,
        source: &str,
        destination: &str,
        creds: &SourceCreds,
    ) -> ContainerSpec {
        let mut container = self.skopeo_container();
        let mut script = ShellScript::new("skopeo").args(["copy", "--preserve-digests"]);

        if let SourceCreds::Token { user, pass } = creds {
            script = script
                .arg("--src-creds")
                .arg(ShellArg::with_env(format!("{user}:"), SRC_PASS));
            container = container.with_secret_variable(SRC_PASS, pass.clone());
        }

        if let Some(pass) = request.dst_pass() {
            script = script
                .arg("--dest-creds")
                .arg(ShellArg::with_env(format!("{}:", request.dst_user), DST_PASS));
            container = container.with_secret_variable(DST_PASS, pass.clone());
        }

        container.with_exec(script.args([source, destination]).into_exec())
    }

    async fn copy(
        &self,
        request: &MirrorRequest,
        repo_tag: &str,
        creds: &SourceCreds,
    ) -> Result<MirroredImage> {
        let source = reference::docker_ref(&request.src_registry, repo_tag)?;
        let destination =
            reference::docker_ref(&request.dst_registry, request.dst_ref().unwrap_or(repo_tag))?;

        tracing::info!(src = %source, dst = %destination, "Copying image");

        let start = Instant::now();
        let spec = self.copy_spec(request, &source, &destination, creds);
        if let Err(e) = self.engine.run(&spec).await {
            tracing::error!(repo_tag = %repo_tag, error = %e, "Copy failed");
            return Err(e);
        }

        Ok(MirroredImage {
            repo_tag: repo_tag.to_string(),
            source,
            destination,
            duration: start.elapsed(),
        })
    }
}
