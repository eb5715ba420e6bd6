//! # skopeo-mirror
//!
//! Copy, inspect, delete and scan container images by running `skopeo`,
//! `trivy` and the AWS CLI inside throwaway containers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skopeo_mirror::prelude::*;
//!
//! # async fn demo() -> skopeo_mirror::registry::Result<()> {
//! let skopeo = Skopeo::new(Arc::new(CliEngine::new(ContainerRuntime::Docker)));
//! let request = MirrorRequest::new("docker.io/library", "harbor.local/mirror");
//! let tags = vec!["alpine:3.19".to_string(), "alpine:3.20".to_string()];
//! let report = skopeo.mirror_many(&request, &tags).await?;
//! println!("mirrored {} images", report.images.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Mirroring**: `skopeo copy --preserve-digests`, one tag or many in parallel
//! - **ECR**: exchange an AWS credentials file for a pull token
//! - **Scanning**: `trivy image` with a persistent DB cache volume
//! - **Secrets**: passwords reach containers through the environment only
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or <https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod executor;
pub mod infrastructure;
pub mod registry;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use executor::{ContainerEngine, ContainerSpec, ExecOutput, HealthStatus};
pub use infrastructure::{CliEngine, Config, ContainerRuntime, init_logging};
pub use registry::{
    MirrorReport, MirrorRequest, RegistryCredentials, ScanFormat, ScanOptions, SecretSource,
    Severity, Skopeo, SkopeoError, SourceAuth, ValidationError,
};

/// Version of the skopeo-mirror crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
