//! Prelude module for common imports

pub use crate::executor::{ContainerEngine, ContainerSpec, ExecOutput, HealthStatus};
pub use crate::infrastructure::{CliEngine, Config, ContainerRuntime};
pub use crate::registry::{
    EcrPull, ImageInspection, MirrorReport, MirrorRequest, MirroredImage, RegistryCredentials,
    ScanFormat, ScanOptions, SecretSource, Severity, Skopeo, SkopeoError, SourceAuth,
    ValidationError,
};
