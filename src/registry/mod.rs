//! Registry operations
//!
//! Each operation builds a skopeo, trivy or AWS CLI invocation and runs it
//! in a container through a [`crate::executor::ContainerEngine`].

mod ecr;
pub mod errors;
pub mod mirror;
pub mod reference;
pub mod scan;
pub mod secret;
pub mod skopeo;

pub use errors::{Result, SkopeoError, ValidationError};
pub use mirror::{EcrPull, MirrorReport, MirrorRequest, MirroredImage, SourceAuth};
pub use reference::docker_ref;
pub use scan::{ScanFormat, ScanOptions, Severity};
pub use secret::{RegistryCredentials, SecretSource};
pub use skopeo::{DEFAULT_INSPECT_FORMAT, ImageInspection, Skopeo};
