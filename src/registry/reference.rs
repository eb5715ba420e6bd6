//! Image reference templating
//!
//! Builds the `docker://` transport references skopeo expects and the tool
//! image names each operation runs in.

use super::errors::ValidationError;

/// Skopeo image repository.
pub const SKOPEO_IMAGE: &str = "quay.io/skopeo/stable";
/// Trivy image repository.
pub const TRIVY_IMAGE: &str = "aquasec/trivy";
/// AWS CLI image repository.
pub const AWS_CLI_IMAGE: &str = "amazon/aws-cli";
/// Tag used when none is configured.
pub const DEFAULT_TAG: &str = "latest";

/// Builds `docker://{registry}/{image}`.
///
/// Surrounding slashes on either part are dropped so `"reg.io/"` and
/// `"/app:1"` still yield a single separator.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyField`] if either part is empty after
/// trimming.
pub fn docker_ref(registry: &str, image: &str) -> Result<String, ValidationError> {
    let registry = registry.trim().trim_matches('/');
    let image = image.trim().trim_matches('/');

    if registry.is_empty() {
        return Err(ValidationError::EmptyField { field: "registry" });
    }
    if image.is_empty() {
        return Err(ValidationError::EmptyField { field: "image" });
    }

    Ok(format!("docker://{registry}/{image}"))
}

fn tagged(repository: &str, tag: &str) -> String {
    let tag = tag.trim();
    let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };
    format!("{repository}:{tag}")
}

/// `quay.io/skopeo/stable:{tag}`
#[must_use]
pub fn skopeo_image(tag: &str) -> String {
    tagged(SKOPEO_IMAGE, tag)
}

/// `aquasec/trivy:{tag}`
#[must_use]
pub fn trivy_image(tag: &str) -> String {
    tagged(TRIVY_IMAGE, tag)
}

/// `amazon/aws-cli:{tag}`
#[must_use]
pub fn aws_cli_image(tag: &str) -> String {
    tagged(AWS_CLI_IMAGE, tag)
}
