//! ECR login through the AWS CLI image

use std::path::Path;

use secrecy::{Secret, SecretString};

use super::errors::{Result, SkopeoError, ValidationError};
use super::reference;
use super::skopeo::Skopeo;
use crate::executor::ContainerSpec;

const AWS_CREDENTIALS_TARGET: &str = "/root/.aws/credentials";

impl Skopeo {
    /// Exchanges an AWS credentials file for an ECR login password.
    ///
    /// Runs `aws ecr get-login-password --region <region>` with the file
    /// mounted read-only at `/root/.aws/credentials`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty region or a missing file, or
    /// the command error if the exchange fails.
    pub async fn ecr_login_password(&self, aws_creds: &Path, aws_region: &str) -> Result<SecretString> {
        let region = aws_region.trim();
        if region.is_empty() {
            return Err(ValidationError::IncompleteEcr("an AWS region").into());
        }
        if !aws_creds.is_file() {
            return Err(
                ValidationError::MissingCredentialsFile(aws_creds.display().to_string()).into(),
            );
        }

        tracing::info!(region = %region, "Requesting ECR login password");

        let spec = ContainerSpec::new(reference::aws_cli_image(&self.aws_cli_image_tag))
            .with_mounted_file(AWS_CREDENTIALS_TARGET, aws_creds, true)
            .with_exec(["aws", "ecr", "get-login-password", "--region", region]);

        let token = self.stdout(&spec).await?;
        let token = token.trim();
        if token.is_empty() {
            return Err(SkopeoError::Parse {
                what: "ECR login password",
                reason: "empty output".to_string(),
            });
        }

        Ok(Secret::new(token.to_string()))
    }
}
