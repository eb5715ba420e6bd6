//! Error types for registry operations

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the registry operations.
pub type Result<T> = std::result::Result<T, SkopeoError>;

/// Errors that can occur while running skopeo, trivy or the AWS CLI
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkopeoError {
    /// Input validation failed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The containerised command exited with a non-zero status
    #[error("Command failed with exit code {code}: {stderr}")]
    CommandFailed {
        /// Exit code returned by the command.
        code: i32,
        /// Standard output captured before the command exited.
        stdout: String,
        /// Standard error output from the command.
        stderr: String,
    },

    /// Timeout exceeded
    #[error("Timeout after {duration:?}")]
    Timeout {
        /// Duration before timeout.
        duration: Duration,
    },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),

    /// A secret could not be resolved
    #[error("Secret '{source_name}' unavailable: {reason}")]
    Secret {
        /// Where the secret was expected to come from (never its value).
        source_name: String,
        /// Why it could not be read.
        reason: String,
    },

    /// Command output could not be parsed
    #[error("Failed to parse {what}: {reason}")]
    Parse {
        /// What was being parsed.
        what: &'static str,
        /// Parser error message.
        reason: String,
    },
}

impl From<std::io::Error> for SkopeoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Validation errors for operation inputs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty
    #[error("{field} cannot be empty")]
    EmptyField {
        /// Name of the empty field.
        field: &'static str,
    },

    /// No repository tags were given to mirror
    #[error("repoTags cannot be empty")]
    EmptyRepoTags,

    /// A single destination reference was given for several tags
    #[error("destination reference '{dst_ref}' cannot be shared by {count} tags")]
    SharedDestination {
        /// The destination reference.
        dst_ref: String,
        /// Number of tags that would be written to it.
        count: usize,
    },

    /// Unknown trivy severity
    #[error("Invalid severity: '{0}'")]
    InvalidSeverity(String),

    /// Unknown trivy output format
    #[error("Invalid scan format: '{0}'")]
    InvalidFormat(String),

    /// ECR pull requested without a region or credentials file
    #[error("ECR pull requires {0}")]
    IncompleteEcr(&'static str),

    /// The AWS credentials file does not exist
    #[error("AWS credentials file not found: {0}")]
    MissingCredentialsFile(String),

    /// Malformed secret source specification
    #[error("Invalid secret source: '{0}'")]
    InvalidSecretSource(String),
}
