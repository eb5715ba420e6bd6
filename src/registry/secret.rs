//! Secret sources and registry credentials

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, Secret, SecretString};

use super::errors::{Result, SkopeoError, ValidationError};

static ENV_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Where a secret value is read from.
///
/// Parsed from `env:NAME`, `file:PATH`, or a bare `NAME` (same as `env:NAME`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// An environment variable of the current process
    Env(String),
    /// A file whose contents (minus trailing newlines) are the secret
    File(PathBuf),
}

impl FromStr for SecretSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let source = match s.split_once(':') {
            Some(("env", name)) => Self::Env(name.to_string()),
            Some(("file", path)) => Self::File(PathBuf::from(path)),
            Some(_) => return Err(ValidationError::InvalidSecretSource(s.to_string())),
            None => Self::Env(s.to_string()),
        };

        match &source {
            Self::Env(name) if !ENV_NAME.is_match(name) => {
                Err(ValidationError::InvalidSecretSource(s.to_string()))
            }
            Self::File(path) if path.as_os_str().is_empty() => {
                Err(ValidationError::InvalidSecretSource(s.to_string()))
            }
            _ => Ok(source),
        }
    }
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(name) => write!(f, "env:{name}"),
            Self::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

impl SecretSource {
    /// Reads the secret from the process environment or the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`SkopeoError::Secret`] if the variable is unset or the file
    /// cannot be read.
    pub fn resolve(&self) -> Result<SecretString> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Same as [`resolve`](Self::resolve) with a custom variable lookup.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_with<F>(&self, lookup: F) -> Result<SecretString>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            Self::Env(name) => lookup(name)
                .map(Secret::new)
                .ok_or_else(|| SkopeoError::Secret {
                    source_name: self.to_string(),
                    reason: "variable not set".to_string(),
                }),
            Self::File(path) => std::fs::read_to_string(path)
                .map(|contents| Secret::new(contents.trim_end_matches(['\r', '\n']).to_string()))
                .map_err(|e| SkopeoError::Secret {
                    source_name: self.to_string(),
                    reason: e.to_string(),
                }),
        }
    }
}

/// Username and password for a registry.
#[derive(Clone)]
pub struct RegistryCredentials {
    /// Registry user name
    pub username: String,
    /// Registry password or token
    pub password: SecretString,
}

impl RegistryCredentials {
    /// Creates credentials from a user and an already-resolved secret.
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Returns `true` if the secret holds no characters.
pub(crate) fn is_blank(secret: &SecretString) -> bool {
    secret.expose_secret().is_empty()
}
