//! Vulnerability scanning with trivy

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{Result, ValidationError};
use super::reference::{self, DEFAULT_TAG};
use super::secret::RegistryCredentials;
use super::skopeo::Skopeo;
use crate::executor::ContainerSpec;

/// Where trivy keeps its vulnerability DB inside the container.
pub const TRIVY_CACHE_DIR: &str = "/root/.cache/trivy";

/// Trivy severity levels, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Severity not known
    Unknown,
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
    /// Critical
    Critical,
}

impl Severity {
    /// Every severity, lowest first
    pub const ALL: [Severity; 5] = [
        Severity::Unknown,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Parses a comma-separated list such as `HIGH,critical`.
    ///
    /// Duplicates are dropped and the result is sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSeverity`] for an unknown entry, or
    /// [`ValidationError::EmptyField`] if the list is empty.
    pub fn parse_list(list: &str) -> std::result::Result<Vec<Severity>, ValidationError> {
        let set = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<std::result::Result<BTreeSet<Severity>, _>>()?;

        if set.is_empty() {
            return Err(ValidationError::EmptyField { field: "severity" });
        }
        Ok(set.into_iter().collect())
    }

    /// Renders a list the way trivy's `--severity` expects it
    #[must_use]
    pub fn join(severities: &[Severity]) -> String {
        severities
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(Self::Unknown),
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(ValidationError::InvalidSeverity(s.to_string())),
        }
    }
}

/// Trivy output formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON report
    Json,
    /// SARIF
    Sarif,
    /// CycloneDX SBOM
    Cyclonedx,
    /// SPDX SBOM
    Spdx,
    /// SPDX JSON SBOM
    SpdxJson,
    /// GitHub dependency snapshot
    Github,
    /// Cosign vulnerability attestation
    CosignVuln,
}

impl ScanFormat {
    /// Value passed to `--format`
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::Sarif => "sarif",
            Self::Cyclonedx => "cyclonedx",
            Self::Spdx => "spdx",
            Self::SpdxJson => "spdx-json",
            Self::Github => "github",
            Self::CosignVuln => "cosign-vuln",
        }
    }
}

impl fmt::Display for ScanFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "sarif" => Ok(Self::Sarif),
            "cyclonedx" => Ok(Self::Cyclonedx),
            "spdx" => Ok(Self::Spdx),
            "spdx-json" => Ok(Self::SpdxJson),
            "github" => Ok(Self::Github),
            "cosign-vuln" => Ok(Self::CosignVuln),
            _ => Err(ValidationError::InvalidFormat(s.to_string())),
        }
    }
}

/// Options for [`Skopeo::scan_image`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Severities to report
    pub severity: Vec<Severity>,
    /// Exit code trivy returns when vulnerabilities are found
    pub exit_code: i32,
    /// Report format
    pub format: ScanFormat,
    /// Tag of `aquasec/trivy`
    pub trivy_image_tag: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            severity: Severity::ALL.to_vec(),
            exit_code: 0,
            format: ScanFormat::Table,
            trivy_image_tag: DEFAULT_TAG.to_string(),
        }
    }
}

impl Skopeo {
    /// Trivy container with the vulnerability DB cache mounted
    #[must_use]
    pub fn base(&self, trivy_image_tag: &str) -> ContainerSpec {
        ContainerSpec::new(reference::trivy_image(trivy_image_tag))
            .with_mounted_cache(TRIVY_CACHE_DIR, self.trivy_cache_volume.clone())
    }

    /// Scans an image reference and returns trivy's report.
    ///
    /// With a non-zero `exit_code`, findings at the requested severities make
    /// trivy exit with that code, surfacing as
    /// [`crate::registry::SkopeoError::CommandFailed`] whose `stdout` holds
    /// the report.
    ///
    /// # Errors
    ///
    /// Returns an error on empty input or if trivy fails.
    pub async fn scan_image(
        &self,
        image_ref: &str,
        options: &ScanOptions,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<String> {
        let image_ref = image_ref.trim();
        if image_ref.is_empty() {
            return Err(ValidationError::EmptyField { field: "image" }.into());
        }
        if options.severity.is_empty() {
            return Err(ValidationError::EmptyField { field: "severity" }.into());
        }

        let mut spec = self.base(&options.trivy_image_tag);
        if let Some(creds) = credentials {
            spec = spec
                .with_secret_variable("TRIVY_PASSWORD", creds.password.clone())
                .with_env_variable("TRIVY_USERNAME", creds.username.clone());
        }

        let spec = spec.with_exec([
            "trivy".to_string(),
            "image".to_string(),
            "--quiet".to_string(),
            "--severity".to_string(),
            Severity::join(&options.severity),
            "--exit-code".to_string(),
            options.exit_code.to_string(),
            "--format".to_string(),
            options.format.to_string(),
            image_ref.to_string(),
        ]);

        tracing::info!(
            image = %image_ref,
            severity = %Severity::join(&options.severity),
            format = %options.format,
            "Scanning image"
        );
        self.stdout(&spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::fake::FakeEngine;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use secrecy::Secret;
    use std::sync::Arc;

    #[test]
    fn test_parse_severity_list() {
        assert_eq!(
            Severity::parse_list("critical, HIGH,high").unwrap(),
            vec![Severity::High, Severity::Critical]
        );
        assert_eq!(
            Severity::parse_list("FOO"),
            Err(ValidationError::InvalidSeverity("FOO".to_string()))
        );
        assert_eq!(
            Severity::parse_list(" , "),
            Err(ValidationError::EmptyField { field: "severity" })
        );
    }

    #[test]
    fn test_default_severity_rendering() {
        assert_eq!(
            Severity::join(&ScanOptions::default().severity),
            "UNKNOWN,LOW,MEDIUM,HIGH,CRITICAL"
        );
    }

    #[test]
    fn test_scan_format_round_trip() {
        assert_eq!("spdx-json".parse::<ScanFormat>().unwrap(), ScanFormat::SpdxJson);
        assert_eq!(ScanFormat::CosignVuln.to_string(), "cosign-vuln");
        assert!("xml".parse::<ScanFormat>().is_err());
    }

    #[test]
    fn test_base_mounts_cache() {
        let skopeo = Skopeo::new(Arc::new(FakeEngine::new())).with_trivy_cache_volume("ci-trivy");
        let spec = skopeo.base("0.50.1");
        assert_eq!(spec.image, "aquasec/trivy:0.50.1");
        assert_eq!(spec.caches[0].volume, "ci-trivy");
        assert_eq!(spec.caches[0].target, TRIVY_CACHE_DIR);
    }

    #[tokio::test]
    async fn test_scan_image_defaults() {
        let engine = Arc::new(FakeEngine::with_stdout("Total: 0"));
        let out = Skopeo::new(engine.clone())
            .scan_image("alpine:3.19", &ScanOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(out, "Total: 0");
        let run = engine.last();
        assert_eq!(run.image, "aquasec/trivy:latest");
        assert_snapshot!(run.exec.join(" "), @"trivy image --quiet --severity UNKNOWN,LOW,MEDIUM,HIGH,CRITICAL --exit-code 0 --format table alpine:3.19");
        assert!(run.env.is_empty());
    }

    #[tokio::test]
    async fn test_scan_image_with_credentials() {
        let engine = Arc::new(FakeEngine::new());
        let options = ScanOptions {
            severity: vec![Severity::Critical, Severity::High],
            exit_code: 1,
            format: ScanFormat::Json,
            trivy_image_tag: "0.50.1".to_string(),
        };
        let creds = RegistryCredentials::new("robot", Secret::new("tok".to_string()));

        Skopeo::new(engine.clone())
            .scan_image("reg.io/app:1", &options, Some(&creds))
            .await
            .unwrap();

        let run = engine.last();
        assert_eq!(
            run.exec,
            vec![
                "trivy",
                "image",
                "--quiet",
                "--severity",
                "HIGH,CRITICAL",
                "--exit-code",
                "1",
                "--format",
                "json",
                "reg.io/app:1",
            ]
        );
        assert_eq!(run.env, vec![("TRIVY_USERNAME".to_string(), "robot".to_string())]);
        assert_eq!(run.secrets, vec![("TRIVY_PASSWORD".to_string(), "tok".to_string())]);
    }

    #[tokio::test]
    async fn test_scan_image_rejects_empty_ref() {
        let engine = Arc::new(FakeEngine::new());
        let err = Skopeo::new(engine.clone())
            .scan_image("  ", &ScanOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::registry::SkopeoError::Validation(ValidationError::EmptyField { field: "image" })
        ));
        assert!(engine.runs().is_empty());
    }
}
