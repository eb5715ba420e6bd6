//! skopeo-mirror - copy, inspect, delete and scan container images
//!
//! Runs `skopeo`, `trivy` and the AWS CLI in throwaway containers through
//! docker or podman.
//!
//! ## Commands
//!
//! - `skopeo-mirror version` - Print the skopeo version in the configured image
//! - `skopeo-mirror inspect` - Inspect a remote image
//! - `skopeo-mirror delete` - Delete a remote image
//! - `skopeo-mirror scan` - Scan an image with trivy
//! - `skopeo-mirror mirror-one` - Copy one tag between registries
//! - `skopeo-mirror mirror-many` - Copy many tags in parallel
//! - `skopeo-mirror ecr-login` - Print an ECR login password
//! - `skopeo-mirror health` - Check the container runtime
//! - `skopeo-mirror completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Mirror two tags from ECR into Harbor
//! export HARBOR_PASS=...
//! skopeo-mirror mirror-many \
//!     --src-registry 123456789012.dkr.ecr.eu-west-1.amazonaws.com \
//!     --dst-registry harbor.local/mirror \
//!     --repo-tags app:1.0,app:1.1 \
//!     --dst-user robot --dst-pass env:HARBOR_PASS \
//!     --aws-pull --aws-creds ~/.aws/credentials --aws-region eu-west-1
//!
//! # Fail the build on critical findings
//! skopeo-mirror scan harbor.local/mirror/app:1.1 --severity CRITICAL --exit-code 1
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            if std::env::var("SKOPEO_MIRROR_VERBOSE").is_ok() {
                eprintln!("{:?}", e);
            }
            ExitCode::FAILURE
        }
    }
}
