//! Container engine (Docker/Podman)
//!
//! Runs tool containers by shelling out to the `docker` or `podman` CLI.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::executor::{ContainerEngine, ContainerSpec, ExecOutput, HealthStatus};
use crate::registry::{Result, SkopeoError};

/// Container runtime type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    /// Docker runtime
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRuntime::Docker => write!(f, "docker"),
            ContainerRuntime::Podman => write!(f, "podman"),
        }
    }
}

impl FromStr for ContainerRuntime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(format!("unknown container runtime '{other}'")),
        }
    }
}

type Cleanups = Arc<Mutex<JoinSet<()>>>;

/// Engine that runs containers through the docker/podman CLI
///
/// Containers abandoned by a cancelled run are force-removed in the
/// background; call [`CliEngine::wait_for_cleanup`] before shutting the
/// runtime down so those removals finish.
#[derive(Debug, Clone)]
pub struct CliEngine {
    runtime: ContainerRuntime,
    program: Option<PathBuf>,
    timeout: Option<Duration>,
    cleanups: Cleanups,
}

impl CliEngine {
    /// Creates a new engine for the given runtime
    #[must_use]
    pub fn new(runtime: ContainerRuntime) -> Self {
        Self {
            runtime,
            program: None,
            timeout: None,
            cleanups: Arc::default(),
        }
    }

    /// Uses a specific executable instead of `docker`/`podman` from `PATH`
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Sets a per-run timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Gets the runtime executable name
    fn runtime_command(&self) -> &'static str {
        match self.runtime {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    fn program(&self) -> &OsStr {
        match &self.program {
            Some(path) => path.as_os_str(),
            None => OsStr::new(self.runtime_command()),
        }
    }

    /// Waits until every pending force-remove has finished.
    pub async fn wait_for_cleanup(&self) {
        let mut pending = match self.cleanups.lock() {
            Ok(mut cleanups) => std::mem::take(&mut *cleanups),
            Err(_) => return,
        };
        while pending.join_next().await.is_some() {}
    }

    /// Arguments passed to `<runtime>` for one run.
    ///
    /// Secret variables are listed by name only; their values travel in the
    /// runtime process' environment.
    pub(crate) fn run_args(&self, spec: &ContainerSpec, name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];

        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }

        for (key, _) in &spec.secret_env {
            args.push("-e".to_string());
            args.push(key.clone());
        }

        for cache in &spec.caches {
            args.push("-v".to_string());
            args.push(format!("{}:{}", cache.volume, cache.target));
        }

        for file in &spec.files {
            args.push("-v".to_string());
            let mut mount = format!("{}:{}", file.source.display(), file.target);
            if file.read_only {
                mount.push_str(":ro");
            }
            args.push(mount);
        }

        let mut exec = spec.exec.iter();
        if let Some(entrypoint) = exec.next() {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }

        args.push(spec.image.clone());
        args.extend(exec.cloned());
        args
    }

    /// Checks if the container runtime is available
    async fn is_runtime_available(&self) -> bool {
        Command::new(self.program())
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// Force-removes a named container unless disarmed.
///
/// Dropping a pending run (timeout or a cancelled sibling in a fan-out) kills
/// the CLI client, which does not stop the container itself.
struct ContainerGuard {
    program: OsString,
    name: String,
    cleanups: Cleanups,
    armed: bool,
}

impl ContainerGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

fn remove_command(program: &OsStr, name: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(["rm", "-f", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

async fn remove_container(program: &OsStr, name: &str) {
    match remove_command(program, name).status().await {
        Ok(status) if status.success() => {
            tracing::debug!(container = %name, "Removed container");
        }
        Ok(status) => tracing::warn!(container = %name, %status, "Failed to remove container"),
        Err(e) => tracing::warn!(container = %name, error = %e, "Failed to remove container"),
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::debug!(container = %self.name, "Removing abandoned container");
        let program = self.program.clone();
        let name = std::mem::take(&mut self.name);

        match (tokio::runtime::Handle::try_current(), self.cleanups.lock()) {
            (Ok(handle), Ok(mut pending)) => {
                pending.spawn_on(
                    async move { remove_container(&program, &name).await },
                    &handle,
                );
            }
            _ => {
                let _ = std::process::Command::new(&program)
                    .args(["rm", "-f", name.as_str()])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    fn name(&self) -> &str {
        self.runtime_command()
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ExecOutput> {
        let name = format!("skopeo-mirror-{}", Uuid::new_v4());
        let runtime = self.runtime_command();

        let mut cmd = Command::new(self.program());
        cmd.args(self.run_args(spec, &name))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, secret) in &spec.secret_env {
            cmd.env(key, secret.expose_secret());
        }

        tracing::debug!(
            runtime = %runtime,
            container = %name,
            image = %spec.image,
            entrypoint = spec.exec.first().map(String::as_str).unwrap_or_default(),
            secrets = ?spec.secret_names(),
            "Starting container"
        );

        let start = Instant::now();
        let child = cmd.spawn()?;
        let guard = ContainerGuard {
            program: self.program().to_os_string(),
            name: name.clone(),
            cleanups: Arc::clone(&self.cleanups),
            armed: true,
        };

        let output = match self.timeout {
            Some(duration) => match tokio::time::timeout(duration, child.wait_with_output()).await
            {
                Ok(result) => result?,
                Err(_) => {
                    tracing::error!(container = %name, ?duration, "Container timed out");
                    remove_container(self.program(), &name).await;
                    guard.disarm();
                    return Err(SkopeoError::Timeout { duration });
                }
            },
            None => child.wait_with_output().await?,
        };
        guard.disarm();

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        tracing::info!(
            image = %spec.image,
            exit_code,
            duration_ms = duration.as_millis(),
            "Container finished"
        );

        if !stderr.is_empty() {
            tracing::debug!(container = %name, stderr = %stderr.trim_end(), "Container stderr");
        }

        if exit_code != 0 {
            return Err(SkopeoError::CommandFailed {
                code: exit_code,
                stdout,
                stderr,
            });
        }

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
            duration,
        })
    }

    async fn health_check(&self) -> HealthStatus {
        if !self.is_runtime_available().await {
            return HealthStatus::Unhealthy {
                reason: format!("{} is not available", self.runtime),
            };
        }

        let output = Command::new(self.program()).arg("info").output().await;

        match output {
            Ok(o) if o.status.success() => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Degraded {
                reason: format!("{} daemon may not be running", self.runtime),
            },
            Err(e) => HealthStatus::Unhealthy {
                reason: format!("{} error: {}", self.runtime, e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::Secret;

    #[test]
    fn test_container_runtime_display() {
        assert_eq!(ContainerRuntime::Docker.to_string(), "docker");
        assert_eq!(ContainerRuntime::Podman.to_string(), "podman");
    }

    #[test]
    fn test_container_runtime_from_str() {
        assert_eq!("Podman".parse::<ContainerRuntime>(), Ok(ContainerRuntime::Podman));
        assert!("containerd".parse::<ContainerRuntime>().is_err());
    }

    #[test]
    fn test_engine_name() {
        assert_eq!(CliEngine::new(ContainerRuntime::Podman).name(), "podman");
    }

    #[test]
    fn test_run_args_full_spec() {
        let spec = ContainerSpec::new("aquasec/trivy:latest")
            .with_mounted_cache("/root/.cache/trivy", "trivy-db-cache")
            .with_mounted_file("/root/.aws/credentials", "/home/ci/.aws/credentials", true)
            .with_env_variable("TRIVY_USERNAME", "robot")
            .with_secret_variable("TRIVY_PASSWORD", Secret::new("hunter2".to_string()))
            .with_exec(["trivy", "image", "--quiet", "alpine:3"]);

        let args = CliEngine::new(ContainerRuntime::Docker).run_args(&spec, "skopeo-mirror-test");

        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--name",
                "skopeo-mirror-test",
                "-e",
                "TRIVY_USERNAME=robot",
                "-e",
                "TRIVY_PASSWORD",
                "-v",
                "trivy-db-cache:/root/.cache/trivy",
                "-v",
                "/home/ci/.aws/credentials:/root/.aws/credentials:ro",
                "--entrypoint",
                "trivy",
                "aquasec/trivy:latest",
                "image",
                "--quiet",
                "alpine:3",
            ]
        );
        assert!(!args.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn test_run_args_without_exec_keeps_entrypoint() {
        let spec = ContainerSpec::new("quay.io/skopeo/stable:latest");
        let args = CliEngine::new(ContainerRuntime::Podman).run_args(&spec, "n");
        assert_eq!(args.last().map(String::as_str), Some("quay.io/skopeo/stable:latest"));
        assert!(!args.contains(&"--entrypoint".to_string()));
    }

    #[tokio::test]
    async fn test_health_check_missing_program_is_unhealthy() {
        let engine = CliEngine::new(ContainerRuntime::Podman)
            .with_program("/nonexistent/skopeo-mirror/podman");
        let health = engine.health_check().await;

        assert!(matches!(health, HealthStatus::Unhealthy { ref reason } if reason.contains("podman")));
    }

    #[cfg(unix)]
    mod stub {
        use super::*;
        use pretty_assertions::assert_eq;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        /// Writes a fake runtime that logs its argv, one call per line.
        ///
        /// `run` hangs for a `hang` entrypoint and exits 3 with output on
        /// both streams for a `findings` entrypoint.
        fn stub_runtime(dir: &Path, info_exit: u8) -> (PathBuf, PathBuf) {
            let log = dir.join("calls.log");
            let program = dir.join("docker");
            let script = format!(
                r#"#!/bin/sh
echo "$*" >> '{log}'
case "$1" in
  run)
    case "$*" in
      *hang*) sleep 5 ;;
      *findings*) echo "CRITICAL: 2"; echo "vulnerabilities found" >&2; exit 3 ;;
    esac
    echo "skopeo version 1.14.0"
    ;;
  info) exit {info_exit} ;;
esac
exit 0
"#,
                log = log.display()
            );
            std::fs::write(&program, script).unwrap();
            std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
            (program, log)
        }

        fn calls(log: &Path) -> Vec<String> {
            std::fs::read_to_string(log)
                .unwrap_or_default()
                .lines()
                .map(ToString::to_string)
                .collect()
        }

        fn container_name(run_call: &str) -> String {
            run_call.split_whitespace().nth(3).unwrap().to_string()
        }

        #[tokio::test]
        async fn test_run_returns_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let (program, log) = stub_runtime(dir.path(), 0);
            let engine = CliEngine::new(ContainerRuntime::Docker).with_program(&program);

            let spec = ContainerSpec::new("quay.io/skopeo/stable:latest").with_exec(["skopeo", "--version"]);
            let output = engine.run(&spec).await.unwrap();

            assert_eq!(output.stdout, "skopeo version 1.14.0\n");
            let calls = calls(&log);
            assert_eq!(calls.len(), 1);
            assert!(container_name(&calls[0]).starts_with("skopeo-mirror-"));
        }

        #[tokio::test]
        async fn test_failed_run_keeps_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let (program, _log) = stub_runtime(dir.path(), 0);
            let engine = CliEngine::new(ContainerRuntime::Docker).with_program(&program);

            let spec = ContainerSpec::new("aquasec/trivy:latest").with_exec(["findings"]);
            let err = engine.run(&spec).await.unwrap_err();

            assert_eq!(
                err,
                SkopeoError::CommandFailed {
                    code: 3,
                    stdout: "CRITICAL: 2\n".to_string(),
                    stderr: "vulnerabilities found\n".to_string(),
                }
            );
        }

        #[tokio::test]
        async fn test_timeout_force_removes_container() {
            let dir = tempfile::tempdir().unwrap();
            let (program, log) = stub_runtime(dir.path(), 0);
            let engine = CliEngine::new(ContainerRuntime::Docker)
                .with_program(&program)
                .with_timeout(Some(Duration::from_millis(500)));

            let spec = ContainerSpec::new("img").with_exec(["hang"]);
            let err = engine.run(&spec).await.unwrap_err();

            assert_eq!(
                err,
                SkopeoError::Timeout {
                    duration: Duration::from_millis(500)
                }
            );
            let calls = calls(&log);
            assert_eq!(calls.len(), 2, "{calls:?}");
            let name = container_name(&calls[0]);
            assert_eq!(calls[1], format!("rm -f {name}"));
        }

        #[tokio::test]
        async fn test_cancelled_run_is_removed_after_cleanup() {
            let dir = tempfile::tempdir().unwrap();
            let (program, log) = stub_runtime(dir.path(), 0);
            let engine = CliEngine::new(ContainerRuntime::Docker).with_program(&program);

            let spec = ContainerSpec::new("img").with_exec(["hang"]);
            let cancelled = tokio::time::timeout(Duration::from_millis(500), engine.run(&spec)).await;
            assert!(cancelled.is_err());

            engine.wait_for_cleanup().await;

            let calls = calls(&log);
            assert_eq!(calls.len(), 2, "{calls:?}");
            let name = container_name(&calls[0]);
            assert_eq!(calls[1], format!("rm -f {name}"));
        }

        #[tokio::test]
        async fn test_health_check_follows_info() {
            let dir = tempfile::tempdir().unwrap();
            let (program, _log) = stub_runtime(dir.path(), 0);
            let engine = CliEngine::new(ContainerRuntime::Docker).with_program(&program);
            assert_eq!(engine.health_check().await, HealthStatus::Healthy);

            let dir = tempfile::tempdir().unwrap();
            let (program, _log) = stub_runtime(dir.path(), 1);
            let engine = CliEngine::new(ContainerRuntime::Docker).with_program(&program);
            assert!(matches!(
                engine.health_check().await,
                HealthStatus::Degraded { .. }
            ));
        }
    }
}
