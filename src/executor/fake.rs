//! In-memory engine for unit tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use super::{ContainerEngine, ContainerSpec, ExecOutput, HealthStatus};
use crate::registry::{Result, SkopeoError};

/// A run as the engine saw it, with secrets exposed for assertions.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRun {
    pub image: String,
    pub exec: Vec<String>,
    pub env: Vec<(String, String)>,
    pub secrets: Vec<(String, String)>,
    pub spec: ContainerSpec,
}

type Responder = Box<dyn Fn(&ContainerSpec) -> Result<String> + Send + Sync>;

/// Records every spec and answers with a configurable responder.
pub(crate) struct FakeEngine {
    runs: Mutex<Vec<RecordedRun>>,
    responder: Responder,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_responder(|_| Ok(String::new()))
    }

    pub fn with_stdout(stdout: &str) -> Self {
        let stdout = stdout.to_string();
        Self::with_responder(move |_| Ok(stdout.clone()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&ContainerSpec) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            runs: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }

    pub fn last(&self) -> RecordedRun {
        self.runs().pop().expect("no container was run")
    }
}

/// Fails any run whose script mentions `needle`.
pub(crate) fn fail_when_contains(
    needle: &'static str,
) -> impl Fn(&ContainerSpec) -> Result<String> + Send + Sync + 'static {
    move |spec| {
        if spec.exec.iter().any(|a| a.contains(needle)) {
            Err(SkopeoError::CommandFailed {
                code: 1,
                stdout: String::new(),
                stderr: format!("{needle}: manifest unknown"),
            })
        } else {
            Ok(String::new())
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ExecOutput> {
        self.runs.lock().unwrap().push(RecordedRun {
            image: spec.image.clone(),
            exec: spec.exec.clone(),
            env: spec.env.clone().into_iter().collect(),
            secrets: spec
                .secret_env
                .iter()
                .map(|(k, v)| (k.clone(), v.expose_secret().clone()))
                .collect(),
            spec: spec.clone(),
        });

        let stdout = (self.responder)(spec)?;
        Ok(ExecOutput {
            stdout,
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::ZERO,
        })
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}
