//! End-to-end mirroring through the public API with a scripted engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, Secret};
use skopeo_mirror::prelude::*;
use skopeo_mirror::registry::Result;

/// Engine that sleeps per copy, tracks concurrency and fails tags on request.
#[derive(Default)]
struct ScriptedEngine {
    scripts: Mutex<Vec<String>>,
    secrets: Mutex<Vec<(String, String)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    fail_tags: Vec<String>,
}

impl ScriptedEngine {
    fn failing_on(tags: &[&str]) -> Self {
        Self {
            fail_tags: tags.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ExecOutput> {
        let script = spec.exec.join(" ");
        self.scripts.lock().unwrap().push(script.clone());
        self.secrets.lock().unwrap().extend(
            spec.secret_env
                .iter()
                .map(|(k, v)| (k.clone(), v.expose_secret().clone())),
        );

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // later tags finish first so ordering is not an accident of timing
        let delay = if script.contains("slow") {
            2_000
        } else if script.contains("app:1") {
            40
        } else {
            10
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if let Some(tag) = self.fail_tags.iter().find(|t| script.contains(t.as_str())) {
            return Err(SkopeoError::CommandFailed {
                code: 1,
                stdout: String::new(),
                stderr: format!("reading manifest {tag}: manifest unknown"),
            });
        }

        Ok(ExecOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(delay),
        })
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_mirror_many_keeps_input_order() {
    let engine = Arc::new(ScriptedEngine::default());
    let skopeo = Skopeo::new(engine.clone());
    let request = MirrorRequest::new("docker.io/library", "harbor.local/mirror");

    let report = skopeo
        .mirror_many(&request, &tags(&["app:1", "app:2", "app:3"]))
        .await
        .unwrap();

    let destinations: Vec<_> = report.images.iter().map(|i| i.destination.as_str()).collect();
    assert_eq!(
        destinations,
        vec![
            "docker://harbor.local/mirror/app:1",
            "docker://harbor.local/mirror/app:2",
            "docker://harbor.local/mirror/app:3",
        ]
    );
    assert_eq!(engine.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_mirror_many_respects_max_parallel() {
    let engine = Arc::new(ScriptedEngine::default());
    let skopeo = Skopeo::new(engine.clone()).with_max_parallel(2);
    let request = MirrorRequest::new("src.io", "dst.io");

    let report = skopeo
        .mirror_many(&request, &tags(&["app:1", "app:2", "app:3", "app:4"]))
        .await
        .unwrap();

    assert_eq!(report.images.len(), 4);
    assert_eq!(engine.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_mirror_many_surfaces_first_failure() {
    let engine = Arc::new(ScriptedEngine::failing_on(&["app:2"]));
    let skopeo = Skopeo::new(engine.clone());
    let request = MirrorRequest::new("src.io", "dst.io");

    let err = skopeo
        .mirror_many(&request, &tags(&["app:1", "app:2"]))
        .await
        .unwrap_err();

    match err {
        SkopeoError::CommandFailed { code, stderr, .. } => {
            assert_eq!(code, 1);
            assert!(stderr.contains("app:2"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_mirror_many_fast_failure_beats_slow_earlier_failure() {
    let engine = Arc::new(ScriptedEngine::failing_on(&["slow:1", "fast:2"]));
    let skopeo = Skopeo::new(engine.clone());
    let request = MirrorRequest::new("src.io", "dst.io");

    let start = Instant::now();
    let err = skopeo
        .mirror_many(&request, &tags(&["slow:1", "fast:2"]))
        .await
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_millis(1_000));
    match err {
        SkopeoError::CommandFailed { stderr, .. } => assert!(stderr.contains("fast:2")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_mirror_one_with_credentials_on_both_sides() {
    let engine = Arc::new(ScriptedEngine::default());
    let skopeo = Skopeo::new(engine.clone()).with_skopeo_image_tag("v1.14");
    let request = MirrorRequest::new("ghcr.io/acme", "harbor.local")
        .with_source_auth(SourceAuth::Credentials(RegistryCredentials::new(
            "bot",
            Secret::new("src-pw".to_string()),
        )))
        .with_destination_credentials("robot", Some(Secret::new("dst-pw".to_string())))
        .with_dst_ref("mirror/app:stable");

    let image = skopeo.mirror_one(&request, "app:1").await.unwrap();

    assert_eq!(image.source, "docker://ghcr.io/acme/app:1");
    assert_eq!(image.destination, "docker://harbor.local/mirror/app:stable");

    let scripts = engine.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains(r#"--src-creds bot:"${SRC_PASS}""#));
    assert!(scripts[0].contains(r#"--dest-creds robot:"${DST_PASS}""#));
    assert!(!scripts[0].contains("src-pw"));
    assert!(!scripts[0].contains("dst-pw"));

    let mut secrets = engine.secrets.lock().unwrap().clone();
    secrets.sort();
    assert_eq!(
        secrets,
        vec![
            ("DST_PASS".to_string(), "dst-pw".to_string()),
            ("SRC_PASS".to_string(), "src-pw".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_mirror_many_rejects_shared_destination() {
    let engine = Arc::new(ScriptedEngine::default());
    let request = MirrorRequest::new("src.io", "dst.io").with_dst_ref("app:latest");

    let err = Skopeo::new(engine.clone())
        .mirror_many(&request, &tags(&["app:1", "app:2"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SkopeoError::Validation(ValidationError::SharedDestination { count: 2, .. })
    ));
    assert!(engine.scripts().is_empty());
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let skopeo = Skopeo::new(Arc::new(ScriptedEngine::default()));
    let request = MirrorRequest::new("src.io", "dst.io");

    let report = skopeo.mirror_many(&request, &tags(&["app:2"])).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["images"][0]["repo_tag"], "app:2");
    assert_eq!(json["images"][0]["destination"], "docker://dst.io/app:2");
}
