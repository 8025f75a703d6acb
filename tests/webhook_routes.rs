//! Router-level tests for the health and webhook endpoints.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use push_deploy_hook::config::{DeployConfig, PLACEHOLDER_SECRET};
use push_deploy_hook::deploy::DeploymentExecutor;
use push_deploy_hook::{AppState, build_router};
use sha2::Sha256;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";
const MAIN_PUSH: &str = r#"{"ref":"refs/heads/main","repository":{"name":"site"}}"#;

struct Harness {
    _dir: TempDir,
    counter: PathBuf,
    app: Router,
}

impl Harness {
    /// A deployment script that records each run, then executes `tail`.
    fn new(secret: &str, tail: &str, timeout: Duration) -> Self {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("runs");
        let script = dir.path().join("deploy.sh");
        fs::write(
            &script,
            format!("echo run >> {}\n{}\n", counter.display(), tail),
        )
        .unwrap();

        let config = DeployConfig {
            secret: secret.to_string(),
            deploy_script: script,
            ..DeployConfig::default()
        };
        let executor = DeploymentExecutor::new("bash", timeout);
        let app = build_router(Arc::new(AppState::with_executor(config, executor)));

        Self {
            _dir: dir,
            counter,
            app,
        }
    }

    fn log_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.counter)
            .map(|s| s.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    fn runs(&self) -> usize {
        self.log_lines().iter().filter(|l| *l == "run").count()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }
}

fn sign(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn webhook(body: &str, header: Option<(&str, String)>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json");
    if let Some((name, value)) = header {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_returns_ok_regardless_of_input() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(5));
    let request = Request::builder()
        .uri("/health")
        .header("x-hub-signature-256", "sha256=bogus")
        .body(Body::from("ignored"))
        .unwrap();

    let (status, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn unknown_paths_and_methods_are_not_found() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(5));

    for (method, uri) in [
        ("GET", "/"),
        ("GET", "/status"),
        ("GET", "/webhook"),
        ("POST", "/health"),
        ("POST", "/hooks"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, _) = harness.send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
    }
    assert_eq!(harness.runs(), 0);
}

#[tokio::test]
async fn signed_main_push_triggers_one_deployment() {
    let harness = Harness::new(SECRET, "echo done", Duration::from_secs(10));
    let signature = format!("sha256={}", sign(SECRET, MAIN_PUSH));

    let (status, body) = harness
        .send(webhook(MAIN_PUSH, Some(("x-hub-signature-256", signature))))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Deployment triggered");
    assert_eq!(harness.runs(), 1);
}

#[tokio::test]
async fn bare_hex_token_header_is_accepted() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(10));
    let body = r#"{"ref":"refs/heads/master","repository":{"name":"site"}}"#;

    let (status, text) = harness
        .send(webhook(body, Some(("x-codeup-token", sign(SECRET, body)))))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Deployment triggered");
    assert_eq!(harness.runs(), 1);
}

#[tokio::test]
async fn other_branches_are_ignored() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(10));
    let body = r#"{"ref":"refs/heads/develop","repository":{"name":"site"}}"#;

    let (status, text) = harness
        .send(webhook(body, Some(("x-gitlab-token", sign(SECRET, body)))))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Ignored non-main branch");
    assert_eq!(harness.runs(), 0);
}

#[tokio::test]
async fn wrong_secret_is_unauthorized() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(10));
    let signature = format!("sha256={}", sign("not-the-secret", MAIN_PUSH));

    let (status, body) = harness
        .send(webhook(MAIN_PUSH, Some(("x-hub-signature-256", signature))))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Unauthorized");
    assert_eq!(harness.runs(), 0);
}

#[tokio::test]
async fn higher_priority_header_wins() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(10));
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("x-hub-signature-256", "sha256=deadbeef")
        .header("x-gitee-token", sign(SECRET, MAIN_PUSH))
        .body(Body::from(MAIN_PUSH))
        .unwrap();

    let (status, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.runs(), 0);
}

#[tokio::test]
async fn missing_signature_is_let_through() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(10));

    let (status, body) = harness.send(webhook(MAIN_PUSH, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Deployment triggered");
    assert_eq!(harness.runs(), 1);
}

#[tokio::test]
async fn placeholder_secret_skips_verification() {
    let harness = Harness::new(PLACEHOLDER_SECRET, "", Duration::from_secs(10));

    let (status, _) = harness
        .send(webhook(
            MAIN_PUSH,
            Some(("x-hub-signature-256", "sha256=garbage".to_string())),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.runs(), 1);
}

#[tokio::test]
async fn non_json_body_is_server_error() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(10));
    let body = "definitely not json";

    let (status, text) = harness
        .send(webhook(body, Some(("x-hub-signature-256", sign(SECRET, body)))))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text, "Internal Server Error");
    assert_eq!(harness.runs(), 0);
}

#[tokio::test]
async fn failed_deployment_still_reports_dispatch() {
    let harness = Harness::new(SECRET, "echo boom >&2\nexit 2", Duration::from_secs(10));

    let (status, body) = harness.send(webhook(MAIN_PUSH, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Deployment triggered");
    assert_eq!(harness.runs(), 1);
}

#[tokio::test]
async fn timed_out_deployment_still_reports_dispatch() {
    let harness = Harness::new(SECRET, "sleep 30", Duration::from_millis(500));

    let started = std::time::Instant::now();
    let (status, body) = harness.send(webhook(MAIN_PUSH, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Deployment triggered");
    assert_eq!(harness.runs(), 1);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn deployments_run_one_at_a_time() {
    let harness = Harness::new(
        SECRET,
        "sleep 0.2\necho end >> \"$(dirname \"$0\")/runs\"",
        Duration::from_secs(10),
    );

    let first = harness.send(webhook(MAIN_PUSH, None));
    let second = harness.send(webhook(MAIN_PUSH, None));
    let ((s1, _), (s2, _)) = tokio::join!(first, second);

    assert_eq!(s1, StatusCode::OK);
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(harness.log_lines(), vec!["run", "end", "run", "end"]);
}

#[tokio::test]
async fn large_push_payload_is_read_in_full() {
    let harness = Harness::new(SECRET, "", Duration::from_secs(10));
    let padding = "x".repeat(3 * 1024 * 1024);
    let body = format!(
        r#"{{"ref":"refs/heads/main","repository":{{"name":"site"}},"padding":"{}"}}"#,
        padding
    );
    let signature = format!("sha256={}", sign(SECRET, &body));

    let (status, text) = harness
        .send(webhook(&body, Some(("x-hub-signature-256", signature))))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Deployment triggered");
    assert_eq!(harness.runs(), 1);
}
