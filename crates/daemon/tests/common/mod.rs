#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use mcpforge_core::model::{ToolRef, WorkflowSpec};
use mcpforge_daemon::config::DaemonConfig;
use mcpforge_daemon::orchestrator::ForgeService;
use mcpforge_daemon::synth::SynthesisRequest;

/// Synthesis backend stand-in. Every request is recorded.
pub struct FakeBackend {
    pub url: String,
    pub requests: Arc<Mutex<Vec<SynthesisRequest>>>,
}

impl FakeBackend {
    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Answers every request with `status` and `body`; `{n}` in the body is
/// replaced by the 1-based request count.
pub async fn fake_backend(status: StatusCode, body: &str) -> FakeBackend {
    let requests: Arc<Mutex<Vec<SynthesisRequest>>> = Arc::default();
    let body = body.to_string();

    let recorded = Arc::clone(&requests);
    let app = Router::new().route(
        "/v1/generate",
        post(move |Json(req): Json<SynthesisRequest>| {
            let recorded = Arc::clone(&recorded);
            let body = body.clone();
            async move {
                let n = {
                    let mut reqs = recorded.lock().unwrap();
                    reqs.push(req);
                    reqs.len()
                };
                (status, body.replace("{n}", &n.to_string()))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeBackend {
        url: format!("http://{addr}/v1/generate"),
        requests,
    }
}

/// Config rooted at `dir`, running artifacts with `sh`.
pub fn test_config(dir: &Path, backend_url: &str) -> DaemonConfig {
    let mut cfg = DaemonConfig::default();
    cfg.registry_path = dir.join("registry.json");
    cfg.artifacts_root = dir.join("servers");
    cfg.artifact_extension = "sh".into();
    cfg.interpreter = "sh".into();
    cfg.synth.url = backend_url.to_string();
    cfg.synth.timeout_secs = 5;
    cfg
}

pub async fn service(dir: &Path, backend_url: &str) -> ForgeService {
    ForgeService::from_config(&test_config(dir, backend_url))
        .await
        .unwrap()
}

pub fn oracle_spec() -> WorkflowSpec {
    spec("oracle", "1", vec![ToolRef::new("sql").with_vault_ref("vault://db1")])
}

pub fn spec(name: &str, version: &str, tools: Vec<ToolRef>) -> WorkflowSpec {
    WorkflowSpec {
        name: name.into(),
        version: version.into(),
        description: String::new(),
        team: String::new(),
        tools,
        edges: Default::default(),
        deployment: Default::default(),
    }
}

/// Polls `check` every 20ms until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Every file under `dir`, recursively.
pub fn files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(files_under(&path));
        } else {
            out.push(path);
        }
    }
    out
}
