mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{fake_backend, oracle_spec, service};
use mcpforge_core::api::{ErrorBody, GenerateResponse, PreviewResponse};
use mcpforge_core::model::RegistryEntry;
use mcpforge_daemon::http::router;
use serde_json::json;
use tempfile::{tempdir, TempDir};

struct Harness {
    base: String,
    client: reqwest::Client,
    _dir: TempDir,
}

async fn start(backend_status: StatusCode, backend_body: &str) -> Harness {
    let dir = tempdir().unwrap();
    let backend = fake_backend(backend_status, backend_body).await;
    let svc = service(dir.path(), &backend.url).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(svc));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

#[tokio::test]
async fn health_preview_generate_and_list() {
    let h = start(StatusCode::OK, "echo served").await;

    let health = h.client.get(h.url("/healthz")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let preview: PreviewResponse = h
        .client
        .post(h.url("/api/generate_preview"))
        .json(&oracle_spec())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(preview.preview, "echo served");

    // Legacy field names are accepted on the wire.
    let body = json!({
        "workflow_name": "oracle",
        "version": "1",
        "tools": [{ "kind": "sql", "vault_ref": "vault://db1", "query": "select 1" }],
        "workflow_edges": [["a", "b"]]
    });
    let resp = h.client.post(h.url("/api/generate")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let generated: GenerateResponse = resp.json().await.unwrap();
    assert_eq!(generated.registry_entry.id, "oracle_v1");
    assert_eq!(generated.registry_entry.tools[0].extra["query"], "select 1");

    let servers: Vec<RegistryEntry> = h
        .client
        .get(h.url("/api/servers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].vault_refs, vec!["vault://db1"]);
}

#[tokio::test]
async fn backend_error_is_bad_gateway_with_raw_text() {
    let h = start(StatusCode::SERVICE_UNAVAILABLE, "upstream is warming up").await;

    let resp = h
        .client
        .post(h.url("/api/generate"))
        .json(&oracle_spec())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let err: ErrorBody = resp.json().await.unwrap();
    assert_eq!(err.error, "upstream is warming up");
    assert_eq!(err.kind, "backend");
}

#[tokio::test]
async fn client_errors_map_to_4xx() {
    let h = start(StatusCode::OK, "echo ok").await;

    let malformed = h
        .client
        .post(h.url("/api/generate"))
        .header("content-type", "application/json")
        .body("{ nope")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let err: ErrorBody = malformed.json().await.unwrap();
    assert_eq!(err.kind, "invalid");

    let missing = h
        .client
        .post(h.url("/api/deploy"))
        .json(&json!({ "path": "/definitely/not/here.sh" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let unknown = h
        .client
        .post(h.url("/api/stop"))
        .json(&json!({ "pid": 4_000_000u32 }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    let err: ErrorBody = unknown.json().await.unwrap();
    assert_eq!(err.kind, "not_found");

    let no_log = h.client.get(h.url("/api/logs/oracle/1")).send().await.unwrap();
    assert_eq!(no_log.status(), StatusCode::NOT_FOUND);

    let no_job = h.client.get(h.url("/api/preprocess/01HXYZ")).send().await.unwrap();
    assert_eq!(no_job.status(), StatusCode::NOT_FOUND);
}
