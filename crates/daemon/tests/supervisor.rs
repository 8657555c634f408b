#![cfg(unix)]

mod common;

use std::path::PathBuf;

use axum::http::StatusCode;
use common::{eventually, fake_backend, oracle_spec, service};
use mcpforge_core::model::ProcessState;
use mcpforge_core::ForgeError;
use mcpforge_daemon::supervisor::Supervisor;
use mcpforge_daemon::writer::log_path;
use tempfile::tempdir;

fn script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn deploy_missing_path_is_rejected() {
    let dir = tempdir().unwrap();
    let sup = Supervisor::new("sh");

    let err = sup.deploy(&dir.path().join("nope.sh")).await.unwrap_err();

    assert!(matches!(err, ForgeError::InvalidPath(_)));
    assert!(sup.list().await.is_empty());
    assert!(!log_path(&dir.path().join("nope.sh")).exists());
}

#[tokio::test]
async fn log_missing_before_deploy_then_captures_output() {
    let dir = tempdir().unwrap();
    let sup = Supervisor::new("sh");
    let path = script(dir.path(), "hello.sh", "echo hello-from-artifact\necho oops >&2\n");

    assert!(matches!(sup.read_log(&path).await, Err(ForgeError::NotFound(_))));

    let pid = sup.deploy(&path).await.unwrap();
    assert!(pid > 0);

    let captured = eventually(|| {
        let sup = sup.clone();
        let path = path.clone();
        async move {
            let log = sup.read_log(&path).await.unwrap_or_default();
            log.contains("hello-from-artifact") && log.contains("oops")
        }
    })
    .await;
    assert!(captured, "log never contained the artifact output");
}

#[tokio::test]
async fn log_is_appended_across_deploys() {
    let dir = tempdir().unwrap();
    let sup = Supervisor::new("sh");
    let path = script(dir.path(), "twice.sh", "echo line\n");

    sup.deploy(&path).await.unwrap();
    sup.deploy(&path).await.unwrap();

    let both = eventually(|| {
        let sup = sup.clone();
        let path = path.clone();
        async move { sup.read_log(&path).await.unwrap_or_default().matches("line").count() == 2 }
    })
    .await;
    assert!(both);
}

#[tokio::test]
async fn stop_terminates_running_process_once() {
    let dir = tempdir().unwrap();
    let sup = Supervisor::new("sh");
    // Blocks on stdin, which the supervisor keeps open.
    let path = script(dir.path(), "serve.sh", "echo ready\nread line\n");

    let pid = sup.deploy(&path).await.unwrap();
    assert_eq!(sup.get(pid).await.unwrap().state, ProcessState::Running);

    let info = sup.stop(pid).await.unwrap();
    assert_eq!(info.state, ProcessState::Stopped);
    assert_eq!(sup.get(pid).await.unwrap().state, ProcessState::Stopped);

    assert!(matches!(sup.stop(pid).await, Err(ForgeError::UnknownProcess(p)) if p == pid));
}

#[tokio::test]
async fn stop_rejects_pids_not_spawned_here() {
    let sup = Supervisor::new("sh");
    let own = std::process::id();
    assert!(matches!(sup.stop(own).await, Err(ForgeError::UnknownProcess(_))));
}

#[tokio::test]
async fn self_exit_is_recorded() {
    let dir = tempdir().unwrap();
    let sup = Supervisor::new("sh");
    let path = script(dir.path(), "quit.sh", "exit 3\n");
    let mut events = sup.subscribe();

    let pid = sup.deploy(&path).await.unwrap();

    let exited = eventually(|| {
        let sup = sup.clone();
        async move { sup.get(pid).await.map(|p| p.state) == Some(ProcessState::Exited { code: Some(3) }) }
    })
    .await;
    assert!(exited);
    assert!(matches!(sup.stop(pid).await, Err(ForgeError::UnknownProcess(_))));

    let first = events.recv().await.unwrap();
    assert_eq!(first.state, ProcessState::Running);
    let second = events.recv().await.unwrap();
    assert_eq!(second.pid, pid);
    assert_eq!(second.state, ProcessState::Exited { code: Some(3) });
}

#[tokio::test]
async fn deployed_flag_follows_deploy_and_stop() {
    let dir = tempdir().unwrap();
    let backend = fake_backend(StatusCode::OK, "echo ready\nread line\n").await;
    let svc = service(dir.path(), &backend.url).await;

    let resp = svc.generate(&oracle_spec()).await.unwrap();
    let pid = svc.deploy(std::path::Path::new(&resp.path)).await.unwrap();
    assert!(svc.list().await.unwrap()[0].deployed);
    assert_eq!(svc.processes().await.len(), 1);

    let svc_ref = &svc;
    let ready = eventually(move || {
        async move { svc_ref.read_log("oracle", "1").await.unwrap_or_default().contains("ready") }
    })
    .await;
    assert!(ready);

    svc.stop(pid).await.unwrap();
    assert!(!svc.list().await.unwrap()[0].deployed);
    assert!(matches!(svc.stop(pid).await, Err(ForgeError::UnknownProcess(_))));
}

#[tokio::test]
async fn deployed_flag_clears_when_process_exits() {
    let dir = tempdir().unwrap();
    let backend = fake_backend(StatusCode::OK, "exit 0\n").await;
    let svc = service(dir.path(), &backend.url).await;

    let resp = svc.generate(&oracle_spec()).await.unwrap();
    svc.deploy(std::path::Path::new(&resp.path)).await.unwrap();

    let svc_ref = &svc;
    let cleared = eventually(move || {
        async move { !svc_ref.list().await.unwrap()[0].deployed }
    })
    .await;
    assert!(cleared);
}

#[tokio::test]
async fn read_log_rejects_path_components() {
    let dir = tempdir().unwrap();
    let backend = fake_backend(StatusCode::OK, "echo ok").await;
    let svc = service(dir.path(), &backend.url).await;

    assert!(matches!(svc.read_log("..", "1").await, Err(ForgeError::Validation(_))));
    assert!(matches!(svc.read_log("oracle", "1").await, Err(ForgeError::NotFound(_))));
}

#[tokio::test]
async fn non_canonical_deploy_path_marks_the_registered_entry() {
    let dir = tempdir().unwrap();
    let backend = fake_backend(StatusCode::OK, "echo ready\nread line\n").await;
    let svc = service(dir.path(), &backend.url).await;

    let resp = svc.generate(&oracle_spec()).await.unwrap();
    let detour = dir.path().join("servers/./oracle/../oracle/v1/mcp_server_oracle_v1.sh");
    let link = dir.path().join("current.sh");
    std::os::unix::fs::symlink(&resp.path, &link).unwrap();

    let pid = svc.deploy(&detour).await.unwrap();
    assert!(svc.list().await.unwrap()[0].deployed);
    assert_eq!(svc.processes().await[0].path, resp.path);

    svc.stop(pid).await.unwrap();
    assert!(!svc.list().await.unwrap()[0].deployed);

    let pid = svc.deploy(&link).await.unwrap();
    assert!(svc.list().await.unwrap()[0].deployed);
    svc.stop(pid).await.unwrap();
    assert!(!svc.list().await.unwrap()[0].deployed);
}

#[tokio::test]
async fn stale_deployed_flags_are_cleared_at_startup() {
    let dir = tempdir().unwrap();
    let doc = serde_json::json!({
        "registry": [{
            "id": "old_v1",
            "name": "old",
            "version": "1",
            "tools": [],
            "path": dir.path().join("servers/old/v1/mcp_server_old_v1.sh").display().to_string(),
            "deployed": true,
            "team": "",
            "vault_refs": [],
            "audit": {"generated_by": "agent", "timestamp": 1}
        }]
    });
    std::fs::write(dir.path().join("registry.json"), doc.to_string()).unwrap();
    let backend = fake_backend(StatusCode::OK, "exit 0\n").await;

    let svc = service(dir.path(), &backend.url).await;

    let entries = svc.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].deployed);
    assert_eq!(svc.reconcile_deployed().await.unwrap(), 0);
}

#[tokio::test]
async fn reconcile_keeps_running_artifacts_flagged() {
    let dir = tempdir().unwrap();
    let backend = fake_backend(StatusCode::OK, "echo ready\nread line\n").await;
    let svc = service(dir.path(), &backend.url).await;

    let resp = svc.generate(&oracle_spec()).await.unwrap();
    let pid = svc.deploy(std::path::Path::new(&resp.path)).await.unwrap();

    assert_eq!(svc.reconcile_deployed().await.unwrap(), 0);
    assert!(svc.list().await.unwrap()[0].deployed);
    svc.stop(pid).await.unwrap();
}
