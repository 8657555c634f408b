//! Lifecycle of deployed artifacts as child processes.
//!
//! `NotStarted -> Running -> Stopped`, plus `Running -> Exited` when the child
//! terminates by itself. Redeploying spawns a new, unrelated pid.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use mcpforge_core::model::{ProcessInfo, ProcessState};
use mcpforge_core::{now_ms, ForgeError, ForgeResult};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, Mutex};

use crate::signal::send_sigterm;
use crate::writer::log_path;

/// State change of a supervised process.
#[derive(Debug, Clone)]
pub struct ProcessEvent {
    /// Process id.
    pub pid: u32,
    /// Artifact path the process runs.
    pub path: String,
    /// State after the change.
    pub state: ProcessState,
}

struct Supervised {
    info: ProcessInfo,
    /// Held open so artifacts blocked on stdin keep serving.
    stdin: Option<ChildStdin>,
}

/// Starts artifacts as child processes and tracks them until they end.
#[derive(Clone)]
pub struct Supervisor {
    program: String,
    program_args: Vec<String>,
    procs: Arc<Mutex<HashMap<u32, Supervised>>>,
    events: broadcast::Sender<ProcessEvent>,
}

impl Supervisor {
    /// `interpreter` is split on whitespace: program followed by leading args.
    pub fn new(interpreter: &str) -> Self {
        let mut parts = interpreter.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "python3".to_string());
        let (events, _) = broadcast::channel(64);
        Self {
            program,
            program_args: parts.collect(),
            procs: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Receiver of every subsequent state change.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events.subscribe()
    }

    /// Spawns the artifact at `path` with stdout and stderr appended to
    /// `path + ".log"`. Returns as soon as the process exists; there is no
    /// readiness check.
    pub async fn deploy(&self, path: &Path) -> ForgeResult<u32> {
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ForgeError::InvalidPath(path.to_path_buf()));
        }

        let log = log_path(path);
        let out = open_log(&log).await?;
        let err = open_log(&log).await?;

        let mut child = Command::new(&self.program)
            .args(&self.program_args)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err))
            .spawn()
            .map_err(|source| ForgeError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let Some(pid) = child.id() else {
            // Already gone and reaped; nothing to supervise.
            return Err(ForgeError::Spawn {
                path: path.to_path_buf(),
                source: std::io::Error::other("child exited before it could be registered"),
            });
        };

        let info = ProcessInfo {
            pid,
            path: path.display().to_string(),
            log_path: log.display().to_string(),
            state: ProcessState::Running,
            started_at_ms: now_ms(),
        };
        let stdin = child.stdin.take();

        {
            let mut procs = self.procs.lock().await;
            procs.insert(pid, Supervised { info: info.clone(), stdin });
        }
        self.emit(&info);
        self.spawn_reaper(pid, child);

        tracing::info!(pid, path = %path.display(), log = %log.display(), "artifact deployed");
        Ok(pid)
    }

    /// Sends SIGTERM to a process this supervisor started and that is still
    /// running. Does not wait for it to exit.
    pub async fn stop(&self, pid: u32) -> ForgeResult<ProcessInfo> {
        let mut procs = self.procs.lock().await;
        let Some(entry) = procs.get_mut(&pid) else {
            return Err(ForgeError::UnknownProcess(pid));
        };
        if entry.info.state != ProcessState::Running {
            return Err(ForgeError::UnknownProcess(pid));
        }

        send_sigterm(pid)?;

        entry.info.state = ProcessState::Stopped;
        entry.stdin = None;
        let info = entry.info.clone();
        drop(procs);

        self.emit(&info);
        tracing::info!(pid, path = %info.path, "sent SIGTERM");
        Ok(info)
    }

    /// Full current contents of the log sink for the artifact at `path`.
    pub async fn read_log(&self, path: &Path) -> ForgeResult<String> {
        let log = log_path(path);
        match tokio::fs::read(&log).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ForgeError::NotFound(format!("log {}", log.display())))
            }
            Err(source) => Err(ForgeError::Log { path: log, source }),
        }
    }

    /// Snapshot of every process started by this supervisor, ordered by pid.
    pub async fn list(&self) -> Vec<ProcessInfo> {
        let procs = self.procs.lock().await;
        let mut out: Vec<ProcessInfo> = procs.values().map(|s| s.info.clone()).collect();
        out.sort_by_key(|p| p.pid);
        out
    }

    /// Snapshot of one supervised process.
    pub async fn get(&self, pid: u32) -> Option<ProcessInfo> {
        self.procs.lock().await.get(&pid).map(|s| s.info.clone())
    }

    /// Waits for the child so it never lingers as a zombie, then records the exit.
    fn spawn_reaper(&self, pid: u32, mut child: Child) {
        let procs = Arc::clone(&self.procs);
        let events = self.events.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(pid, error = %e, "wait on artifact failed");
                    None
                }
            };

            let mut procs = procs.lock().await;
            let Some(entry) = procs.get_mut(&pid) else {
                return;
            };
            entry.stdin = None;
            if entry.info.state == ProcessState::Running {
                entry.info.state = ProcessState::Exited { code };
                tracing::info!(pid, ?code, path = %entry.info.path, "artifact exited");
                let _ = events.send(ProcessEvent {
                    pid,
                    path: entry.info.path.clone(),
                    state: entry.info.state.clone(),
                });
            }
        });
    }

    fn emit(&self, info: &ProcessInfo) {
        // No subscribers is fine.
        let _ = self.events.send(ProcessEvent {
            pid: info.pid,
            path: info.path.clone(),
            state: info.state.clone(),
        });
    }
}

/// Opens the log sink in append mode, creating it on first use. Each output
/// stream gets its own handle; appends from both interleave safely.
async fn open_log(log: &Path) -> ForgeResult<std::fs::File> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .await
        .map_err(|source| ForgeError::Spawn {
            path: log.to_path_buf(),
            source,
        })?;
    Ok(file.into_std().await)
}
