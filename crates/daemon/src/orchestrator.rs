//! The generation pipeline and the lifecycle façade over it.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use mcpforge_core::api::GenerateResponse;
use mcpforge_core::model::{PreprocessJob, ProcessInfo, ProcessState, RegistryEntry, WorkflowSpec};
use mcpforge_core::validation::{is_safe_component, validate_spec};
use mcpforge_core::{now_ms, ForgeError, ForgeResult};
use tokio::sync::broadcast::error::RecvError;

use crate::config::DaemonConfig;
use crate::preprocess::{ManifestPreprocessor, PreprocessQueue};
use crate::registry::JsonRegistry;
use crate::supervisor::Supervisor;
use crate::synth::{HttpSynthesizer, Synthesizer};
use crate::writer::ArtifactWriter;

/// Generation pipeline plus the lifecycle operations on its artifacts.
///
/// Artifact paths are canonical everywhere: in registry entries, in the
/// supervisor table and in the `deployed` bookkeeping that links the two.
pub struct ForgeService {
    synth: Arc<dyn Synthesizer>,
    writer: ArtifactWriter,
    registry: Arc<JsonRegistry>,
    supervisor: Supervisor,
    preprocess: PreprocessQueue,
}

impl ForgeService {
    /// Wires the components together. Spawns the task that clears `deployed`
    /// when a supervised process exits, so it must run inside a tokio runtime.
    pub fn new(
        synth: Arc<dyn Synthesizer>,
        writer: ArtifactWriter,
        registry: JsonRegistry,
        supervisor: Supervisor,
        preprocess: PreprocessQueue,
    ) -> Self {
        let registry = Arc::new(registry);
        spawn_exit_listener(&supervisor, Arc::downgrade(&registry));
        Self {
            synth,
            writer,
            registry,
            supervisor,
            preprocess,
        }
    }

    /// Production wiring: HTTP synthesizer and manifest preprocessor.
    ///
    /// No process survives a daemon restart, so entries still flagged as
    /// deployed are cleared before the service is returned.
    pub async fn from_config(cfg: &DaemonConfig) -> ForgeResult<Self> {
        let synth = HttpSynthesizer::new(cfg.synth.clone())?;
        let registry = JsonRegistry::open(&cfg.registry_path).await?;
        let writer = ArtifactWriter::new(&cfg.artifacts_root, cfg.artifact_extension.as_str());
        let supervisor = Supervisor::new(&cfg.interpreter);
        let preprocess = PreprocessQueue::start(&cfg.preprocess, Arc::new(ManifestPreprocessor));

        let svc = Self::new(Arc::new(synth), writer, registry, supervisor, preprocess);
        let cleared = svc.reconcile_deployed().await?;
        if cleared > 0 {
            tracing::info!(cleared, "cleared stale deployed flags");
        }
        Ok(svc)
    }

    /// Writer used for artifact paths.
    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    /// Short synthesized result for review. Touches neither disk nor registry.
    pub async fn generate_preview(&self, spec: &WorkflowSpec) -> ForgeResult<String> {
        validate_spec(spec)?;
        self.synth.preview(spec).await
    }

    /// Synthesizes, persists and registers an artifact.
    ///
    /// The artifact only appears at its final path once its registry entry is
    /// durable; any failure before that leaves both untouched.
    pub async fn generate(&self, spec: &WorkflowSpec) -> ForgeResult<GenerateResponse> {
        validate_spec(spec)?;
        let text = self.synth.synthesize(spec).await?;

        let staged = self.writer.stage(&spec.name, &spec.version, &text).await?;
        let path = staged.target().display().to_string();
        let entry = RegistryEntry::for_spec(spec, path.clone(), now_ms());

        if let Err(e) = self.registry.append(entry.clone()).await {
            tracing::warn!(id = %entry.id, error = %e, "registry append failed, discarding artifact");
            staged.discard().await;
            return Err(e);
        }
        let published = staged.publish().await?;

        let preprocess_job = if spec.wants_batch_preprocess() {
            self.preprocess.submit(spec.clone(), published.clone()).await
        } else {
            None
        };

        tracing::info!(
            id = %entry.id,
            path = %published.display(),
            vault_refs = entry.vault_refs.len(),
            preprocess = preprocess_job.is_some(),
            "artifact generated"
        );

        Ok(GenerateResponse {
            path,
            registry_entry: entry,
            preprocess_job,
        })
    }

    /// Registry entries in append order.
    pub async fn list(&self) -> ForgeResult<Vec<RegistryEntry>> {
        self.registry.list_all().await
    }

    /// Starts the artifact and marks its registry entries deployed.
    ///
    /// `path` may be relative or go through `.` segments and symlinks; it is
    /// resolved before anything is spawned.
    pub async fn deploy(&self, path: &Path) -> ForgeResult<u32> {
        let path = tokio::fs::canonicalize(path)
            .await
            .map_err(|_| ForgeError::InvalidPath(path.to_path_buf()))?;
        let pid = self.supervisor.deploy(&path).await?;
        let key = path.display().to_string();
        self.mark_deployed(&key, true).await;
        // The exit listener may have run before the flag was set.
        if !self.path_still_running(&key).await {
            self.mark_deployed(&key, false).await;
        }
        Ok(pid)
    }

    /// Sends SIGTERM to a process started by [`ForgeService::deploy`].
    pub async fn stop(&self, pid: u32) -> ForgeResult<()> {
        let info = self.supervisor.stop(pid).await?;
        if !self.path_still_running(&info.path).await {
            self.mark_deployed(&info.path, false).await;
        }
        Ok(())
    }

    /// Log contents of the artifact generated for `(name, version)`.
    pub async fn read_log(&self, name: &str, version: &str) -> ForgeResult<String> {
        for (field, value) in [("name", name), ("version", version)] {
            if !is_safe_component(value) {
                return Err(ForgeError::Validation(format!(
                    "{field} must be a single path component, got {value:?}"
                )));
            }
        }
        self.supervisor.read_log(&self.writer.path_for(name, version)).await
    }

    /// Every process started by this daemon, ordered by pid.
    pub async fn processes(&self) -> Vec<ProcessInfo> {
        self.supervisor.list().await
    }

    /// Current state of a background preprocess job.
    pub async fn preprocess_status(&self, id: &str) -> ForgeResult<PreprocessJob> {
        self.preprocess
            .status(id)
            .await
            .ok_or_else(|| ForgeError::NotFound(format!("preprocess job {id}")))
    }

    /// Clears `deployed` on every entry whose artifact has no running process.
    /// Returns how many entries changed.
    pub async fn reconcile_deployed(&self) -> ForgeResult<usize> {
        reconcile_deployed(&self.supervisor, &self.registry).await
    }

    async fn path_still_running(&self, path: &str) -> bool {
        running_elsewhere(&self.supervisor, path).await
    }

    async fn mark_deployed(&self, path: &str, deployed: bool) {
        // The process outcome is already final; a stale flag is only logged.
        match self.registry.set_deployed(path, deployed).await {
            Ok(changed) => tracing::debug!(path, deployed, changed, "registry deployed flag"),
            Err(e) => tracing::warn!(path, deployed, error = %e, "failed to update deployed flag"),
        }
    }
}

async fn running_elsewhere(supervisor: &Supervisor, path: &str) -> bool {
    supervisor
        .list()
        .await
        .iter()
        .any(|p| p.path == path && p.state == ProcessState::Running)
}

async fn reconcile_deployed(supervisor: &Supervisor, registry: &JsonRegistry) -> ForgeResult<usize> {
    // Registry first: a deploy racing this scan is then either absent from the
    // flagged set or already visible as running.
    let flagged: BTreeSet<String> = registry
        .list_all()
        .await?
        .into_iter()
        .filter(|e| e.deployed)
        .map(|e| e.path)
        .collect();
    let running: HashSet<String> = supervisor
        .list()
        .await
        .into_iter()
        .filter(|p| p.state == ProcessState::Running)
        .map(|p| p.path)
        .collect();

    let mut cleared = 0;
    for path in flagged.iter().filter(|p| !running.contains(*p)) {
        cleared += registry.set_deployed(path, false).await?;
    }
    Ok(cleared)
}

/// Clears `deployed` when a process exits by itself. Ends once the registry
/// has been dropped.
fn spawn_exit_listener(supervisor: &Supervisor, registry: Weak<JsonRegistry>) {
    let mut events = supervisor.subscribe();
    let supervisor = supervisor.clone();
    tokio::spawn(async move {
        loop {
            let event = events.recv().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            let event = match event {
                Ok(ev) => ev,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "process events lagged, reconciling");
                    if let Err(e) = reconcile_deployed(&supervisor, &registry).await {
                        tracing::warn!(error = %e, "deployed flag reconcile failed");
                    }
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !matches!(event.state, ProcessState::Exited { .. }) {
                continue;
            }
            if running_elsewhere(&supervisor, &event.path).await {
                continue;
            }
            if let Err(e) = registry.set_deployed(&event.path, false).await {
                tracing::warn!(pid = event.pid, error = %e, "failed to clear deployed flag");
            }
        }
    });
}

/// Artifact path as received over the wire.
pub fn artifact_path(raw: &str) -> ForgeResult<PathBuf> {
    if raw.trim().is_empty() {
        return Err(ForgeError::Validation("path must not be empty".into()));
    }
    Ok(PathBuf::from(raw))
}
