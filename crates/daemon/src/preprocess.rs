//! Background batch preprocessing.
//!
//! Jobs go through a bounded channel to a fixed set of workers. Submitting never
//! waits: a full queue drops the job. Outcomes are recorded per job id and are
//! never reported back to the request that queued them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mcpforge_core::model::{JobStatus, PreprocessJob, WorkflowSpec};
use mcpforge_core::{new_ulid, now_ms};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};

use crate::config::PreprocessConfig;

/// Finished jobs beyond this count are forgotten, oldest first.
const MAX_TRACKED_JOBS: usize = 1024;

/// Work done for a spec whose tools request batch preprocessing.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// Prepares data for the artifact generated from `spec`.
    async fn preprocess(&self, spec: &WorkflowSpec, artifact: &Path) -> anyhow::Result<()>;
}

/// Writes `preprocess.json` beside the artifact, listing the tools flagged for
/// batch preprocessing.
pub struct ManifestPreprocessor;

#[async_trait]
impl Preprocessor for ManifestPreprocessor {
    async fn preprocess(&self, spec: &WorkflowSpec, artifact: &Path) -> anyhow::Result<()> {
        let dir = artifact
            .parent()
            .ok_or_else(|| anyhow::anyhow!("artifact {} has no parent dir", artifact.display()))?;

        let tools: Vec<_> = spec.tools.iter().filter(|t| t.batch_preprocess).collect();
        let manifest = json!({
            "spec_id": spec.registry_id(),
            "artifact": artifact.display().to_string(),
            "tools": tools,
            "prepared_at_ms": now_ms(),
        });

        tokio::fs::write(dir.join("preprocess.json"), serde_json::to_vec_pretty(&manifest)?).await?;
        Ok(())
    }
}

struct Job {
    id: String,
    spec: WorkflowSpec,
    artifact: PathBuf,
}

type JobTable = Arc<Mutex<HashMap<String, PreprocessJob>>>;

/// Bounded queue of preprocess jobs with observable status.
#[derive(Clone)]
pub struct PreprocessQueue {
    tx: mpsc::Sender<Job>,
    jobs: JobTable,
}

impl PreprocessQueue {
    /// Spawns `cfg.workers` workers. Must be called inside a tokio runtime.
    pub fn start(cfg: &PreprocessConfig, preprocessor: Arc<dyn Preprocessor>) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(cfg.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let jobs: JobTable = Arc::new(Mutex::new(HashMap::new()));

        for worker in 0..cfg.workers.max(1) {
            let rx = Arc::clone(&rx);
            let jobs = Arc::clone(&jobs);
            let preprocessor = Arc::clone(&preprocessor);
            tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    let Some(job) = next else {
                        tracing::debug!(worker, "preprocess queue closed");
                        break;
                    };
                    run_job(worker, job, preprocessor.as_ref(), &jobs).await;
                }
            });
        }

        Self { tx, jobs }
    }

    /// Queues a job. Returns its id, or `None` when the queue is full.
    pub async fn submit(&self, spec: WorkflowSpec, artifact: PathBuf) -> Option<String> {
        let id = new_ulid().to_string();
        let record = PreprocessJob {
            id: id.clone(),
            spec_id: spec.registry_id(),
            status: JobStatus::Queued,
            queued_at_ms: now_ms(),
            finished_at_ms: None,
        };

        {
            let mut jobs = self.jobs.lock().await;
            prune_finished(&mut jobs);
            jobs.insert(id.clone(), record);
        }

        let job = Job {
            id: id.clone(),
            spec,
            artifact,
        };
        if let Err(e) = self.tx.try_send(job) {
            tracing::warn!(job_id = %id, error = %e, "preprocess job dropped");
            self.jobs.lock().await.remove(&id);
            return None;
        }

        tracing::debug!(job_id = %id, "preprocess job queued");
        Some(id)
    }

    /// Recorded state of job `id`, if it is still tracked.
    pub async fn status(&self, id: &str) -> Option<PreprocessJob> {
        self.jobs.lock().await.get(id).cloned()
    }

    /// Polls until the job reaches a terminal state or `timeout` elapses.
    #[cfg(test)]
    async fn wait_finished(&self, id: &str, timeout: std::time::Duration) -> Option<PreprocessJob> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.status(id).await?;
            if is_finished(&job.status) || tokio::time::Instant::now() >= deadline {
                return Some(job);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

async fn run_job(worker: usize, job: Job, preprocessor: &dyn Preprocessor, jobs: &JobTable) {
    set_status(jobs, &job.id, JobStatus::Running).await;

    let status = match preprocessor.preprocess(&job.spec, &job.artifact).await {
        Ok(()) => {
            tracing::info!(worker, job_id = %job.id, spec = %job.spec.registry_id(), "preprocess done");
            JobStatus::Succeeded
        }
        Err(e) => {
            tracing::warn!(worker, job_id = %job.id, error = %e, "preprocess failed");
            JobStatus::Failed {
                error: format!("{e:#}"),
            }
        }
    };

    set_status(jobs, &job.id, status).await;
}

async fn set_status(jobs: &JobTable, id: &str, status: JobStatus) {
    let mut jobs = jobs.lock().await;
    if let Some(job) = jobs.get_mut(id) {
        if is_finished(&status) {
            job.finished_at_ms = Some(now_ms());
        }
        job.status = status;
    }
}

fn is_finished(status: &JobStatus) -> bool {
    matches!(status, JobStatus::Succeeded | JobStatus::Failed { .. })
}

fn prune_finished(jobs: &mut HashMap<String, PreprocessJob>) {
    if jobs.len() < MAX_TRACKED_JOBS {
        return;
    }
    let mut finished: Vec<(i64, String)> = jobs
        .values()
        .filter(|j| is_finished(&j.status))
        .map(|j| (j.queued_at_ms, j.id.clone()))
        .collect();
    finished.sort();
    let excess = jobs.len() + 1 - MAX_TRACKED_JOBS;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
