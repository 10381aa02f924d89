use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use super::pipeline::{spawn_training, PipelineOptions, RunReport};
use crate::config::AppConfig;
use crate::error::{ForecastError, Result};
use crate::rates::{fetch_and_store, RateSource};
use crate::storage::ArtifactPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    Fetch,
    Train { clean_slate: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Succeeded => write!(f, "Succeeded"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: JobKind,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    Fetch {
        rows: usize,
        first_date: Option<NaiveDate>,
        last_date: Option<NaiveDate>,
    },
    Train(RunReport),
}

impl JobResult {
    fn summary(&self) -> String {
        match self {
            JobResult::Fetch { rows, last_date, .. } => match last_date {
                Some(last) => format!("{} rows up to {}", rows, last),
                None => format!("{} rows", rows),
            },
            JobResult::Train(report) => format!(
                "{} persisted, {} skipped, {} failed",
                report.persisted_count(),
                report.skipped_count(),
                report.failed_count()
            ),
        }
    }
}

struct JobEntry {
    record: JobRecord,
    result: Option<JobResult>,
}

/// Finished jobs kept for polling; older ones are forgotten
const RETAINED_JOBS: usize = 50;

#[derive(Default)]
struct JobRegistry {
    jobs: HashMap<Uuid, JobEntry>,
    order: Vec<Uuid>,
    active: Option<Uuid>,
}

impl JobRegistry {
    /// Drop the oldest finished jobs until at most `keep` remain. The active job is never dropped.
    fn prune(&mut self, keep: usize) {
        let excess = self.order.len().saturating_sub(keep);
        if excess == 0 {
            return;
        }
        let mut dropped = 0;
        let active = self.active;
        let jobs = &mut self.jobs;
        self.order.retain(|id| {
            if dropped < excess && Some(*id) != active {
                jobs.remove(id);
                dropped += 1;
                false
            } else {
                true
            }
        });
    }
}

/// Runs fetch and training jobs in the background, one at a time
pub struct JobManager {
    config: AppConfig,
    paths: ArtifactPaths,
    source: Arc<dyn RateSource>,
    registry: RwLock<JobRegistry>,
    status_tx: broadcast::Sender<JobRecord>,
}

impl JobManager {
    pub fn new(config: AppConfig, paths: ArtifactPaths, source: Arc<dyn RateSource>) -> Self {
        let (status_tx, _) = broadcast::channel(32);
        Self {
            config,
            paths,
            source,
            registry: RwLock::new(JobRegistry::default()),
            status_tx,
        }
    }

    /// Queue a job. Fails with `JobBusy` while another job is queued or running.
    pub async fn submit(self: &Arc<Self>, kind: JobKind) -> Result<JobRecord> {
        let record = {
            let mut registry = self.registry.write().await;
            if let Some(active) = registry.active {
                return Err(ForecastError::JobBusy(active));
            }

            let record = JobRecord {
                id: Uuid::new_v4(),
                kind,
                status: JobStatus::Queued,
                submitted_at: Utc::now(),
                started_at: None,
                finished_at: None,
                summary: None,
                error: None,
            };
            registry.active = Some(record.id);
            registry.order.push(record.id);
            registry.jobs.insert(
                record.id,
                JobEntry {
                    record: record.clone(),
                    result: None,
                },
            );
            registry.prune(RETAINED_JOBS);
            record
        };

        info!("Job {} queued: {:?}", record.id, kind);
        let _ = self.status_tx.send(record.clone());

        let manager = Arc::clone(self);
        let id = record.id;
        tokio::spawn(async move {
            manager.execute(id, kind).await;
        });

        Ok(record)
    }

    async fn execute(&self, id: Uuid, kind: JobKind) {
        self.update(id, |entry| {
            entry.record.status = JobStatus::Running;
            entry.record.started_at = Some(Utc::now());
        })
        .await;

        let outcome = match kind {
            JobKind::Fetch => self.run_fetch().await,
            JobKind::Train { clean_slate } => self.run_train(clean_slate).await,
        };

        // finish the record and free the active slot under one lock
        let record = {
            let mut registry = self.registry.write().await;
            if registry.active == Some(id) {
                registry.active = None;
            }
            registry.jobs.get_mut(&id).map(|entry| {
                entry.record.finished_at = Some(Utc::now());
                match outcome {
                    Ok(result) => {
                        entry.record.status = JobStatus::Succeeded;
                        entry.record.summary = Some(result.summary());
                        entry.result = Some(result);
                    }
                    Err(e) => {
                        entry.record.status = JobStatus::Failed;
                        entry.record.error = Some(e.to_string());
                    }
                }
                entry.record.clone()
            })
        };

        if let Some(record) = record {
            let _ = self.status_tx.send(record.clone());
            match record.status {
                JobStatus::Failed => error!(
                    "Job {} failed: {}",
                    id,
                    record.error.as_deref().unwrap_or_default()
                ),
                _ => info!(
                    "Job {} finished: {}",
                    id,
                    record.summary.as_deref().unwrap_or_default()
                ),
            }
        }
    }

    async fn run_fetch(&self) -> Result<JobResult> {
        let today = Local::now().date_naive();
        let series = fetch_and_store(self.source.as_ref(), &self.config, &self.paths, today).await?;
        Ok(JobResult::Fetch {
            rows: series.len(),
            first_date: series.first_date(),
            last_date: series.last_date(),
        })
    }

    async fn run_train(&self, clean_slate: bool) -> Result<JobResult> {
        let options = PipelineOptions { clean_slate };
        let rx = spawn_training(self.config.clone(), self.paths.clone(), options)?;
        let report = rx.await.map_err(|_| ForecastError::TrainingAborted)??;
        Ok(JobResult::Train(report))
    }

    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut JobEntry)) -> Option<JobRecord> {
        let record = {
            let mut registry = self.registry.write().await;
            let entry = registry.jobs.get_mut(&id)?;
            apply(entry);
            entry.record.clone()
        };
        let _ = self.status_tx.send(record.clone());
        Some(record)
    }

    pub async fn status(&self, id: Uuid) -> Result<JobRecord> {
        let registry = self.registry.read().await;
        registry
            .jobs
            .get(&id)
            .map(|entry| entry.record.clone())
            .ok_or(ForecastError::JobNotFound(id))
    }

    /// Record and result of a job; the result is `None` until it has succeeded
    pub async fn result(&self, id: Uuid) -> Result<(JobRecord, Option<JobResult>)> {
        let registry = self.registry.read().await;
        registry
            .jobs
            .get(&id)
            .map(|entry| (entry.record.clone(), entry.result.clone()))
            .ok_or(ForecastError::JobNotFound(id))
    }

    /// Every job, newest first
    pub async fn list(&self) -> Vec<JobRecord> {
        let registry = self.registry.read().await;
        registry
            .order
            .iter()
            .rev()
            .filter_map(|id| registry.jobs.get(id).map(|entry| entry.record.clone()))
            .collect()
    }

    pub async fn active(&self) -> Option<Uuid> {
        self.registry.read().await.active
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobRecord> {
        self.status_tx.subscribe()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }
}
