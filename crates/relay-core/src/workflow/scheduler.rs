//! Scheduler: bridges cron triggers to the Executor.
//!
//! Built on `tokio-cron-scheduler`, with one job per workflow name. A
//! 5-field cron expression is normalized to `tokio-cron-scheduler`'s
//! 6-field form by prepending a `0` seconds field.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use relay_types::workflow::Trigger;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use super::definition::Loader;
use super::executor::Executor;
use super::journal::Journal;
use super::run_manager::RunManager;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler error: {0}")]
    JobError(String),
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
}

/// Normalizes a 5-field cron expression to the 6-field (with leading
/// seconds) form `tokio-cron-scheduler` expects. A 6-field expression
/// passes through unchanged.
fn normalize_cron(cron: &str) -> Result<String, SchedulerError> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {cron}")),
        6 => Ok(cron.to_string()),
        _ => Err(SchedulerError::InvalidCron(cron.to_string())),
    }
}

/// A registered job's introspection record.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub workflow_name: String,
    pub cron: String,
    pub next_fire: Option<DateTime<Utc>>,
}

struct RegisteredJob {
    job_id: Uuid,
    cron: String,
}

/// Cron registration + dispatch + hot-reload for scheduled workflows.
pub struct Scheduler {
    loader: Arc<Loader>,
    executor: Arc<Executor>,
    journal: Arc<Journal>,
    run_manager: RunManager,
    timezone: FixedOffset,
    retention_days: u32,
    inner: RwLock<Option<JobScheduler>>,
    jobs: RwLock<HashMap<String, RegisteredJob>>,
    retention_job_id: RwLock<Option<Uuid>>,
}

impl Scheduler {
    pub fn new(
        loader: Arc<Loader>,
        executor: Arc<Executor>,
        journal: Arc<Journal>,
        run_manager: RunManager,
        timezone: FixedOffset,
        retention_days: u32,
    ) -> Self {
        Self {
            loader,
            executor,
            journal,
            run_manager,
            timezone,
            retention_days,
            inner: RwLock::new(None),
            jobs: RwLock::new(HashMap::new()),
            retention_job_id: RwLock::new(None),
        }
    }

    /// Start the underlying job scheduler and register every enabled
    /// scheduled workflow plus the daily retention sweep. Idempotent.
    pub async fn start(&self) -> Result<usize, SchedulerError> {
        {
            let inner = self.inner.read().await;
            if inner.is_some() {
                return Ok(self.jobs.read().await.len());
            }
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        *self.inner.write().await = Some(scheduler);

        let count = self.register_all().await?;
        self.register_retention_job().await?;

        tracing::info!(registered = count, "scheduler started");
        Ok(count)
    }

    /// Stop the scheduler. Does not wait for in-flight runs -- the
    /// Executor's cooperative cancellation handles those. Idempotent.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().await;
        if let Some(scheduler) = inner.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| SchedulerError::JobError(e.to_string()))?;
            self.jobs.write().await.clear();
            *self.retention_job_id.write().await = None;
            tracing::info!("scheduler stopped");
        }
        Ok(())
    }

    /// Remove every workflow job and re-walk the workflow directory,
    /// re-registering all enabled `schedule` triggers. Returns the count
    /// of jobs re-registered. The retention job is left untouched.
    pub async fn reload(&self) -> Result<usize, SchedulerError> {
        let names: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        for name in names {
            self.unregister_job(&name).await?;
        }
        self.register_all().await
    }

    async fn register_all(&self) -> Result<usize, SchedulerError> {
        let mut count = 0;
        for info in self.loader.list() {
            if !info.is_valid || !info.enabled || info.trigger_type != "schedule" {
                continue;
            }
            let Ok(workflow) = self.loader.load(&info.name) else {
                tracing::warn!(workflow = info.name.as_str(), "failed to load workflow for scheduling");
                continue;
            };
            let Trigger::Schedule { cron } = &workflow.trigger else {
                continue;
            };
            match self.register_job(&info.name, cron).await {
                Ok(()) => count += 1,
                Err(e) => tracing::warn!(workflow = info.name.as_str(), error = %e, "invalid cron expression, skipped"),
            }
        }
        Ok(count)
    }

    async fn register_job(&self, workflow_name: &str, cron: &str) -> Result<(), SchedulerError> {
        self.unregister_job(workflow_name).await?;

        let normalized = normalize_cron(cron)?;
        let inner = self.inner.read().await;
        let scheduler = inner
            .as_ref()
            .ok_or_else(|| SchedulerError::JobError("scheduler not started".to_string()))?;

        let loader = self.loader.clone();
        let executor = self.executor.clone();
        let journal = self.journal.clone();
        let run_manager = self.run_manager.clone();
        let name = workflow_name.to_string();

        let job = Job::new_async_tz(normalized.as_str(), self.timezone, move |_uuid, _lock| {
            let loader = loader.clone();
            let executor = executor.clone();
            let journal = journal.clone();
            let run_manager = run_manager.clone();
            let name = name.clone();
            Box::pin(dispatch(loader, executor, journal, run_manager, name))
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let job_id = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        self.jobs.write().await.insert(
            workflow_name.to_string(),
            RegisteredJob { job_id, cron: cron.to_string() },
        );
        tracing::info!(workflow = workflow_name, cron, "workflow scheduled");
        Ok(())
    }

    async fn unregister_job(&self, workflow_name: &str) -> Result<(), SchedulerError> {
        let removed = self.jobs.write().await.remove(workflow_name);
        if let Some(job) = removed {
            let inner = self.inner.read().await;
            if let Some(scheduler) = inner.as_ref() {
                scheduler
                    .remove(&job.job_id)
                    .await
                    .map_err(|e| SchedulerError::JobError(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn register_retention_job(&self) -> Result<(), SchedulerError> {
        if self.retention_job_id.read().await.is_some() {
            return Ok(());
        }
        let inner = self.inner.read().await;
        let scheduler = inner
            .as_ref()
            .ok_or_else(|| SchedulerError::JobError("scheduler not started".to_string()))?;

        let journal = self.journal.clone();
        let retention_days = self.retention_days;
        // Fixed at 00:05 in the configured timezone, 6-field cron form.
        let job = Job::new_async_tz("0 5 0 * * *", self.timezone, move |_uuid, _lock| {
            let journal = journal.clone();
            Box::pin(async move {
                let report = journal.cleanup(retention_days);
                tracing::info!(deleted = report.deleted_count, kept = report.kept_count, "journal retention swept");
            })
        })
        .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        let job_id = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        *self.retention_job_id.write().await = Some(job_id);
        Ok(())
    }

    /// Registered job handles with next fire time, where known.
    pub async fn jobs(&self) -> Vec<JobHandle> {
        let inner = self.inner.read().await;
        let jobs = self.jobs.read().await;
        let mut handles = Vec::with_capacity(jobs.len());
        for (name, job) in jobs.iter() {
            let next_fire = match inner.as_ref() {
                Some(scheduler) => scheduler.next_tick_for_job(job.job_id).await.ok().flatten(),
                None => None,
            };
            handles.push(JobHandle {
                workflow_name: name.clone(),
                cron: job.cron.clone(),
                next_fire,
            });
        }
        handles.sort_by(|a, b| a.workflow_name.cmp(&b.workflow_name));
        handles
    }

    /// The next `n` firing times of `cron`, in the configured timezone.
    /// Used by the editor to show a schedule hint.
    pub fn preview(&self, cron: &str, n: usize) -> Result<Vec<DateTime<FixedOffset>>, SchedulerError> {
        let parsed: croner::Cron = cron
            .parse()
            .map_err(|e: croner::errors::CronError| SchedulerError::InvalidCron(e.to_string()))?;
        let now = Utc::now().with_timezone(&self.timezone);
        Ok(parsed.iter_after(now.with_timezone(&Utc)).take(n).map(|t| t.with_timezone(&self.timezone)).collect())
    }
}

/// Scheduler dispatch callback: reload the definition, run it under Run
/// Manager arbitration, persist the result. Never propagates -- a failure
/// here is logged and the schedule stays registered.
async fn dispatch(loader: Arc<Loader>, executor: Arc<Executor>, journal: Arc<Journal>, run_manager: RunManager, workflow_name: String) {
    tracing::info!(workflow = workflow_name.as_str(), "scheduler firing");

    let workflow = match loader.load(&workflow_name) {
        Ok(wf) => wf,
        Err(e) => {
            tracing::error!(workflow = workflow_name.as_str(), error = %e, "scheduled run: failed to load workflow");
            return;
        }
    };

    let Some(cancel) = run_manager.register(&workflow_name).await else {
        tracing::info!(workflow = workflow_name.as_str(), "scheduled run skipped: already running");
        return;
    };

    let run_log = executor.run(&workflow, cancel).await;
    run_manager.unregister(&workflow_name).await;

    if let Err(e) = journal.save(&run_log) {
        tracing::error!(workflow = workflow_name.as_str(), error = %e, "failed to persist scheduled run log");
    }
    tracing::info!(workflow = workflow_name.as_str(), status = ?run_log.status, "scheduled run finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_5field_prepends_seconds() {
        assert_eq!(normalize_cron("*/5 * * * *").unwrap(), "0 */5 * * * *");
    }

    #[test]
    fn normalize_6field_passes_through() {
        assert_eq!(normalize_cron("30 */5 * * * *").unwrap(), "30 */5 * * * *");
    }

    #[test]
    fn normalize_rejects_wrong_field_count() {
        assert!(normalize_cron("* * *").is_err());
    }

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn scheduler_for(dir: &std::path::Path) -> Scheduler {
        let loader = Arc::new(Loader::new(dir.join("workflows"), "yaml", "yml"));
        let executor = Arc::new(Executor::new(
            super::super::registry::ActionRegistry::new(),
            dir.to_path_buf(),
            std::time::Duration::from_secs(300),
            jst(),
        ));
        let journal = Arc::new(Journal::new(dir.join("runs"), "jsonl", jst()));
        Scheduler::new(loader, executor, journal, RunManager::new(), jst(), 30)
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(dir.path());
        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap();
        scheduler.stop().await.unwrap();
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn register_all_skips_invalid_and_manual_workflows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("workflows")).unwrap();
        std::fs::write(
            dir.path().join("workflows/scheduled.yaml"),
            "name: scheduled\ntrigger:\n  type: schedule\n  cron: \"*/5 * * * *\"\nsteps:\n  - id: a\n    type: log\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("workflows/manual.yaml"),
            "name: manual\ntrigger:\n  type: manual\nsteps:\n  - id: a\n    type: log\n",
        )
        .unwrap();

        let scheduler = scheduler_for(dir.path());
        let count = scheduler.start().await.unwrap();
        assert_eq!(count, 1);

        let jobs = scheduler.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].workflow_name, "scheduled");
    }

    #[tokio::test]
    async fn preview_returns_n_upcoming_fire_times() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(dir.path());
        let times = scheduler.preview("*/5 * * * *", 3).unwrap();
        assert_eq!(times.len(), 3);
        assert!(times[0] < times[1]);
        assert!(times[1] < times[2]);
    }
}
