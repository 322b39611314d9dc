//! Queue draining.
//!
//! Each worker claims the oldest queued row, runs it, and records a terminal
//! state. A task that fails is logged and marked `failed`; the worker moves on.
//! Only an unusable queue or index stops the drain.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        generator::{GenerateError, GenerateOptions, StaticGenerator},
        report::{BatchReport, TaskOutcome},
        repos::{QueueRepo, RepoError},
    },
    domain::{
        entities::QueuedTask,
        types::{TaskAction, TaskState},
    },
};

const METRIC_TASK_TOTAL: &str = "static_regen_task_total";
const METRIC_QUEUE_DRAIN_MS: &str = "static_regen_queue_drain_ms";

pub struct QueueWorkerPool {
    repo: Arc<dyn QueueRepo>,
    generator: Arc<StaticGenerator>,
    workers: NonZeroUsize,
    stale_after: Duration,
}

impl QueueWorkerPool {
    pub fn new(
        repo: Arc<dyn QueueRepo>,
        generator: Arc<StaticGenerator>,
        workers: NonZeroUsize,
        stale_after: Duration,
    ) -> Self {
        Self {
            repo,
            generator,
            workers,
            stale_after,
        }
    }

    /// Drain the queue with the configured number of concurrent workers.
    ///
    /// Rows left `processing` by a crashed worker for longer than the stale
    /// window are returned to `queued` first.
    pub async fn process_all(&self) -> Result<BatchReport, RepoError> {
        let started = Instant::now();

        let cutoff = OffsetDateTime::now_utc() - self.stale_after;
        let released = self.repo.release_stale(cutoff).await?;
        if released > 0 {
            warn!(
                target = "static_regen::application::jobs::worker",
                released, "requeued stale claims"
            );
        }

        let reports = try_join_all((0..self.workers.get()).map(|_| self.run_worker())).await?;

        let mut report = BatchReport::default();
        for partial in reports {
            report.merge(partial);
        }
        report.elapsed = started.elapsed();

        histogram!(METRIC_QUEUE_DRAIN_MS).record(report.elapsed.as_secs_f64() * 1000.0);
        info!(
            target = "static_regen::application::jobs::worker",
            workers = self.workers.get(),
            done = report.done(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "queue drained"
        );
        Ok(report)
    }

    async fn run_worker(&self) -> Result<BatchReport, RepoError> {
        let worker_id = Uuid::new_v4().to_string();
        let mut report = BatchReport::default();

        while let Some(claimed) = self.repo.claim_next(&worker_id).await? {
            let outcome = self.process_task(&claimed).await?;
            report.push(claimed.task.path.clone(), claimed.task.action, outcome);
        }

        Ok(report)
    }

    async fn process_task(&self, claimed: &QueuedTask) -> Result<TaskOutcome, RepoError> {
        let task = &claimed.task;
        let result = match task.action {
            TaskAction::Delete => self.generator.delete_page(&task.path).await.map(|_| ()),
            TaskAction::Create => self
                .generator
                .generate_page(
                    &task.path,
                    GenerateOptions::systematic(task.generate_path.clone()),
                )
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => {
                self.repo
                    .finish_task(claimed.id, TaskState::Done, None)
                    .await?;
                counter!(METRIC_TASK_TOTAL, "outcome" => "done").increment(1);
                Ok(TaskOutcome::Done)
            }
            Err(GenerateError::Repo(err)) => {
                let reason = err.to_string();
                if let Err(finish_err) = self
                    .repo
                    .finish_task(claimed.id, TaskState::Failed, Some(&reason))
                    .await
                {
                    warn!(
                        target = "static_regen::application::jobs::worker",
                        task_id = claimed.id,
                        error = %finish_err,
                        "could not record failure; row will be requeued as stale"
                    );
                }
                counter!(METRIC_TASK_TOTAL, "outcome" => "failed").increment(1);
                Err(err)
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(
                    target = "static_regen::application::jobs::worker",
                    task_id = claimed.id,
                    path = %task.path,
                    action = task.action.as_str(),
                    error = %reason,
                    "task failed"
                );
                self.repo
                    .finish_task(claimed.id, TaskState::Failed, Some(&reason))
                    .await?;
                counter!(METRIC_TASK_TOTAL, "outcome" => "failed").increment(1);
                Ok(TaskOutcome::Failed { reason })
            }
        }
    }
}
