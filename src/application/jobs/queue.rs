use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::{
    application::repos::{QueueRepo, RepoError},
    domain::{entities::RegenerationTask, types::TaskState},
};

/// Append a task to the durable queue, returning its row id.
///
/// Paths are trimmed and a blank alternate render path is dropped, so every
/// caller stores the same shape.
pub async fn enqueue_task<Q>(repo: &Q, task: RegenerationTask) -> Result<i64, RepoError>
where
    Q: QueueRepo + ?Sized,
{
    let task = normalize_task(task)?;
    let id = repo.push_task(&task).await?;
    debug!(
        target = "static_regen::application::jobs::enqueue_task",
        task_id = id,
        path = %task.path,
        action = task.action.as_str(),
        "task enqueued"
    );
    Ok(id)
}

fn normalize_task(task: RegenerationTask) -> Result<RegenerationTask, RepoError> {
    let path = task.path.trim().to_string();
    if !path.starts_with('/') {
        return Err(RepoError::InvalidInput {
            message: format!("task path `{}` must start with `/`", task.path),
        });
    }

    let generate_path = task
        .generate_path
        .map(|alternate| alternate.trim().to_string())
        .filter(|alternate| !alternate.is_empty());

    Ok(RegenerationTask {
        path,
        generate_path,
        action: task.action,
    })
}

/// Row counts per queue state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub queued: u64,
    pub processing: u64,
    pub done: u64,
    pub failed: u64,
}

impl QueueStatus {
    pub fn from_counts(counts: &HashMap<TaskState, u64>) -> Self {
        let get = |state| counts.get(&state).copied().unwrap_or(0);
        Self {
            queued: get(TaskState::Queued),
            processing: get(TaskState::Processing),
            done: get(TaskState::Done),
            failed: get(TaskState::Failed),
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queued={} processing={} done={} failed={}",
            self.queued, self.processing, self.done, self.failed
        )
    }
}

pub async fn queue_status<Q>(repo: &Q) -> Result<QueueStatus, RepoError>
where
    Q: QueueRepo + ?Sized,
{
    Ok(QueueStatus::from_counts(&repo.count_by_state().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_drops_blank_alternate() {
        let task = normalize_task(RegenerationTask::create(" /about ").with_generate_path(" "))
            .unwrap();
        assert_eq!(task.path, "/about");
        assert_eq!(task.generate_path, None);
    }

    #[test]
    fn normalize_rejects_relative_paths() {
        assert!(matches!(
            normalize_task(RegenerationTask::delete("about")),
            Err(RepoError::InvalidInput { .. })
        ));
    }

    #[test]
    fn status_defaults_missing_states_to_zero() {
        let counts = HashMap::from([(TaskState::Queued, 3), (TaskState::Failed, 1)]);
        let status = QueueStatus::from_counts(&counts);
        assert_eq!(status.queued, 3);
        assert_eq!(status.processing, 0);
        assert_eq!(status.to_string(), "queued=3 processing=0 done=0 failed=1");
    }
}
