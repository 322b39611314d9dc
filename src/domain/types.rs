//! Shared domain enumerations aligned with persisted column values.

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// What a queued task does to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    #[default]
    Create,
    Delete,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskAction::Create => "create",
            TaskAction::Delete => "delete",
        }
    }
}

impl TryFrom<&str> for TaskAction {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "create" => Ok(TaskAction::Create),
            "delete" => Ok(TaskAction::Delete),
            other => Err(DomainError::validation(format!("unknown task action `{other}`"))),
        }
    }
}

/// Lifecycle of a queue row: `queued -> processing -> {done, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Processing,
    Done,
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Processing => "processing",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

impl TryFrom<&str> for TaskState {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "queued" => Ok(TaskState::Queued),
            "processing" => Ok(TaskState::Processing),
            "done" => Ok(TaskState::Done),
            "failed" => Ok(TaskState::Failed),
            other => Err(DomainError::validation(format!("unknown task state `{other}`"))),
        }
    }
}

/// Sentinel stored in the `expire` column for entries that never expire by time.
pub const PERMANENT: i64 = -1;

/// Expiry of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expiry {
    /// Removed only by tag invalidation or explicit deletion.
    Permanent,
    /// Unix timestamp (seconds) after which the entry is stale.
    At(i64),
}

impl Expiry {
    pub fn from_column(value: i64) -> Self {
        if value == PERMANENT {
            Expiry::Permanent
        } else {
            Expiry::At(value)
        }
    }

    pub fn to_column(self) -> i64 {
        match self {
            Expiry::Permanent => PERMANENT,
            Expiry::At(timestamp) => timestamp,
        }
    }

    /// Whether the expiry has passed at `now`. An entry expiring exactly at
    /// `now` counts as expired.
    pub fn has_passed(self, now: i64) -> bool {
        match self {
            Expiry::Permanent => false,
            Expiry::At(timestamp) => timestamp <= now,
        }
    }
}
