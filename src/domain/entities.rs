//! Domain entities mirrored from persistent storage.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::{Expiry, TaskAction, TaskState};

/// One indexed static artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub cache_id: String,
    pub file_location: PathBuf,
    pub expiry: Expiry,
    pub tags: BTreeSet<String>,
    /// Tag checksum captured when the entry was written.
    pub checksum: String,
    /// Bumped on every overwrite of the row; lets the sweeper delete only the
    /// revision it inspected.
    pub generation: i64,
    pub created_at: OffsetDateTime,
}

/// Cache metadata reported by a render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetadata {
    /// Declared expiry as a Unix timestamp, if the response carried one.
    pub expires: Option<i64>,
    pub tags: BTreeSet<String>,
}

impl CacheMetadata {
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expires: None,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

/// A unit of regeneration work, built the same way by every caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationTask {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_path: Option<String>,
    #[serde(default)]
    pub action: TaskAction,
}

impl RegenerationTask {
    pub fn create(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            generate_path: None,
            action: TaskAction::Create,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            generate_path: None,
            action: TaskAction::Delete,
        }
    }

    pub fn with_generate_path(mut self, generate_path: impl Into<String>) -> Self {
        self.generate_path = Some(generate_path.into());
        self
    }

    /// Path handed to the resolver; an empty alternate falls back to `path`.
    pub fn render_path(&self) -> &str {
        match self.generate_path.as_deref() {
            Some(alternate) if !alternate.trim().is_empty() => alternate,
            _ => &self.path,
        }
    }
}

/// A persisted queue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub id: i64,
    pub task: RegenerationTask,
    pub state: TaskState,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub lock_by: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_path_falls_back_to_path_when_alternate_is_blank() {
        let task = RegenerationTask::create("/about").with_generate_path("  ");
        assert_eq!(task.render_path(), "/about");

        let task = RegenerationTask::create("/about").with_generate_path("/node/1");
        assert_eq!(task.render_path(), "/node/1");
    }

    #[test]
    fn task_payload_defaults_to_create() {
        let task: RegenerationTask =
            serde_json::from_str(r#"{"path":"/node/5"}"#).expect("valid payload");
        assert_eq!(task, RegenerationTask::create("/node/5"));
    }
}
