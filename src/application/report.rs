//! Per-item outcomes of batch operations.

use std::fmt;
use std::time::Duration;

use crate::domain::types::TaskAction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Done,
    Failed { reason: String },
}

impl TaskOutcome {
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub path: String,
    pub action: TaskAction,
    pub outcome: TaskOutcome,
}

/// Aggregate of a batch run. Failures are data here, not errors.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub items: Vec<ItemOutcome>,
    /// Items the run decided not to touch (already cached).
    pub skipped: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn push(&mut self, path: impl Into<String>, action: TaskAction, outcome: TaskOutcome) {
        self.items.push(ItemOutcome {
            path: path.into(),
            action,
            outcome,
        });
    }

    pub fn done(&self) -> usize {
        self.items.iter().filter(|item| item.outcome.is_done()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.done()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|item| !item.outcome.is_done())
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.items.extend(other.items);
        self.skipped += other.skipped;
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} failed, {} skipped in {:.2}s",
            self.done(),
            self.failed(),
            self.skipped,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_summary() {
        let mut report = BatchReport::default();
        report.push("/a", TaskAction::Create, TaskOutcome::Done);
        report.push("/b", TaskAction::Delete, TaskOutcome::failed("boom"));
        report.skipped = 3;
        report.elapsed = Duration::from_millis(1500);

        assert_eq!(report.done(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures().next().map(|item| item.path.as_str()), Some("/b"));
        assert_eq!(report.to_string(), "1 done, 1 failed, 3 skipped in 1.50s");
    }
}
