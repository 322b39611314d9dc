use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;
use time::OffsetDateTime;

use crate::{
    application::repos::{QueueRepo, RepoError},
    domain::{
        entities::{QueuedTask, RegenerationTask},
        types::{TaskAction, TaskState},
    },
};

use super::{SqliteRepositories, map_sqlx_error, now_unix, timestamp_from_column};

const TASK_COLUMNS: &str =
    "id, path, generate_path, action, state, attempts, last_error, lock_by, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: i64,
    path: String,
    generate_path: Option<String>,
    action: String,
    state: String,
    attempts: i64,
    last_error: Option<String>,
    lock_by: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<QueueRow> for QueuedTask {
    type Error = RepoError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let action = TaskAction::try_from(row.action.as_str()).map_err(|err| RepoError::Integrity {
            message: format!("queue row {}: {err}", row.id),
        })?;
        let state = TaskState::try_from(row.state.as_str()).map_err(|err| RepoError::Integrity {
            message: format!("queue row {}: {err}", row.id),
        })?;

        Ok(Self {
            id: row.id,
            task: RegenerationTask {
                path: row.path,
                generate_path: row.generate_path,
                action,
            },
            state,
            attempts: row.attempts,
            last_error: row.last_error,
            lock_by: row.lock_by,
            created_at: timestamp_from_column(row.created_at)?,
            updated_at: timestamp_from_column(row.updated_at)?,
        })
    }
}

/// Runs the claim inside `BEGIN IMMEDIATE` so the write lock is held before
/// the oldest row is read; two claimers can never see the same row queued.
async fn claim_in_immediate_tx(
    conn: &mut PoolConnection<Sqlite>,
    worker: &str,
    now: i64,
) -> Result<Option<QueueRow>, sqlx::Error> {
    sqlx::query("BEGIN IMMEDIATE").execute(&mut **conn).await?;

    let claimed = sqlx::query_as::<_, QueueRow>(&format!(
        r#"
        UPDATE regeneration_queue
        SET state = 'processing', lock_by = ?, locked_at = ?, attempts = attempts + 1, updated_at = ?
        WHERE id = (
            SELECT id FROM regeneration_queue
            WHERE state = 'queued'
            ORDER BY id
            LIMIT 1
        )
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(worker)
    .bind(now)
    .bind(now)
    .fetch_optional(&mut **conn)
    .await;

    let outcome = match claimed {
        Ok(row) => sqlx::query("COMMIT").execute(&mut **conn).await.map(|_| row),
        Err(err) => Err(err),
    };

    if outcome.is_err() {
        let _ = sqlx::query("ROLLBACK").execute(&mut **conn).await;
    }
    outcome
}

#[async_trait]
impl QueueRepo for SqliteRepositories {
    async fn push_task(&self, task: &RegenerationTask) -> Result<i64, RepoError> {
        let now = now_unix();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO regeneration_queue (path, generate_path, action, state, created_at, updated_at)
            VALUES (?, ?, ?, 'queued', ?, ?)
            RETURNING id
            "#,
        )
        .bind(&task.path)
        .bind(task.generate_path.as_deref())
        .bind(task.action.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn claim_next(&self, worker: &str) -> Result<Option<QueuedTask>, RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        let row = claim_in_immediate_tx(&mut conn, worker, now_unix())
            .await
            .map_err(map_sqlx_error)?;

        row.map(QueuedTask::try_from).transpose()
    }

    async fn finish_task(
        &self,
        id: i64,
        state: TaskState,
        last_error: Option<&str>,
    ) -> Result<(), RepoError> {
        if !state.is_terminal() {
            return Err(RepoError::InvalidInput {
                message: format!("`{}` is not a terminal task state", state.as_str()),
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE regeneration_queue
            SET state = ?, last_error = ?, lock_by = NULL, locked_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(state.as_str())
        .bind(last_error)
        .bind(now_unix())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn release_stale(&self, claimed_before: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE regeneration_queue
            SET state = 'queued', lock_by = NULL, locked_at = NULL, updated_at = ?
            WHERE state = 'processing' AND locked_at < ?
            "#,
        )
        .bind(now_unix())
        .bind(claimed_before.unix_timestamp())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn find_task(&self, id: i64) -> Result<Option<QueuedTask>, RepoError> {
        let row: Option<QueueRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM regeneration_queue WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(QueuedTask::try_from).transpose()
    }

    async fn count_by_state(&self) -> Result<HashMap<TaskState, u64>, RepoError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM regeneration_queue GROUP BY state")
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        let mut counts = HashMap::new();
        for (state, count) in rows {
            let state = TaskState::try_from(state.as_str()).map_err(|err| RepoError::Integrity {
                message: err.to_string(),
            })?;
            counts.insert(state, Self::convert_count(count)?);
        }
        Ok(counts)
    }

    async fn purge_finished(&self) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM regeneration_queue WHERE state IN ('done', 'failed')")
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
