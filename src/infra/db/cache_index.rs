use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    application::repos::{CacheIndexRepo, EntryRevision, NewCacheEntry, RepoError},
    domain::{entities::CacheEntry, types::Expiry},
};

use super::{BIND_CHUNK, SqliteRepositories, map_sqlx_error, timestamp_from_column};

const ENTRY_COLUMNS: &str = "cid, file_location, expire, tags, checksum, generation, created_at";

#[derive(sqlx::FromRow)]
struct CacheEntryRow {
    cid: String,
    file_location: String,
    expire: i64,
    tags: String,
    checksum: String,
    generation: i64,
    created_at: i64,
}

impl TryFrom<CacheEntryRow> for CacheEntry {
    type Error = RepoError;

    fn try_from(row: CacheEntryRow) -> Result<Self, Self::Error> {
        let tags = decode_tags(&row.cid, &row.tags)?;
        Ok(Self {
            cache_id: row.cid,
            file_location: PathBuf::from(row.file_location),
            expiry: Expiry::from_column(row.expire),
            tags,
            checksum: row.checksum,
            generation: row.generation,
            created_at: timestamp_from_column(row.created_at)?,
        })
    }
}

/// Tags are opaque strings, stored as a JSON array.
fn encode_tags(tags: &BTreeSet<String>) -> Result<String, RepoError> {
    serde_json::to_string(tags).map_err(|err| RepoError::InvalidInput {
        message: format!("cache tags cannot be encoded: {err}"),
    })
}

fn decode_tags(cache_id: &str, raw: &str) -> Result<BTreeSet<String>, RepoError> {
    serde_json::from_str(raw).map_err(|err| RepoError::Integrity {
        message: format!("cache entry `{cache_id}` has malformed tags: {err}"),
    })
}

fn location_column(location: &Path) -> Result<String, RepoError> {
    location
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| RepoError::InvalidInput {
            message: format!("artifact location `{}` is not UTF-8", location.display()),
        })
}

const UPSERT_ENTRY: &str = r#"
    INSERT INTO cache_entries (cid, file_location, expire, tags, checksum, generation, created_at)
    VALUES (?, ?, ?, ?, ?, 1, ?)
    ON CONFLICT (cid) DO UPDATE SET
        file_location = excluded.file_location,
        expire = excluded.expire,
        tags = excluded.tags,
        checksum = excluded.checksum,
        generation = cache_entries.generation + 1,
        created_at = excluded.created_at
"#;

/// Same as [`UPSERT_ENTRY`], but an existing row that points at a different
/// file is left alone.
const UPSERT_ALIAS_ENTRY: &str = r#"
    INSERT INTO cache_entries (cid, file_location, expire, tags, checksum, generation, created_at)
    VALUES (?, ?, ?, ?, ?, 1, ?)
    ON CONFLICT (cid) DO UPDATE SET
        expire = excluded.expire,
        tags = excluded.tags,
        checksum = excluded.checksum,
        generation = cache_entries.generation + 1,
        created_at = excluded.created_at
    WHERE cache_entries.file_location = excluded.file_location
"#;

async fn write_entry(
    repos: &SqliteRepositories,
    entry: &NewCacheEntry,
    statement: &str,
) -> Result<u64, RepoError> {
    let location = location_column(&entry.file_location)?;

    let result = sqlx::query(statement)
        .bind(&entry.cache_id)
        .bind(location)
        .bind(entry.expiry.to_column())
        .bind(encode_tags(&entry.tags)?)
        .bind(&entry.checksum)
        .bind(entry.created_at.unix_timestamp())
        .execute(repos.pool())
        .await
        .map_err(map_sqlx_error)?;

    Ok(result.rows_affected())
}

#[async_trait]
impl CacheIndexRepo for SqliteRepositories {
    async fn fetch_entries(&self, cache_ids: &[String]) -> Result<Vec<CacheEntry>, RepoError> {
        let mut entries = Vec::with_capacity(cache_ids.len());

        for chunk in cache_ids.chunks(BIND_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
            qb.push(ENTRY_COLUMNS);
            qb.push(" FROM cache_entries WHERE cid IN (");
            let mut separated = qb.separated(", ");
            for cache_id in chunk {
                separated.push_bind(cache_id);
            }
            separated.push_unseparated(")");

            let rows: Vec<CacheEntryRow> = qb
                .build_query_as()
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;

            for row in rows {
                entries.push(CacheEntry::try_from(row)?);
            }
        }

        Ok(entries)
    }

    async fn list_entries(&self) -> Result<Vec<CacheEntry>, RepoError> {
        let rows: Vec<CacheEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM cache_entries ORDER BY cid"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(CacheEntry::try_from).collect()
    }

    async fn upsert_entry(&self, entry: NewCacheEntry) -> Result<(), RepoError> {
        write_entry(self, &entry, UPSERT_ENTRY).await?;
        Ok(())
    }

    async fn upsert_alias_entry(&self, entry: NewCacheEntry) -> Result<bool, RepoError> {
        Ok(write_entry(self, &entry, UPSERT_ALIAS_ENTRY).await? > 0)
    }

    async fn delete_entries(&self, cache_ids: &[String]) -> Result<u64, RepoError> {
        let mut removed = 0;

        for chunk in cache_ids.chunks(BIND_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM cache_entries WHERE cid IN (");
            let mut separated = qb.separated(", ");
            for cache_id in chunk {
                separated.push_bind(cache_id);
            }
            separated.push_unseparated(")");

            removed += qb
                .build()
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
        }

        Ok(removed)
    }

    async fn delete_entry_revisions(&self, revisions: &[EntryRevision]) -> Result<u64, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let mut removed = 0;

        for chunk in revisions.chunks(BIND_CHUNK / 2) {
            let mut qb =
                QueryBuilder::<Sqlite>::new("DELETE FROM cache_entries WHERE (cid, generation) IN (");
            qb.push_values(chunk, |mut row, revision| {
                row.push_bind(&revision.cache_id).push_bind(revision.generation);
            });
            qb.push(")");

            removed += qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(removed)
    }

    async fn delete_entries_by_location(&self, location: &Path) -> Result<u64, RepoError> {
        let location = location_column(location)?;
        let result = sqlx::query("DELETE FROM cache_entries WHERE file_location = ?")
            .bind(location)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn count_entries(&self) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Self::convert_count(count)
    }

    async fn clear_entries(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_with_whitespace_survive_the_column() {
        let tags: BTreeSet<String> = ["node:5", "menu main", "a,b"]
            .into_iter()
            .map(String::from)
            .collect();
        let raw = encode_tags(&tags).expect("encode");
        assert_eq!(decode_tags("cid", &raw).expect("decode"), tags);
        assert!(decode_tags("cid", "[]").expect("decode").is_empty());
    }

    #[test]
    fn malformed_tag_column_is_an_integrity_error() {
        let err = decode_tags("cid", "node:5 node:6").expect_err("not json");
        assert!(matches!(err, RepoError::Integrity { .. }));
    }
}
