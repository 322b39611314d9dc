use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    application::repos::{RepoError, TagInvalidationRepo},
    cache::{TagChecksumProvider, checksum_from_counts},
};

use super::{BIND_CHUNK, SqliteRepositories, map_sqlx_error};

#[async_trait]
impl TagChecksumProvider for SqliteRepositories {
    async fn current_checksum(&self, tags: &BTreeSet<String>) -> Result<String, RepoError> {
        let mut counts = HashMap::with_capacity(tags.len());
        let tags_vec: Vec<&String> = tags.iter().collect();

        for chunk in tags_vec.chunks(BIND_CHUNK) {
            let mut qb =
                QueryBuilder::<Sqlite>::new("SELECT tag, invalidations FROM cache_tags WHERE tag IN (");
            let mut separated = qb.separated(", ");
            for tag in chunk {
                separated.push_bind(tag.as_str());
            }
            separated.push_unseparated(")");

            let rows: Vec<(String, i64)> = qb
                .build_query_as()
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;
            counts.extend(rows);
        }

        Ok(checksum_from_counts(tags, &counts))
    }
}

#[async_trait]
impl TagInvalidationRepo for SqliteRepositories {
    async fn invalidate_tags(&self, tags: &[String]) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        for tag in tags {
            sqlx::query(
                r#"
                INSERT INTO cache_tags (tag, invalidations) VALUES (?, 1)
                ON CONFLICT (tag) DO UPDATE SET invalidations = cache_tags.invalidations + 1
                "#,
            )
            .bind(tag)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }
}
