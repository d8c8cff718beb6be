//! The version/content-type ledger, backed by SQLite.
//!
//! Exactly zero or one row exists per path string (PRIMARY KEY). A write
//! to an absent path inserts sequence 1; a write to a present path
//! increments the stored sequence and regenerates the nonce, both as a
//! single upsert statement, so the increment happens in SQL rather than by
//! read-then-write in process. Any upsert or delete that affects a row
//! count other than one means the two-store invariant is already broken
//! and fails loudly.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::errors::{StorageError, StorageResult};
use crate::models::{meta::MetaRecord, path::StoragePath, version::Version};

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

const SELECT_SQL: &str =
    "SELECT path, sequence, nonce, content_type, updated_at FROM metadata WHERE path = ?";

const UPSERT_SQL: &str = "INSERT INTO metadata (path, sequence, nonce, content_type, updated_at) \
     VALUES (?, 1, ?, ?, ?) \
     ON CONFLICT(path) DO UPDATE SET \
         sequence = metadata.sequence + 1, \
         nonce = excluded.nonce, \
         content_type = excluded.content_type, \
         updated_at = excluded.updated_at";

const DELETE_SQL: &str = "DELETE FROM metadata WHERE path = ?";

const BUMP_SQL: &str =
    "UPDATE metadata SET sequence = sequence + 1, nonce = ?, updated_at = ? WHERE path = ?";

#[derive(Clone)]
pub struct MetaStore {
    db: Arc<SqlitePool>,
}

impl MetaStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema, statement by statement.
    pub async fn migrate(&self) -> StorageResult<()> {
        for stmt in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    pub async fn get(&self, path: &StoragePath) -> StorageResult<Option<MetaRecord>> {
        let record = sqlx::query_as::<_, MetaRecord>(SELECT_SQL)
            .bind(path.as_str())
            .fetch_optional(&*self.db)
            .await?;
        Ok(record)
    }

    /// Insert at sequence 1 or bump an existing row. Folders pass `None`
    /// for the content type.
    pub async fn upsert(
        &self,
        path: &StoragePath,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let result = sqlx::query(UPSERT_SQL)
            .bind(path.as_str())
            .bind(Version::fresh_nonce())
            .bind(content_type)
            .bind(Utc::now())
            .execute(&*self.db)
            .await?;
        expect_one(path, result.rows_affected(), "upsert")
    }

    /// Remove a row. Deleting a path with no row is a coordinator bug, not
    /// a normal miss.
    pub async fn delete(&self, path: &StoragePath) -> StorageResult<()> {
        let result = sqlx::query(DELETE_SQL)
            .bind(path.as_str())
            .execute(&*self.db)
            .await?;
        expect_one(path, result.rows_affected(), "delete")
    }

    /// The PUT-side cascade: upsert the document row, then every ancestor
    /// folder row, in one transaction. If any step fails the whole batch
    /// rolls back and the remaining cascade never runs.
    pub async fn record_write(
        &self,
        document: &StoragePath,
        content_type: Option<&str>,
        folders: &[StoragePath],
    ) -> StorageResult<()> {
        let mut tx = self.db.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(UPSERT_SQL)
            .bind(document.as_str())
            .bind(Version::fresh_nonce())
            .bind(content_type)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        expect_one(document, result.rows_affected(), "upsert")?;

        for folder in folders {
            let result = sqlx::query(UPSERT_SQL)
                .bind(folder.as_str())
                .bind(Version::fresh_nonce())
                .bind(Option::<&str>::None)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            expect_one(folder, result.rows_affected(), "upsert")?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// The DELETE-side cascade: drop the rows of every removed path, then
    /// bump each surviving ancestor, but only those that have a row;
    /// never-materialized folders are skipped. One transaction.
    pub async fn record_delete(
        &self,
        removed: &[StoragePath],
        survivors: &[StoragePath],
    ) -> StorageResult<()> {
        let mut tx = self.db.begin().await?;

        for path in removed {
            let result = sqlx::query(DELETE_SQL)
                .bind(path.as_str())
                .execute(&mut *tx)
                .await?;
            expect_one(path, result.rows_affected(), "delete")?;
        }

        let now = Utc::now();
        for folder in survivors {
            sqlx::query(BUMP_SQL)
                .bind(Version::fresh_nonce())
                .bind(now)
                .bind(folder.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn expect_one(path: &StoragePath, affected: u64, op: &str) -> StorageResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StorageError::InvariantViolation {
            path: path.to_string(),
            detail: format!("{} affected {} rows", op, affected),
        })
    }
}
