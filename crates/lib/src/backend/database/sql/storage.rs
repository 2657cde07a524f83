//! [`Backend`] implementation for the SQLite engine.

use std::any::Any;

use async_trait::async_trait;

use super::{Sqlite, SqlxResultExt};
use crate::{
    Result,
    backend::{Backend, BatchOp, KeyRange, KvPair, errors::parse_counter},
};

const SCAN_ASC: &str = "SELECT key, value FROM kv WHERE key >= ? AND key < ? ORDER BY key ASC LIMIT ?";
const SCAN_DESC: &str = "SELECT key, value FROM kv WHERE key >= ? AND key < ? ORDER BY key DESC LIMIT ?";
const UPSERT: &str =
    "INSERT INTO kv (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value";
const DELETE: &str = "DELETE FROM kv WHERE key = ?";
// One statement, so concurrent connections serialize on SQLite's write lock.
// Values stay BLOBs holding decimal text, like every other key.
const INCREMENT: &str = "INSERT INTO kv (key, value) VALUES (?, CAST('1' AS BLOB))
     ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(CAST(value AS TEXT) AS INTEGER) + 1 AS BLOB)
     RETURNING value";

#[async_trait]
impl Backend for Sqlite {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .sql_context("Failed to read key")
    }

    async fn scan(&self, range: &KeyRange) -> Result<Vec<KvPair>> {
        if range.start >= range.end {
            return Ok(Vec::new());
        }
        // A negative LIMIT means no limit in SQLite
        let limit = range
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let sql = if range.reverse { SCAN_DESC } else { SCAN_ASC };
        sqlx::query_as::<_, (Vec<u8>, Vec<u8>)>(sql)
            .bind(range.start.as_slice())
            .bind(range.end.as_slice())
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .sql_context("Failed to scan key range")
    }

    async fn write(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .sql_context("Failed to begin transaction")?;
        for op in &ops {
            match op {
                BatchOp::Put { key, value } => {
                    sqlx::query(UPSERT)
                        .bind(key.as_slice())
                        .bind(value.as_slice())
                        .execute(&mut *tx)
                        .await
                        .sql_context("Failed to write key")?;
                }
                BatchOp::Delete { key } => {
                    sqlx::query(DELETE)
                        .bind(key.as_slice())
                        .execute(&mut *tx)
                        .await
                        .sql_context("Failed to delete key")?;
                }
            }
        }
        tx.commit().await.sql_context("Failed to commit transaction")
    }

    async fn increment(&self, key: &[u8]) -> Result<u64> {
        let value = sqlx::query_scalar::<_, Vec<u8>>(INCREMENT)
            .bind(key)
            .fetch_one(self.pool())
            .await
            .sql_context("Failed to increment counter")?;
        Ok(parse_counter(key, Some(&value))?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
