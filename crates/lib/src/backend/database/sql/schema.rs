//! SQL schema definitions.
//!
//! ## Changing the Schema
//!
//! 1. Increment `SCHEMA_VERSION`
//! 2. Add the upgrade statements to `initialize`, keyed on the stored version

use sqlx::sqlite::SqlitePool;

use super::SqlxResultExt;
use crate::{Result, backend::errors::BackendError};

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// SQL statements to create the schema tables.
pub const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version BIGINT PRIMARY KEY
    )",
    // Keys are compared bytewise, matching the in-memory engine
    "CREATE TABLE IF NOT EXISTS kv (
        key BLOB PRIMARY KEY NOT NULL,
        value BLOB NOT NULL
    ) WITHOUT ROWID",
];

/// Create tables and record or check the schema version.
pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    for statement in CREATE_TABLES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .sql_context(&format!("Schema creation failed - SQL: {statement}"))?;
    }

    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
        .fetch_optional(pool)
        .await
        .sql_context("Failed to check schema version")?;

    match row {
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .sql_context("Failed to initialize schema version")?;
        }
        Some((found,)) if found > SCHEMA_VERSION => {
            return Err(BackendError::SchemaTooNew {
                found,
                supported: SCHEMA_VERSION,
            }
            .into());
        }
        Some(_) => {}
    }

    Ok(())
}
