//! SQLite engine for canopy storage.
//!
//! The whole keyspace lives in one `WITHOUT ROWID` table whose primary key is
//! the raw key bytes. SQLite compares BLOBs with `memcmp`, so `ORDER BY key`
//! and `key >= ? AND key < ?` give exactly the byte ordering the document
//! store relies on.
//!
//! ## Schema and Migrations
//!
//! The schema is defined in the [`schema`] module and created on connect.

mod storage;

/// Schema definition and version tracking.
pub mod schema;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::{Result, backend::errors::BackendError};

const POOL_SIZE: u32 = 5;

const MEMORY_PRAGMAS: &str = "PRAGMA busy_timeout = 5000;";

// WAL keeps readers off the writer's lock.
const FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;";

/// Attach a short description of the failed step to sqlx errors.
pub(crate) trait SqlxResultExt<T> {
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            BackendError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// SQLite-backed engine implementing [`crate::backend::Backend`].
///
/// `Sqlite` is `Send + Sync`; the sqlx pool handles connection sharing.
/// Each batch runs in its own transaction.
#[derive(Debug, Clone)]
pub struct Sqlite {
    pool: SqlitePool,
}

impl Sqlite {
    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a SQLite database at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use canopy::backend::database::Sqlite;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let backend = Sqlite::open("documents.db").await.unwrap();
    /// }
    /// ```
    pub async fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        // mode=rwc: read-write-create (create file if it doesn't exist)
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect(&url).await
    }

    /// Connect using a SQLite connection URL (e.g. `sqlite:./docs.db`).
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains("mode=memory");

        // A shared in-memory database disappears with its last connection,
        // so such pools pin one connection for their whole life.
        let mut options = SqlitePoolOptions::new().max_connections(POOL_SIZE);
        if in_memory {
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options
            .connect(url)
            .await
            .sql_context("Failed to connect to SQLite")?;

        let pragmas = if in_memory { MEMORY_PRAGMAS } else { FILE_PRAGMAS };
        sqlx::query(pragmas)
            .execute(&pool)
            .await
            .sql_context("Failed to apply SQLite pragmas")?;

        schema::initialize(&pool).await?;
        Ok(Self { pool })
    }

    /// Create a private in-memory database.
    ///
    /// The database lives as long as this engine (and its clones).
    pub async fn in_memory() -> Result<Self> {
        // Shared cache lets every pooled connection see the same database;
        // the unique name keeps separate engines apart.
        let unique_id = uuid::Uuid::new_v4();
        let url = format!("sqlite:file:mem_{unique_id}?mode=memory&cache=shared");
        Self::connect(&url).await
    }
}
