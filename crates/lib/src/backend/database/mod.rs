//! Database-style engine implementations
//!
//! Both engines keep keys in byte order so range scans map directly onto the
//! underlying structure (a `BTreeMap` or a `WITHOUT ROWID` SQLite table).

mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sql;

pub use in_memory::InMemory;
#[cfg(feature = "sqlite")]
pub use sql::Sqlite;
