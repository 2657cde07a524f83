mod engine;
#[cfg(feature = "sqlite")]
mod sqlite;
