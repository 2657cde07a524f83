//! The contract between the view engine and a script interpreter.

use std::fmt;

use thiserror::Error;

use crate::{Path, Tree};

/// One row produced by a map script, relative to `<base>/@map`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedRow {
    pub path: Path,
    pub value: Tree,
}

impl EmittedRow {
    pub fn new(path: impl Into<Path>, value: Tree) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Tells a reduce script whether a row enters or leaves the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Add,
    Remove,
}

impl Directive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Directive::Add => "add",
            Directive::Remove => "remove",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed script run. Logged by the view engine, never returned to writers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ScriptError {
    /// No interpreter is available.
    #[error("No script runtime configured")]
    Unavailable,

    /// The source did not compile.
    #[error("Script compile error: {reason}")]
    Compile {
        /// Interpreter message
        reason: String,
    },

    /// The script ran longer than its instruction budget allows.
    #[error("Script exceeded its budget of {instructions} instructions")]
    BudgetExceeded {
        /// The budget that was exhausted
        instructions: u64,
    },

    /// The script raised an error or returned something unusable.
    #[error("Script runtime error: {reason}")]
    Runtime {
        /// Interpreter message
        reason: String,
    },
}

/// Executes map and reduce scripts.
///
/// Implementations are called from the background view worker, one call at a
/// time on tokio's blocking pool, and must not keep state between calls. A
/// call that can run unbounded should give up with an error instead.
pub trait ScriptRuntime: Send + Sync {
    /// Run a map script over one child document and return its rows.
    fn map(&self, source: &str, doc: &Tree, key: &str) -> Result<Vec<EmittedRow>, ScriptError>;

    /// Fold one row into the accumulated reduction and return the new value.
    fn reduce(
        &self,
        source: &str,
        directive: Directive,
        current: &Tree,
        row: &EmittedRow,
        key: &str,
    ) -> Result<Tree, ScriptError>;
}

/// Runtime used when no interpreter is compiled in. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRuntime;

impl ScriptRuntime for NullRuntime {
    fn map(&self, _source: &str, _doc: &Tree, _key: &str) -> Result<Vec<EmittedRow>, ScriptError> {
        Err(ScriptError::Unavailable)
    }

    fn reduce(
        &self,
        _source: &str,
        _directive: Directive,
        _current: &Tree,
        _row: &EmittedRow,
        _key: &str,
    ) -> Result<Tree, ScriptError> {
        Err(ScriptError::Unavailable)
    }
}
