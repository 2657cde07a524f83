//! Incrementally maintained map/reduce views.
//!
//! A node holding a `@map` script is a view base. The script runs once per
//! direct child document and its rows are stored under `<base>/@map`. A
//! `!reduce` script on the same node folds those rows into
//! `<base>/!reduce/value` as they are added and removed.
//!
//! Mutations only enqueue [`ViewCommand`]s; a single background task applies
//! them in order. [`crate::Store::flush_views`] waits for the queue to drain.
//! Script calls run on tokio's blocking pool, so neither the worker's runtime
//! thread nor unrelated writes wait on a script.

mod map;
mod reduce;
mod script;

#[cfg(feature = "lua")]
mod lua;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info, info_span};

#[cfg(feature = "lua")]
pub use lua::LuaRuntime;
pub use script::{Directive, EmittedRow, NullRuntime, ScriptError, ScriptRuntime};

use crate::{Path, Result, Store, StoreConfig, WeakStore};

/// Work queued for the view worker.
#[derive(Debug)]
pub enum ViewCommand {
    /// The map script of `base` changed; rebuild every child's rows.
    ///
    /// `script` is the script at commit time. The worker always runs the one
    /// stored when it gets to the command.
    RecomputeChildren { base: Path, script: String },
    /// Documents at `paths` changed; re-run maps of their ancestors.
    DocumentsChanged { paths: Vec<Path> },
    /// Reply once every earlier command has been applied.
    Flush { response: oneshot::Sender<()> },
}

/// Handle to the background view worker.
#[derive(Debug)]
pub(crate) struct ViewEngine {
    sender: mpsc::UnboundedSender<ViewCommand>,
}

impl ViewEngine {
    /// Start the worker. It stops once every store handle is dropped.
    pub(crate) fn spawn(store: WeakStore) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = ViewWorker { store, receiver };
        tokio::spawn(worker.run());
        Self { sender }
    }

    pub(crate) fn send(&self, command: ViewCommand) {
        if self.sender.send(command).is_err() {
            debug!("view worker is gone, dropping command");
        }
    }

    pub(crate) async fn flush(&self) -> Result<()> {
        let (response, done) = oneshot::channel();
        self.send(ViewCommand::Flush { response });
        // A closed worker has nothing left to apply.
        let _ = done.await;
        Ok(())
    }
}

struct ViewWorker {
    store: WeakStore,
    receiver: mpsc::UnboundedReceiver<ViewCommand>,
}

impl ViewWorker {
    async fn run(mut self) {
        async move {
            info!("Starting view engine");
            while let Some(command) = self.receiver.recv().await {
                if let ViewCommand::Flush { response } = command {
                    let _ = response.send(());
                    continue;
                }
                let Some(store) = self.store.upgrade() else {
                    break;
                };
                if let Err(e) = store.apply_view_command(command).await {
                    tracing::error!("View update failed: {e}");
                }
            }
            info!("View engine shutting down");
        }
        .instrument(info_span!("view_engine"))
        .await
    }
}

/// The interpreter used when the builder is given none.
pub fn default_runtime(config: &StoreConfig) -> Arc<dyn ScriptRuntime> {
    #[cfg(feature = "lua")]
    {
        Arc::new(LuaRuntime::with_instruction_limit(config.script_instruction_limit))
    }
    #[cfg(not(feature = "lua"))]
    {
        let _ = config;
        Arc::new(NullRuntime)
    }
}

impl Store {
    /// Run one script call on the blocking pool.
    pub(crate) async fn call_script<T, F>(&self, call: F) -> std::result::Result<T, ScriptError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ScriptRuntime) -> std::result::Result<T, ScriptError> + Send + 'static,
    {
        let runtime = self.runtime().clone();
        tokio::task::spawn_blocking(move || call(runtime.as_ref()))
            .await
            .map_err(|e| ScriptError::Runtime {
                reason: format!("script task failed: {e}"),
            })?
    }
}
