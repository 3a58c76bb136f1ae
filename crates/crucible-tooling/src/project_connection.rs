//! The connection facade handed to callers.
//!
//! A [`ProjectConnection`] owns one executor and one set of connection
//! parameters for its whole life. Every operation it offers builds a
//! [`ConsumerAction`], hands it to the executor and delivers the result
//! through a blocking, callback or `async` handler.

use crate::action::ConsumerAction;
use crate::build_action::{request_for, BuildAction, BuildActionExecuter, PhasedBuildActionBuilder};
use crate::config::ConnectionParameters;
use crate::dispatcher::{Dispatcher, Prepared};
use crate::error::ToolingError;
use crate::executor::AsyncActionExecutor;
use crate::handler::ResultHandler;
use crate::launcher::{BuildLauncher, TestLauncher};
use crate::model::{ensure_capability, Model, ModelBuilder};
use crate::operation::{entry_points, OperationParameters};
use crate::registry::{ConnectionId, ConnectionLifecycleListener};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// One open connection to the daemon for one project.
///
/// Created through [`ConnectionRegistry::connect`](crate::ConnectionRegistry::connect),
/// which also tracks it until it is closed.
pub struct ProjectConnection {
    id: ConnectionId,
    dispatcher: Dispatcher,
    listener: Arc<dyn ConnectionLifecycleListener>,
    closed: AtomicBool,
    stopped_now: AtomicBool,
}

impl ProjectConnection {
    pub(crate) fn new(
        id: ConnectionId,
        executor: Arc<dyn AsyncActionExecutor>,
        parameters: Arc<ConnectionParameters>,
        listener: Arc<dyn ConnectionLifecycleListener>,
    ) -> Self {
        Self {
            id,
            dispatcher: Dispatcher::new(executor, parameters),
            listener,
            closed: AtomicBool::new(false),
            stopped_now: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn parameters(&self) -> &ConnectionParameters {
        self.dispatcher.connection()
    }

    pub fn display_name(&self) -> String {
        self.dispatcher.executor().display_name()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fetch a model, blocking until the daemon answers.
    pub fn get_model<T: Model>(&self) -> Result<T, ToolingError> {
        self.model::<T>()?.get()
    }

    /// Fetch a model in the background. The type check still happens here,
    /// on the calling thread; `handler` only sees dispatch failures.
    pub fn get_model_with<T, H>(&self, handler: H) -> Result<(), ToolingError>
    where
        T: Model,
        H: ResultHandler<T> + 'static,
    {
        self.model::<T>()?.get_with(handler);
        Ok(())
    }

    pub async fn fetch_model<T: Model>(&self) -> Result<T, ToolingError> {
        self.model::<T>()?.fetch().await
    }

    /// Builder for a model fetch. Fails without touching the executor when
    /// `T` is not a capability type.
    pub fn model<T: Model>(&self) -> Result<ModelBuilder<T>, ToolingError> {
        ensure_capability(&T::TYPE)?;
        Ok(ModelBuilder::new(self.dispatcher.clone()))
    }

    pub fn new_build(&self) -> BuildLauncher {
        BuildLauncher::new(self.dispatcher.clone())
    }

    pub fn new_test_launcher(&self) -> TestLauncher {
        TestLauncher::new(self.dispatcher.clone())
    }

    pub fn action<A: BuildAction>(&self, action: A) -> BuildActionExecuter<A::Output> {
        BuildActionExecuter::new(self.dispatcher.clone(), request_for(&action))
    }

    pub fn action_builder(&self) -> PhasedBuildActionBuilder {
        PhasedBuildActionBuilder::new(self.dispatcher.clone())
    }

    /// Tell the daemon about files changed behind its back, blocking until
    /// it acknowledges.
    ///
    /// Every path must be absolute and valid UTF-8. Any other path fails the
    /// whole call before anything is dispatched.
    pub fn notify_daemons_about_changed_paths<P: AsRef<Path>>(
        &self,
        changed_paths: &[P],
    ) -> Result<(), ToolingError> {
        self.prepare_changed_paths(changed_paths)?.run()
    }

    pub async fn notify_daemons_about_changed_paths_async<P: AsRef<Path>>(
        &self,
        changed_paths: &[P],
    ) -> Result<(), ToolingError> {
        self.prepare_changed_paths(changed_paths)?.run_async().await
    }

    fn prepare_changed_paths<P: AsRef<Path>>(
        &self,
        changed_paths: &[P],
    ) -> Result<Prepared<()>, ToolingError> {
        let mut paths = Vec::with_capacity(changed_paths.len());
        for path in changed_paths {
            let path = path.as_ref();
            if !path.is_absolute() {
                return Err(ToolingError::invalid_argument(format!(
                    "Changed path '{}' is not absolute",
                    path.display()
                )));
            }
            let path = path.to_str().ok_or_else(|| {
                ToolingError::invalid_argument(format!(
                    "Changed path '{}' is not valid UTF-8",
                    path.display()
                ))
            })?;
            paths.push(path.to_string());
        }

        let params = OperationParameters::builder(
            entry_points::NOTIFY_CHANGED_PATHS,
            self.dispatcher.connection().clone(),
        )
        .build();
        let action = ConsumerAction::new(params, move |connection, params| {
            connection.notify_daemons_about_changed_paths(&paths, params)
        });
        let transformer = self.dispatcher.transformer(|display_name| {
            format!("Could not notify daemons about changed paths: {}.", display_name)
        });

        Ok(Prepared::new(self.dispatcher.clone(), action, transformer))
    }

    /// Stop accepting work, wait for in-flight operations, then leave the
    /// registry. Later calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(connection_id = %self.id, "Connection already closed");
            return;
        }

        self.dispatcher.executor().stop();
        self.listener.connection_closed(self);
        info!(connection_id = %self.id, "Connection closed");
    }

    /// Forced teardown for host shutdown. Cancels in-flight operations; the
    /// connection stays registered until [`close`](Self::close).
    pub(crate) fn close_now(&self) {
        if self.is_closed() || self.stopped_now.swap(true, Ordering::SeqCst) {
            debug!(connection_id = %self.id, "Connection already stopped");
            return;
        }

        let executor = self.dispatcher.executor();
        executor.stop_now();
        // stop_now already refuses new work; stop_when_idle only releases
        // whatever the executor keeps for idle shutdown
        executor.stop_when_idle();
        info!(connection_id = %self.id, "Connection stopped immediately");
    }
}

impl std::fmt::Debug for ProjectConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectConnection")
            .field("id", &self.id)
            .field("display_name", &self.display_name())
            .field("closed", &self.is_closed())
            .finish()
    }
}
