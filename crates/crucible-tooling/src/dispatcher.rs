//! The single "submit an action, get one result back" path.
//!
//! Blocking, callback and `async` delivery are three thin wrappers around
//! [`Dispatcher::submit`]; none of them touches the executor differently.

use crate::action::{ConsumerAction, Dispatch};
use crate::config::ConnectionParameters;
use crate::error::ToolingError;
use crate::executor::AsyncActionExecutor;
use crate::handler::{BlockingResultHandler, ExceptionTransformer, ResultHandler, ResultHandlerAdapter};
use std::sync::Arc;

/// Executor plus the connection parameters every operation inherits.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    executor: Arc<dyn AsyncActionExecutor>,
    connection: Arc<ConnectionParameters>,
}

impl Dispatcher {
    pub(crate) fn new(
        executor: Arc<dyn AsyncActionExecutor>,
        connection: Arc<ConnectionParameters>,
    ) -> Self {
        Self {
            executor,
            connection,
        }
    }

    pub(crate) fn executor(&self) -> &dyn AsyncActionExecutor {
        self.executor.as_ref()
    }

    pub(crate) fn connection(&self) -> &Arc<ConnectionParameters> {
        &self.connection
    }

    /// Build a transformer whose message names this executor's connection.
    pub(crate) fn transformer<F>(&self, template: F) -> ExceptionTransformer
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let display_name = self.executor.display_name();
        ExceptionTransformer::new(move |_| template(&display_name))
    }

    pub(crate) fn submit<T: Send + 'static>(
        &self,
        action: ConsumerAction<T>,
        handler: Box<dyn ResultHandler<T>>,
        transformer: ExceptionTransformer,
    ) {
        let adapter = ResultHandlerAdapter::new(handler, transformer);
        self.executor.run(Dispatch::new(action, adapter));
    }
}

/// An action ready to go, waiting for the caller to pick a delivery mode.
pub(crate) struct Prepared<T> {
    dispatcher: Dispatcher,
    action: ConsumerAction<T>,
    transformer: ExceptionTransformer,
}

impl<T: Send + 'static> Prepared<T> {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        action: ConsumerAction<T>,
        transformer: ExceptionTransformer,
    ) -> Self {
        Self {
            dispatcher,
            action,
            transformer,
        }
    }

    pub(crate) fn run(self) -> Result<T, ToolingError> {
        let (handler, result) = BlockingResultHandler::new();
        self.dispatcher
            .submit(self.action, Box::new(handler), self.transformer);
        result.wait()
    }

    pub(crate) fn run_with(self, handler: Box<dyn ResultHandler<T>>) {
        self.dispatcher.submit(self.action, handler, self.transformer);
    }

    pub(crate) async fn run_async(self) -> Result<T, ToolingError> {
        let (handler, result) = BlockingResultHandler::new();
        self.dispatcher
            .submit(self.action, Box::new(handler), self.transformer);
        result.wait_async().await
    }
}
