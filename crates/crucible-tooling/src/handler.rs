//! Result delivery.
//!
//! Every dispatch ends in exactly one call on a [`ResultHandler`]. The
//! blocking and `async` surfaces are both built from
//! [`BlockingResultHandler`], which parks the result in a oneshot channel.
//! [`ResultHandlerAdapter`] sits in between and runs collaborator failures
//! through an [`ExceptionTransformer`].

use crate::error::{ConnectionError, ToolingError};
use tokio::sync::oneshot;

/// Callback contract for asynchronous results.
///
/// Both methods consume the handler, so a result can be delivered at most
/// once. Handlers run on an executor thread.
pub trait ResultHandler<T>: Send {
    fn on_complete(self: Box<Self>, result: T);

    fn on_failure(self: Box<Self>, failure: ToolingError);
}

impl<T, F> ResultHandler<T> for F
where
    F: FnOnce(Result<T, ToolingError>) + Send,
{
    fn on_complete(self: Box<Self>, result: T) {
        (*self)(Ok(result))
    }

    fn on_failure(self: Box<Self>, failure: ToolingError) {
        (*self)(Err(failure))
    }
}

/// Maps collaborator failures into connection-scoped errors.
pub struct ExceptionTransformer {
    describe: Box<dyn Fn(&ConnectionError) -> String + Send + Sync>,
}

impl ExceptionTransformer {
    pub fn new<F>(describe: F) -> Self
    where
        F: Fn(&ConnectionError) -> String + Send + Sync + 'static,
    {
        Self {
            describe: Box::new(describe),
        }
    }

    pub fn transform(&self, failure: ConnectionError) -> ToolingError {
        let message = (self.describe)(&failure);
        if failure.is_cancelled() {
            ToolingError::Cancelled {
                message,
                source: failure,
            }
        } else {
            ToolingError::Connection {
                message,
                source: failure,
            }
        }
    }
}

impl std::fmt::Debug for ExceptionTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionTransformer").finish_non_exhaustive()
    }
}

/// Pairs a caller's handler with the transformer for its operation.
pub struct ResultHandlerAdapter<T> {
    handler: Box<dyn ResultHandler<T>>,
    transformer: ExceptionTransformer,
}

impl<T> ResultHandlerAdapter<T> {
    pub fn new(handler: Box<dyn ResultHandler<T>>, transformer: ExceptionTransformer) -> Self {
        Self {
            handler,
            transformer,
        }
    }

    pub fn deliver(self, result: Result<T, ConnectionError>) {
        match result {
            Ok(value) => self.handler.on_complete(value),
            Err(failure) => self
                .handler
                .on_failure(self.transformer.transform(failure)),
        }
    }
}

/// Handler that records the outcome for a waiting caller.
pub struct BlockingResultHandler<T> {
    tx: oneshot::Sender<Result<T, ToolingError>>,
}

/// Waiting side of a [`BlockingResultHandler`].
pub struct BlockingResult<T> {
    rx: oneshot::Receiver<Result<T, ToolingError>>,
}

impl<T: Send> BlockingResultHandler<T> {
    pub fn new() -> (Self, BlockingResult<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, BlockingResult { rx })
    }

    fn send(self, result: Result<T, ToolingError>) {
        // The waiter may have given up (e.g. its future was dropped)
        let _ = self.tx.send(result);
    }
}

impl<T: Send> ResultHandler<T> for BlockingResultHandler<T> {
    fn on_complete(self: Box<Self>, result: T) {
        self.send(Ok(result));
    }

    fn on_failure(self: Box<Self>, failure: ToolingError) {
        self.send(Err(failure));
    }
}

impl<T> BlockingResult<T> {
    /// Block the calling thread until the handler fires.
    ///
    /// Safe to call from a runtime thread as long as the handler is fired
    /// elsewhere; inside async code prefer [`BlockingResult::wait_async`],
    /// which does not park a worker.
    pub fn wait(self) -> Result<T, ToolingError> {
        futures::executor::block_on(self.rx).unwrap_or_else(|_| Err(handler_dropped()))
    }

    pub async fn wait_async(self) -> Result<T, ToolingError> {
        self.rx.await.unwrap_or_else(|_| Err(handler_dropped()))
    }
}

fn handler_dropped() -> ToolingError {
    ToolingError::Connection {
        message: "Result handler was dropped without a result".to_string(),
        source: ConnectionError::Abandoned,
    }
}
