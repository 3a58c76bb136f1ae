//! Units of work handed to the executor.
//!
//! A [`ConsumerAction`] is typed: parameters plus a function producing a `T`
//! from the wire connection. The executor never sees `T`; it receives a
//! [`Dispatch`], which erases the type by closing over the action and its
//! result handler.

use crate::cancellation::CancellationToken;
use crate::connection::ConsumerConnection;
use crate::error::ConnectionError;
use crate::handler::ResultHandlerAdapter;
use crate::operation::OperationParameters;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

type Work<T> = Box<
    dyn FnOnce(&dyn ConsumerConnection, &OperationParameters) -> Result<T, ConnectionError> + Send,
>;

/// Parameters paired with the function that performs one operation.
pub struct ConsumerAction<T> {
    parameters: OperationParameters,
    work: Work<T>,
}

impl<T> ConsumerAction<T> {
    pub fn new<F>(parameters: OperationParameters, work: F) -> Self
    where
        F: FnOnce(&dyn ConsumerConnection, &OperationParameters) -> Result<T, ConnectionError>
            + Send
            + 'static,
    {
        Self {
            parameters,
            work: Box::new(work),
        }
    }

    pub fn parameters(&self) -> &OperationParameters {
        &self.parameters
    }

    /// Run the work function. An operation whose token was triggered before
    /// it started is not run at all.
    pub fn run(self, connection: &dyn ConsumerConnection) -> Result<T, ConnectionError> {
        self.parameters.cancellation_token().ensure_not_cancelled()?;
        (self.work)(connection, &self.parameters)
    }
}

impl<T> std::fmt::Debug for ConsumerAction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerAction")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

type Job = Box<dyn FnOnce(Result<&dyn ConsumerConnection, ConnectionError>) + Send>;

/// Type-erased action together with its result handler.
///
/// Exactly one of [`Dispatch::run`] and [`Dispatch::reject`] delivers a
/// result. A dispatch dropped without either delivers
/// [`ConnectionError::Abandoned`]; a panicking work function delivers
/// [`ConnectionError::Panicked`].
pub struct Dispatch {
    parameters: OperationParameters,
    job: Option<Job>,
}

impl Dispatch {
    pub fn new<T: Send + 'static>(
        action: ConsumerAction<T>,
        handler: ResultHandlerAdapter<T>,
    ) -> Self {
        let parameters = action.parameters().clone();
        let job: Job = Box::new(move |connection: Result<&dyn ConsumerConnection, ConnectionError>| {
            let entry_point = action.parameters().entry_point().to_string();
            let result = connection.and_then(|connection| {
                panic::catch_unwind(AssertUnwindSafe(|| action.run(connection)))
                    .unwrap_or_else(|payload| Err(ConnectionError::Panicked(panic_message(&*payload))))
            });
            if let Err(e) = &result {
                debug!(entry_point = %entry_point, error = %e, "Dispatched operation failed");
            }
            handler.deliver(result);
        });

        Self {
            parameters,
            job: Some(job),
        }
    }

    pub fn parameters(&self) -> &OperationParameters {
        &self.parameters
    }

    pub fn entry_point(&self) -> &str {
        self.parameters.entry_point()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        self.parameters.cancellation_token()
    }

    /// Execute against `connection` and deliver the outcome.
    pub fn run(mut self, connection: &dyn ConsumerConnection) {
        if let Some(job) = self.job.take() {
            job(Ok(connection));
        }
    }

    /// Deliver `error` without running the work.
    pub fn reject(mut self, error: ConnectionError) {
        if let Some(job) = self.job.take() {
            job(Err(error));
        }
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            job(Err(ConnectionError::Abandoned));
        }
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("entry_point", &self.entry_point())
            .field("delivered", &self.job.is_none())
            .finish()
    }
}
