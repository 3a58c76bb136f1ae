//! Client-side connection layer for a long-lived build daemon.
//!
//! A [`ProjectConnection`] is the caller's handle on one daemon session. It
//! turns each request (fetch a model, run a build or tests, run a custom
//! action, report changed files) into an action handed to an
//! [`AsyncActionExecutor`], and delivers the result in one of three ways:
//!
//! - blocking (`get_model`, `run`, `notify_daemons_about_changed_paths`),
//!   which parks the calling thread, runtime worker or not
//! - callback (`get_model_with`, `run_with`), invoked on an executor thread
//! - `async` (`fetch_model`, `run_async`)
//!
//! Every dispatched operation carries its own [`CancellationToken`].
//! Cancellation is cooperative: work functions poll the token.
//!
//! Connections are opened through a [`ConnectionRegistry`], which a host
//! keeps to force every open connection down on exit:
//!
//! ```ignore
//! let registry = ConnectionRegistry::new();
//! let executor = Arc::new(TokioActionExecutor::new(wire, runtime.handle().clone()));
//! let connection = registry.connect(executor, ConnectionParameters::new("/repo"));
//!
//! connection.new_build().for_tasks(["assemble"]).run()?;
//! connection.notify_daemons_about_changed_paths(&["/repo/src/Main.java"])?;
//! connection.close();
//!
//! // at process exit
//! registry.close_all_now();
//! ```

mod action;
mod build_action;
mod cancellation;
mod config;
mod connection;
mod dispatcher;
mod error;
mod executor;
mod handler;
mod launcher;
mod model;
mod operation;
mod project_connection;
mod registry;

#[cfg(test)]
mod test_support;

pub use action::{ConsumerAction, Dispatch};
pub use build_action::{
    BuildAction, BuildActionExecuter, PhasedBuildActionBuilder, PhasedBuildActionExecuter,
};
pub use cancellation::{CancellationToken, CancellationTokenSource};
pub use config::{env, ConfigError, ConnectionParameters};
pub use connection::{
    BuildActionRequest, BuildPhase, ConsumerConnection, PhaseResultSink, TestSelection,
};
pub use error::{ConnectionError, ToolingError};
pub use executor::{AsyncActionExecutor, TokioActionExecutor};
pub use handler::{
    BlockingResult, BlockingResultHandler, ExceptionTransformer, ResultHandler,
    ResultHandlerAdapter,
};
pub use launcher::{BuildLauncher, LongRunningOperation, TestLauncher};
pub use model::{Model, ModelBuilder, ModelShape, ModelType};
pub use operation::{entry_points, OperationOptions, OperationParameters, OperationParametersBuilder};
pub use project_connection::ProjectConnection;
pub use registry::{ConnectionId, ConnectionLifecycleListener, ConnectionRegistry};
