//! Contract of the wire-level connection to the daemon.
//!
//! Implementations encode requests and decode results; this crate only ever
//! reaches them from inside a dispatched action, on an executor thread.

use crate::error::ConnectionError;
use crate::model::ModelType;
use crate::operation::OperationParameters;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Build phases at which a phased build action may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildPhase {
    ProjectsLoaded,
    BuildFinished,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPhase::ProjectsLoaded => write!(f, "ProjectsLoaded"),
            BuildPhase::BuildFinished => write!(f, "BuildFinished"),
        }
    }
}

/// A custom action as sent over the wire: a name the daemon resolves plus an
/// opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildActionRequest {
    pub name: String,
    pub payload: serde_json::Value,
}

/// Which tests a test launcher asks the daemon to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSelection {
    /// Test classes, run by every test task that contains them
    pub test_classes: Vec<String>,
    /// Class name to selected method names
    pub test_methods: Vec<(String, Vec<String>)>,
    /// Task path to test classes, restricting each group to one task
    pub task_test_classes: Vec<(String, Vec<String>)>,
}

impl TestSelection {
    pub fn is_empty(&self) -> bool {
        self.test_classes.is_empty()
            && self.test_methods.is_empty()
            && self.task_test_classes.is_empty()
    }
}

/// Receives `(phase, result)` pairs during a phased build action.
pub type PhaseResultSink<'a> =
    dyn FnMut(BuildPhase, serde_json::Value) -> Result<(), ConnectionError> + 'a;

/// A connection that executes work against the daemon.
pub trait ConsumerConnection: Send + Sync {
    /// Human-readable name used in failure messages
    fn display_name(&self) -> String;

    fn fetch_model(
        &self,
        model_type: &ModelType,
        params: &OperationParameters,
    ) -> Result<serde_json::Value, ConnectionError>;

    fn run_build(&self, params: &OperationParameters) -> Result<(), ConnectionError>;

    fn run_tests(
        &self,
        selection: &TestSelection,
        params: &OperationParameters,
    ) -> Result<(), ConnectionError>;

    fn run_build_action(
        &self,
        action: &BuildActionRequest,
        params: &OperationParameters,
    ) -> Result<serde_json::Value, ConnectionError>;

    /// Run one action per phase, reporting each phase's result through
    /// `sink` as soon as the daemon produces it.
    fn run_phased_build_action(
        &self,
        actions: &[(BuildPhase, BuildActionRequest)],
        sink: &mut PhaseResultSink<'_>,
        params: &OperationParameters,
    ) -> Result<(), ConnectionError>;

    /// Tell the daemon that files changed outside its own file watching.
    fn notify_daemons_about_changed_paths(
        &self,
        changed_paths: &[String],
        params: &OperationParameters,
    ) -> Result<(), ConnectionError>;
}
