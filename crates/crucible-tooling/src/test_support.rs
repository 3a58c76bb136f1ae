//! In-memory connection and executor used by unit tests.

use crate::action::Dispatch;
use crate::connection::{
    BuildActionRequest, BuildPhase, ConsumerConnection, PhaseResultSink, TestSelection,
};
use crate::error::ConnectionError;
use crate::executor::AsyncActionExecutor;
use crate::model::ModelType;
use crate::operation::OperationParameters;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every call and answers from canned responses.
#[derive(Default)]
pub(crate) struct RecordingConnection {
    name: String,
    builds: AtomicUsize,
    failure: Mutex<Option<ConnectionError>>,
    parameters: Mutex<Vec<OperationParameters>>,
    selections: Mutex<Vec<TestSelection>>,
    changed_paths: Mutex<Vec<Vec<String>>>,
    action_requests: Mutex<Vec<BuildActionRequest>>,
    models: Mutex<HashMap<String, serde_json::Value>>,
    action_results: Mutex<HashMap<String, serde_json::Value>>,
    silent_phases: Mutex<Vec<BuildPhase>>,
}

impl RecordingConnection {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Every following call fails with `error`.
    pub(crate) fn fail_with(&self, error: ConnectionError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub(crate) fn respond_with_model(&self, name: &str, value: serde_json::Value) {
        self.models.lock().unwrap().insert(name.to_string(), value);
    }

    pub(crate) fn respond_to_action(&self, name: &str, value: serde_json::Value) {
        self.action_results
            .lock()
            .unwrap()
            .insert(name.to_string(), value);
    }

    /// Phased actions for `phase` run without reporting a result.
    pub(crate) fn skip_phase(&self, phase: BuildPhase) {
        self.silent_phases.lock().unwrap().push(phase);
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub(crate) fn last_parameters(&self) -> Option<OperationParameters> {
        self.parameters.lock().unwrap().last().cloned()
    }

    pub(crate) fn calls(&self) -> usize {
        self.parameters.lock().unwrap().len()
    }

    pub(crate) fn test_selections(&self) -> Vec<TestSelection> {
        self.selections.lock().unwrap().clone()
    }

    pub(crate) fn changed_paths(&self) -> Vec<Vec<String>> {
        self.changed_paths.lock().unwrap().clone()
    }

    pub(crate) fn action_requests(&self) -> Vec<BuildActionRequest> {
        self.action_requests.lock().unwrap().clone()
    }

    fn record(&self, params: &OperationParameters) -> Result<(), ConnectionError> {
        self.parameters.lock().unwrap().push(params.clone());
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn action_result(&self, request: &BuildActionRequest) -> Result<serde_json::Value, ConnectionError> {
        self.action_requests.lock().unwrap().push(request.clone());
        self.action_results
            .lock()
            .unwrap()
            .get(&request.name)
            .cloned()
            .ok_or_else(|| ConnectionError::Daemon(format!("unknown action '{}'", request.name)))
    }
}

impl ConsumerConnection for RecordingConnection {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn fetch_model(
        &self,
        model_type: &ModelType,
        params: &OperationParameters,
    ) -> Result<serde_json::Value, ConnectionError> {
        self.record(params)?;
        self.models
            .lock()
            .unwrap()
            .get(model_type.name())
            .cloned()
            .ok_or_else(|| ConnectionError::Daemon(format!("no model named '{}'", model_type)))
    }

    fn run_build(&self, params: &OperationParameters) -> Result<(), ConnectionError> {
        self.record(params)?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn run_tests(
        &self,
        selection: &TestSelection,
        params: &OperationParameters,
    ) -> Result<(), ConnectionError> {
        self.record(params)?;
        self.selections.lock().unwrap().push(selection.clone());
        Ok(())
    }

    fn run_build_action(
        &self,
        action: &BuildActionRequest,
        params: &OperationParameters,
    ) -> Result<serde_json::Value, ConnectionError> {
        self.record(params)?;
        self.action_result(action)
    }

    fn run_phased_build_action(
        &self,
        actions: &[(BuildPhase, BuildActionRequest)],
        sink: &mut PhaseResultSink<'_>,
        params: &OperationParameters,
    ) -> Result<(), ConnectionError> {
        self.record(params)?;
        let silent = self.silent_phases.lock().unwrap().clone();
        for (phase, request) in actions {
            let result = self.action_result(request)?;
            if !silent.contains(phase) {
                sink(*phase, result)?;
            }
        }
        Ok(())
    }

    fn notify_daemons_about_changed_paths(
        &self,
        changed_paths: &[String],
        params: &OperationParameters,
    ) -> Result<(), ConnectionError> {
        self.record(params)?;
        self.changed_paths
            .lock()
            .unwrap()
            .push(changed_paths.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExecutorCall {
    Run(String),
    Stop,
    StopNow,
    StopWhenIdle,
}

/// Runs dispatches inline on the caller's thread and records lifecycle
/// calls in order. Once any stop method was called, new work is rejected.
pub(crate) struct RecordingExecutor {
    connection: Arc<RecordingConnection>,
    calls: Mutex<Vec<ExecutorCall>>,
    stopped: AtomicBool,
}

impl RecordingExecutor {
    pub(crate) fn new(connection: Arc<RecordingConnection>) -> Self {
        Self {
            connection,
            calls: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ExecutorCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AsyncActionExecutor for RecordingExecutor {
    fn display_name(&self) -> String {
        self.connection.display_name()
    }

    fn run(&self, dispatch: Dispatch) {
        self.record(ExecutorCall::Run(dispatch.entry_point().to_string()));
        if self.stopped.load(Ordering::SeqCst) {
            dispatch.reject(ConnectionError::Stopped);
        } else {
            dispatch.run(self.connection.as_ref());
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.record(ExecutorCall::Stop);
    }

    fn stop_now(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.record(ExecutorCall::StopNow);
    }

    fn stop_when_idle(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.record(ExecutorCall::StopWhenIdle);
    }
}
